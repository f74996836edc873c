//! Append-only points ledger. The running balance and the ledger row are always
//! written in the same commit, and the available balance never drops below zero.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::error::AppError;
use crate::models::progression::{PointsAccount, PointsKind, PointsTransaction};
use crate::permission::{self, Capability};
use crate::state::AppState;
use crate::store::Store;

/// Posts one ledger entry. Must run inside [`Store::transaction`].
pub fn post(
    store: &Store,
    worker_id: Uuid,
    kind: PointsKind,
    amount: i64,
    reason: &str,
    reference: Option<String>,
) -> Result<PointsTransaction, AppError> {
    if amount <= 0 {
        return Err(AppError::Validation("amount must be > 0".to_string()));
    }
    if reason.trim().is_empty() {
        return Err(AppError::Validation("reason cannot be empty".to_string()));
    }

    let mut worker = store.worker(&worker_id)?;
    let mut account = store.points_account(&worker_id);

    match kind {
        PointsKind::Earn => {
            account.earned = account
                .earned
                .checked_add(amount)
                .ok_or_else(|| AppError::Validation("points balance overflow".to_string()))?;
        }
        PointsKind::Spend => {
            if account.available() < amount {
                return Err(AppError::InsufficientPoints {
                    available: account.available(),
                    requested: amount,
                });
            }
            account.used += amount;
        }
    }

    let transaction = PointsTransaction {
        id: Uuid::new_v4(),
        worker_id,
        kind,
        amount,
        reason: reason.to_string(),
        reference,
        created_at: Utc::now(),
    };

    worker.points = account.available();
    worker.updated_at = transaction.created_at;

    store.points_accounts.insert(worker_id, account);
    store.workers.insert(worker_id, worker);
    store.points_transactions.insert(transaction.id, transaction.clone());

    Ok(transaction)
}

pub fn add_points(
    state: &AppState,
    worker_id: Uuid,
    amount: i64,
    reason: &str,
    reference: Option<String>,
) -> Result<PointsTransaction, AppError> {
    let transaction = state
        .store
        .transaction(|store| post(store, worker_id, PointsKind::Earn, amount, reason, reference))?;

    info!(worker_id = %worker_id, amount, reason, "points added");
    Ok(transaction)
}

pub fn spend_points(
    state: &AppState,
    worker_id: Uuid,
    amount: i64,
    reason: &str,
    reference: Option<String>,
) -> Result<PointsTransaction, AppError> {
    let transaction = state
        .store
        .transaction(|store| post(store, worker_id, PointsKind::Spend, amount, reason, reference))?;

    info!(worker_id = %worker_id, amount, reason, "points spent");
    Ok(transaction)
}

/// Manual award by a city-level manager.
pub fn grant_points(
    state: &AppState,
    manager_id: Uuid,
    worker_id: Uuid,
    amount: i64,
    reason: &str,
) -> Result<PointsTransaction, AppError> {
    let authorized = state.store.worker(&manager_id).and_then(|manager| {
        permission::require_capability(&manager, Capability::ManagePoints)?;
        permission::require_manage(&state.store, &manager_id, &worker_id)
    });
    audit::guard(state, manager_id, "grant_points", Some(worker_id), authorized)?;

    add_points(
        state,
        worker_id,
        amount,
        reason,
        Some(format!("granted_by:{manager_id}")),
    )
}

pub fn account(state: &AppState, worker_id: &Uuid) -> Result<PointsAccount, AppError> {
    state.store.worker(worker_id)?;
    Ok(state.store.points_account(worker_id))
}

pub fn transactions(state: &AppState, worker_id: &Uuid) -> Vec<PointsTransaction> {
    let mut rows: Vec<PointsTransaction> = state
        .store
        .points_transactions
        .iter()
        .filter(|entry| entry.value().worker_id == *worker_id)
        .map(|entry| entry.value().clone())
        .collect();
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    rows
}
