//! Level upgrade workflow: submission, review, and endorsements.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::error::AppError;
use crate::events::notify;
use crate::models::event::{DomainEvent, EventKind};
use crate::models::progression::{
    Endorsement, LevelUpgradeRequest, RequestStatus, ReviewAction,
};
use crate::models::worker::{Worker, MAX_LEVEL};
use crate::models::zone::ZoneType;
use crate::permission::{self, zone, Capability, DeniedRule};
use crate::progression::requirements;
use crate::state::AppState;
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFilter {
    pub worker_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
}

pub fn submit_upgrade_request(
    state: &AppState,
    worker_id: Uuid,
    requested_level: u8,
    reason: String,
    evidence: serde_json::Value,
) -> Result<LevelUpgradeRequest, AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::Validation("reason cannot be empty".to_string()));
    }

    let worker = state.store.worker(&worker_id)?;
    if !worker.is_approved() {
        return Err(AppError::Validation(format!(
            "worker {worker_id} is not approved"
        )));
    }

    let eligibility = requirements::check_eligibility(state, &worker_id, requested_level)?;

    let request = state.store.transaction(|store| {
        let pending = store.upgrade_requests.iter().any(|entry| {
            let existing = entry.value();
            existing.worker_id == worker_id && existing.status == RequestStatus::Pending
        });
        if pending {
            return Err(AppError::DuplicateRequest(worker_id));
        }

        let request = LevelUpgradeRequest {
            id: Uuid::new_v4(),
            worker_id,
            current_level: eligibility.current_level,
            requested_level,
            reason,
            evidence,
            eligibility,
            status: RequestStatus::Pending,
            reviewer_id: None,
            review_comment: None,
            reviewed_at: None,
            created_at: Utc::now(),
        };
        store.upgrade_requests.insert(request.id, request.clone());
        Ok(request)
    })?;

    info!(
        request_id = %request.id,
        worker_id = %worker_id,
        requested_level,
        can_upgrade = request.eligibility.can_upgrade,
        "upgrade requested"
    );
    notify(
        state,
        DomainEvent::new(
            EventKind::UpgradeRequested,
            request.id,
            Some(worker_id),
            worker.parent_id.into_iter().collect(),
        ),
    );

    Ok(request)
}

/// First ancestor whose level still exceeds `level`.
fn manager_above(store: &Store, mut parent_id: Option<Uuid>, level: u8) -> Result<Option<Uuid>, AppError> {
    for _ in 0..MAX_LEVEL {
        let Some(id) = parent_id else {
            return Ok(None);
        };
        let parent = store.worker(&id)?;
        if parent.level > level {
            return Ok(Some(parent.id));
        }
        parent_id = parent.parent_id;
    }
    Ok(None)
}

/// Moves `worker` up to `level`. The new zone defaults to the one enclosing the
/// current zone and must be unclaimed. Below the top tier it must also lie inside
/// the reviewer's zones; a new city head gets a city of its own.
fn promote(
    store: &Store,
    worker: &mut Worker,
    level: u8,
    reviewer: &Worker,
    new_zone: Option<String>,
) -> Result<(), AppError> {
    let zone_type = ZoneType::for_level(level)
        .ok_or_else(|| AppError::Internal(format!("no zone type for level {level}")))?;
    let zone_code = match new_zone {
        Some(code) => code.trim().to_string(),
        None => zone::parent_code(&worker.zone_code).ok_or_else(|| {
            AppError::Internal(format!("zone {} has no parent zone", worker.zone_code))
        })?,
    };

    zone::validate(zone_type, &zone_code)?;
    if level < MAX_LEVEL && !permission::is_zone_authorized(store, reviewer, &zone_code) {
        return Err(AppError::denied(
            DeniedRule::ZoneOutsideScope,
            format!("zone {zone_code} is outside the reviewer's zones"),
        ));
    }
    permission::require_unclaimed(store, zone_type, &zone_code, Some(worker.id))?;

    worker.parent_id = manager_above(store, worker.parent_id, level)?;
    worker.level = level;
    worker.zone_type = zone_type;
    worker.zone_code = zone_code;
    Ok(())
}

pub fn review_upgrade_request(
    state: &AppState,
    request_id: Uuid,
    action: ReviewAction,
    comment: Option<String>,
    reviewer_id: Uuid,
    new_zone: Option<String>,
) -> Result<LevelUpgradeRequest, AppError> {
    let result = state.store.transaction(|store| {
        let mut request = store
            .upgrade_requests
            .get(&request_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("upgrade request {request_id} not found")))?;

        if request.status != RequestStatus::Pending {
            return Err(AppError::AlreadyProcessed(request_id));
        }

        let reviewer = store.worker(&reviewer_id)?;
        permission::require_capability(&reviewer, Capability::ReviewUpgrades)?;
        if reviewer.level < request.requested_level || reviewer.level <= request.current_level {
            return Err(AppError::denied(
                DeniedRule::ReviewerLevelTooLow,
                format!(
                    "level {} reviewer cannot decide a {} -> {} upgrade",
                    reviewer.level, request.current_level, request.requested_level
                ),
            ));
        }
        permission::require_manage(store, &reviewer_id, &request.worker_id)?;

        let mut worker = store.worker(&request.worker_id)?;
        if worker.level != request.current_level {
            return Err(AppError::Conflict(format!(
                "worker {} is at level {}, request was made at level {}",
                worker.id, worker.level, request.current_level
            )));
        }

        let now = Utc::now();
        if action == ReviewAction::Approve {
            promote(store, &mut worker, request.requested_level, &reviewer, new_zone)?;
            worker.updated_at = now;
            store.workers.insert(worker.id, worker.clone());
        }

        request.status = match action {
            ReviewAction::Approve => RequestStatus::Approved,
            ReviewAction::Reject => RequestStatus::Rejected,
        };
        request.reviewer_id = Some(reviewer_id);
        request.review_comment = comment;
        request.reviewed_at = Some(now);
        store.upgrade_requests.insert(request.id, request.clone());

        Ok((request, worker))
    });

    let (request, worker) = audit::guard(
        state,
        reviewer_id,
        "review_upgrade_request",
        Some(request_id),
        result,
    )?;

    state
        .metrics
        .upgrade_reviews_total
        .with_label_values(&[action.as_str()])
        .inc();

    if action == ReviewAction::Approve {
        audit::record_change(
            state,
            reviewer_id,
            "level_upgrade",
            Some(worker.id),
            format!(
                "level {} -> {}, zone {}",
                request.current_level, request.requested_level, worker.zone_code
            ),
        );
    }
    info!(
        request_id = %request_id,
        worker_id = %request.worker_id,
        reviewer_id = %reviewer_id,
        action = action.as_str(),
        "upgrade request reviewed"
    );
    notify(
        state,
        DomainEvent::new(
            EventKind::UpgradeResult,
            request.id,
            Some(reviewer_id),
            vec![request.worker_id],
        ),
    );

    Ok(request)
}

/// A top-level manager vouches for `worker_id`. Counts toward the 3 -> 4 step.
pub fn endorse(
    state: &AppState,
    endorser_id: Uuid,
    worker_id: Uuid,
    note: String,
) -> Result<Endorsement, AppError> {
    let result = state.store.transaction(|store| {
        let endorser = store.worker(&endorser_id)?;
        if endorser.level < MAX_LEVEL {
            return Err(AppError::denied(
                DeniedRule::ReviewerLevelTooLow,
                format!("only level {MAX_LEVEL} managers endorse, got level {}", endorser.level),
            ));
        }
        permission::require_manage(store, &endorser_id, &worker_id)?;

        let repeated = store.endorsements.iter().any(|entry| {
            entry.value().worker_id == worker_id && entry.value().endorsed_by == endorser_id
        });
        if repeated {
            return Err(AppError::AlreadyExists(format!(
                "worker {worker_id} is already endorsed by {endorser_id}"
            )));
        }

        let endorsement = Endorsement {
            id: Uuid::new_v4(),
            worker_id,
            endorsed_by: endorser_id,
            note,
            created_at: Utc::now(),
        };
        store.endorsements.insert(endorsement.id, endorsement.clone());
        Ok(endorsement)
    });

    let endorsement = audit::guard(state, endorser_id, "endorse", Some(worker_id), result)?;
    audit::record_change(state, endorser_id, "endorse", Some(worker_id), endorsement.note.clone());
    Ok(endorsement)
}

pub fn list_requests(state: &AppState, filter: &RequestFilter) -> Vec<LevelUpgradeRequest> {
    let mut requests: Vec<LevelUpgradeRequest> = state
        .store
        .upgrade_requests
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|request| filter.worker_id.is_none_or(|id| request.worker_id == id))
        .filter(|request| filter.status.is_none_or(|status| request.status == status))
        .collect();
    requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    requests
}
