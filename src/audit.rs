//! Audit trail for authorization decisions and hierarchy changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, ErrorKind};
use crate::permission::DeniedRule;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub target_id: Option<Uuid>,
    pub outcome: AuditOutcome,
    pub rule: Option<DeniedRule>,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub actor_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub outcome: Option<AuditOutcome>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

fn append(
    state: &AppState,
    actor_id: Uuid,
    action: &str,
    target_id: Option<Uuid>,
    outcome: AuditOutcome,
    rule: Option<DeniedRule>,
    detail: String,
) {
    let entry = AuditEntry {
        id: Uuid::new_v4(),
        actor_id,
        action: action.to_string(),
        target_id,
        outcome,
        rule,
        detail,
        created_at: Utc::now(),
    };
    state.store.audit_log.insert(entry.id, entry);
}

/// Records an applied hierarchy change.
pub fn record_change(
    state: &AppState,
    actor_id: Uuid,
    action: &str,
    target_id: Option<Uuid>,
    detail: impl Into<String>,
) {
    let detail = detail.into();
    info!(actor_id = %actor_id, action, detail = %detail, "hierarchy change recorded");
    append(state, actor_id, action, target_id, AuditOutcome::Allowed, None, detail);
}

/// Passes `result` through, logging and recording it if authorization failed.
pub fn guard<T>(
    state: &AppState,
    actor_id: Uuid,
    action: &str,
    target_id: Option<Uuid>,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    if let Err(err) = &result {
        if err.kind() == ErrorKind::PermissionDenied {
            let rule = err.rule();
            let rule_label = rule.map(|rule| rule.as_str()).unwrap_or("unknown");

            warn!(actor_id = %actor_id, action, rule = rule_label, error = %err, "permission denied");
            state
                .metrics
                .permission_denials_total
                .with_label_values(&[rule_label])
                .inc();
            append(
                state,
                actor_id,
                action,
                target_id,
                AuditOutcome::Denied,
                rule,
                err.to_string(),
            );
        }
    }

    result
}

pub fn query(state: &AppState, filter: &AuditFilter) -> Vec<AuditEntry> {
    let mut entries: Vec<AuditEntry> = state
        .store
        .audit_log
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|entry| filter.actor_id.is_none_or(|id| entry.actor_id == id))
        .filter(|entry| filter.target_id.is_none_or(|id| entry.target_id == Some(id)))
        .filter(|entry| filter.outcome.is_none_or(|outcome| entry.outcome == outcome))
        .filter(|entry| filter.from.is_none_or(|from| entry.created_at >= from))
        .filter(|entry| filter.to.is_none_or(|to| entry.created_at < to))
        .collect();

    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    entries
}
