use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    SubordinateCreated,
    SubordinateTransferred,
    ZoneAssigned,
    TaskAssigned,
    TaskReassigned,
    UpgradeRequested,
    UpgradeResult,
    BadgeAwarded,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SubordinateCreated => "SUBORDINATE_CREATED",
            EventKind::SubordinateTransferred => "SUBORDINATE_TRANSFERRED",
            EventKind::ZoneAssigned => "ZONE_ASSIGNED",
            EventKind::TaskAssigned => "TASK_ASSIGNED",
            EventKind::TaskReassigned => "TASK_REASSIGNED",
            EventKind::UpgradeRequested => "UPGRADE_REQUESTED",
            EventKind::UpgradeResult => "UPGRADE_RESULT",
            EventKind::BadgeAwarded => "BADGE_AWARDED",
        }
    }
}

/// Minimal notification payload handed to the delivery collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub recipients: Vec<Uuid>,
    pub entity_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(kind: EventKind, entity_id: Uuid, actor_id: Option<Uuid>, recipients: Vec<Uuid>) -> Self {
        let mut recipients = recipients;
        recipients.sort();
        recipients.dedup();

        Self {
            id: Uuid::new_v4(),
            kind,
            recipients,
            entity_id,
            actor_id,
            occurred_at: Utc::now(),
        }
    }

    pub fn is_for(&self, worker_id: &Uuid) -> bool {
        self.recipients.contains(worker_id)
    }
}
