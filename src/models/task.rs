use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::worker::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Available,
    Accepted,
    Collected,
    InTransit,
    Delivered,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Delivered | TaskStatus::Failed)
    }

    /// Accepted through in-transit: the task counts against its courier's load.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            TaskStatus::Accepted | TaskStatus::Collected | TaskStatus::InTransit
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Available => "available",
            TaskStatus::Accepted => "accepted",
            TaskStatus::Collected => "collected",
            TaskStatus::InTransit => "in_transit",
            TaskStatus::Delivered => "delivered",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque pickup/delivery descriptor supplied by the content domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub zone_code: String,
    #[serde(default)]
    pub point: Option<GeoPoint>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub actor_id: Uuid,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub content_ref: String,
    pub pickup: Location,
    pub delivery: Location,
    pub status: TaskStatus,
    pub courier_id: Option<Uuid>,
    pub priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
    pub reward: i64,
    /// Recipient feedback, 1..=5, only on delivered tasks.
    pub rating: Option<u8>,
    /// Who left the rating.
    pub rated_by: Option<Uuid>,
    pub status_history: Vec<StatusChange>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub content_ref: String,
    pub pickup: Location,
    pub delivery: Location,
    pub priority: Priority,
    #[serde(default)]
    pub reward: i64,
}
