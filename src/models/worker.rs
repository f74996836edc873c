use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::zone::ZoneType;

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Pending,
    Approved,
    Rejected,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Pending => "pending",
            WorkerStatus::Approved => "approved",
            WorkerStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A courier enrolled in the four-tier hierarchy. One worker per external user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub level: u8,
    pub zone_code: String,
    /// Always `ZoneType::for_level(level)`.
    pub zone_type: ZoneType,
    /// `None` only for the level-4 root.
    pub parent_id: Option<Uuid>,
    pub status: WorkerStatus,
    /// Available balance, mirrored from the points ledger.
    pub points: i64,
    pub rating: f64,
    pub location: Option<GeoPoint>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    pub fn is_approved(&self) -> bool {
        self.status == WorkerStatus::Approved
    }
}

/// What a manager supplies when vouching for a new subordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkerSpec {
    pub user_id: Uuid,
    pub name: String,
    pub level: u8,
    pub zone_code: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}
