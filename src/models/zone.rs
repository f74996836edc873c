use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Building,
    Area,
    School,
    City,
}

impl ZoneType {
    /// The zone tier a worker of `level` operates on. Levels outside 1..=4 have none.
    pub fn for_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(ZoneType::Building),
            2 => Some(ZoneType::Area),
            3 => Some(ZoneType::School),
            4 => Some(ZoneType::City),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            ZoneType::Building => 1,
            ZoneType::Area => 2,
            ZoneType::School => 3,
            ZoneType::City => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ZoneType::Building => "building",
            ZoneType::Area => "area",
            ZoneType::School => "school",
            ZoneType::City => "city",
        }
    }
}

impl std::fmt::Display for ZoneType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker's claim on a zone. Rows are deactivated, never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneAssignment {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub zone_type: ZoneType,
    pub zone_id: String,
    pub is_active: bool,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: Uuid,
    pub deactivated_at: Option<DateTime<Utc>>,
}
