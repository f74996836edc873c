use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Reject => "reject",
        }
    }
}

/// One evaluated requirement of a level transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequirementCheck {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: f64,
    pub current: f64,
    pub satisfied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub worker_id: Uuid,
    pub current_level: u8,
    pub target_level: u8,
    pub requirement_set: String,
    pub requirements: Vec<RequirementCheck>,
    pub can_upgrade: bool,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelUpgradeRequest {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub current_level: u8,
    pub requested_level: u8,
    pub reason: String,
    pub evidence: serde_json::Value,
    pub eligibility: EligibilityReport,
    pub status: RequestStatus,
    pub reviewer_id: Option<Uuid>,
    pub review_comment: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A level-4 manager vouching for a worker's promotion to the top tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endorsement {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub endorsed_by: Uuid,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PointsKind {
    Earn,
    Spend,
}

/// Append-only ledger row. `amount` is always positive; `kind` gives the sign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsTransaction {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub kind: PointsKind,
    pub amount: i64,
    pub reason: String,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PointsAccount {
    pub earned: i64,
    pub used: i64,
}

impl PointsAccount {
    pub fn available(&self) -> i64 {
        self.earned - self.used
    }
}

/// Declarative award rule. New variants get a new `condition_version` on the badge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BadgeCondition {
    RatingAtLeast { value: f64, window_days: i64 },
    RankingPercentile { top_percent: f64, window_days: i64 },
    CumulativeDistanceKm { km: f64 },
    ServiceDurationAtLeast { months: u32 },
    CompletedTasksAtLeast { count: u32 },
    LevelAtLeast { level: u8 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Badge {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: String,
    pub points: i64,
    pub condition: BadgeCondition,
    pub condition_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeEarned {
    pub worker_id: Uuid,
    pub badge_id: Uuid,
    pub badge_code: String,
    pub earned_at: DateTime<Utc>,
}
