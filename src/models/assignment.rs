use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub zone_score: f64,
    pub rating_score: f64,
    pub load_score: f64,
    pub proximity_score: f64,
}

/// How a manager wants a task placed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AssignmentStrategy {
    Direct { worker_id: Uuid },
    Cascade,
    AutoHierarchy,
}

impl AssignmentStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            AssignmentStrategy::Direct { .. } => "direct",
            AssignmentStrategy::Cascade => "cascade",
            AssignmentStrategy::AutoHierarchy => "auto_hierarchy",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    SelfAccept,
    Direct,
    Cascade,
    AutoHierarchy,
    Reassign,
}

impl From<&AssignmentStrategy> for AssignmentType {
    fn from(strategy: &AssignmentStrategy) -> Self {
        match strategy {
            AssignmentStrategy::Direct { .. } => AssignmentType::Direct,
            AssignmentStrategy::Cascade => AssignmentType::Cascade,
            AssignmentStrategy::AutoHierarchy => AssignmentType::AutoHierarchy,
        }
    }
}

/// Immutable record of one assignment decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentHistory {
    pub id: Uuid,
    pub task_id: Uuid,
    pub assigned_courier_id: Uuid,
    pub assigned_by: Uuid,
    pub assignment_type: AssignmentType,
    pub previous_courier_id: Option<Uuid>,
    pub reason: Option<String>,
    pub score: Option<f64>,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub zone_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignmentSpec {
    pub task_id: Uuid,
    #[serde(flatten)]
    pub strategy: AssignmentStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub task_id: Uuid,
    pub success: bool,
    pub courier_id: Option<Uuid>,
    pub error: Option<String>,
}
