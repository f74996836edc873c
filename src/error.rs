use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::task::TaskStatus;
use crate::models::worker::WorkerStatus;
use crate::models::zone::ZoneType;
use crate::permission::{Capability, DeniedRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    PermissionDenied,
    StateConflict,
    NotFound,
    AlreadyExists,
    InsufficientResource,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InsufficientResource => "insufficient_resource",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid {zone_type} zone code: {code}")]
    InvalidZoneFormat { zone_type: ZoneType, code: String },

    #[error("invalid level step: expected level {expected}, got {requested}")]
    InvalidLevelStep { expected: u8, requested: u8 },

    #[error("permission denied ({rule}): {detail}")]
    PermissionDenied { rule: DeniedRule, detail: String },

    #[error("level {level} lacks capability {capability}")]
    InsufficientLevel { level: u8, capability: Capability },

    #[error("worker zones do not cover task zone {task_zone}")]
    ZoneMismatch { task_zone: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("task {0} was already claimed")]
    AlreadyAssigned(Uuid),

    #[error("{zone_type} zone {zone_id} is already actively assigned")]
    ZoneConflict { zone_type: ZoneType, zone_id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("application of worker {worker_id} is already {status}")]
    ApplicationClosed { worker_id: Uuid, status: WorkerStatus },

    #[error("request {0} was already processed")]
    AlreadyProcessed(Uuid),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("worker {0} already has a pending upgrade request")]
    DuplicateRequest(Uuid),

    #[error("insufficient points: available {available}, requested {requested}")]
    InsufficientPoints { available: i64, requested: i64 },

    #[error("no eligible worker")]
    NoEligibleWorker,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn denied(rule: DeniedRule, detail: impl Into<String>) -> Self {
        AppError::PermissionDenied {
            rule,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_)
            | AppError::InvalidZoneFormat { .. }
            | AppError::InvalidLevelStep { .. } => ErrorKind::Validation,
            AppError::PermissionDenied { .. }
            | AppError::InsufficientLevel { .. }
            | AppError::ZoneMismatch { .. } => ErrorKind::PermissionDenied,
            AppError::InvalidTransition { .. }
            | AppError::AlreadyAssigned(_)
            | AppError::ZoneConflict { .. }
            | AppError::Conflict(_)
            | AppError::ApplicationClosed { .. }
            | AppError::AlreadyProcessed(_) => ErrorKind::StateConflict,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::AlreadyExists(_) | AppError::DuplicateRequest(_) => ErrorKind::AlreadyExists,
            AppError::InsufficientPoints { .. } | AppError::NoEligibleWorker => {
                ErrorKind::InsufficientResource
            }
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Only a lost claim race may be retried against a freshly read task.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::AlreadyAssigned(_))
    }

    pub fn rule(&self) -> Option<DeniedRule> {
        match self {
            AppError::PermissionDenied { rule, .. } => Some(*rule),
            AppError::InsufficientLevel { .. } => Some(DeniedRule::MissingCapability),
            AppError::ZoneMismatch { .. } => Some(DeniedRule::ZoneOutsideScope),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::StateConflict | ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InsufficientResource => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "rule": self.rule().map(|rule| rule.as_str()),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
