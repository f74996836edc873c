use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::{Actor, BOOTSTRAP_HEADER};
use crate::audit::{self, AuditEntry, AuditFilter};
use crate::error::AppError;
use crate::hierarchy::{self, ApplicationSpec};
use crate::models::worker::{GeoPoint, NewWorkerSpec, Worker};
use crate::permission::{self, PermissionScope};
use crate::progression::stats::{self, StatsRange, WorkerPerformance};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/workers", post(create_subordinate).get(list_workers))
        .route("/roots", post(bootstrap_root))
        .route("/workers/:id", get(get_worker))
        .route("/workers/:id/transfer", post(transfer_subordinate))
        .route("/workers/:id/scope", get(permission_scope))
        .route("/applications", post(apply))
        .route("/applications/:id/review", post(review_application))
        .route("/reports/workers/:id", get(worker_stats))
        .route("/audit", get(audit_log))
}

#[derive(Deserialize)]
pub struct BootstrapRootRequest {
    pub user_id: Uuid,
    pub name: String,
    pub city_code: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub new_parent_id: Uuid,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ReviewApplicationRequest {
    pub approve: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

async fn bootstrap_root(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<BootstrapRootRequest>,
) -> Result<Json<Worker>, AppError> {
    let token = headers
        .get(BOOTSTRAP_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);
    let worker = hierarchy::bootstrap_root(
        &state,
        token,
        payload.user_id,
        payload.name,
        payload.city_code,
        payload.location,
    )?;
    Ok(Json(worker))
}

async fn create_subordinate(
    State(state): State<Arc<AppState>>,
    Actor(manager_id): Actor,
    Json(payload): Json<NewWorkerSpec>,
) -> Result<Json<Worker>, AppError> {
    Ok(Json(hierarchy::create_subordinate(&state, manager_id, payload)?))
}

async fn list_workers(State(state): State<Arc<AppState>>) -> Json<Vec<Worker>> {
    Json(hierarchy::list_workers(&state))
}

async fn get_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Worker>, AppError> {
    Ok(Json(state.store.worker(&id)?))
}

async fn transfer_subordinate(
    State(state): State<Arc<AppState>>,
    Actor(manager_id): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransferRequest>,
) -> Result<Json<Worker>, AppError> {
    let worker = hierarchy::transfer_subordinate(
        &state,
        manager_id,
        id,
        payload.new_parent_id,
        payload.reason,
    )?;
    Ok(Json(worker))
}

async fn permission_scope(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<PermissionScope> {
    Json(permission::permission_scope(&state.store, &id))
}

async fn apply(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ApplicationSpec>,
) -> Result<Json<Worker>, AppError> {
    Ok(Json(hierarchy::apply(&state, payload)?))
}

async fn review_application(
    State(state): State<Arc<AppState>>,
    Actor(approver_id): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewApplicationRequest>,
) -> Result<Json<Worker>, AppError> {
    let worker =
        hierarchy::review_application(&state, approver_id, id, payload.approve, payload.comment)?;
    Ok(Json(worker))
}

async fn worker_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(range): Query<StatsRange>,
) -> Result<Json<WorkerPerformance>, AppError> {
    Ok(Json(stats::worker_performance(&state, &id, &range)?))
}

async fn audit_log(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<AuditFilter>,
) -> Json<Vec<AuditEntry>> {
    Json(audit::query(&state, &filter))
}
