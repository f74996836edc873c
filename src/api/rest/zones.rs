use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::Actor;
use crate::error::AppError;
use crate::hierarchy;
use crate::models::zone::{ZoneAssignment, ZoneType};
use crate::progression::stats::{self, StatsRange, WorkerPerformance};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/zone-assignments", post(assign_zone).get(list_zone_assignments))
        .route("/zone-assignments/:id", delete(deactivate_zone))
        .route("/reports/zones/:code", get(zone_stats))
}

#[derive(Deserialize)]
pub struct AssignZoneRequest {
    pub worker_id: Uuid,
    pub zone_type: ZoneType,
    pub zone_id: String,
}

#[derive(Deserialize)]
pub struct ZoneAssignmentQuery {
    pub worker_id: Option<Uuid>,
}

async fn assign_zone(
    State(state): State<Arc<AppState>>,
    Actor(manager_id): Actor,
    Json(payload): Json<AssignZoneRequest>,
) -> Result<Json<ZoneAssignment>, AppError> {
    let assignment = hierarchy::assign_zone(
        &state,
        manager_id,
        payload.worker_id,
        payload.zone_type,
        payload.zone_id,
    )?;
    Ok(Json(assignment))
}

async fn list_zone_assignments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ZoneAssignmentQuery>,
) -> Json<Vec<ZoneAssignment>> {
    Json(hierarchy::list_zone_assignments(&state, query.worker_id))
}

async fn deactivate_zone(
    State(state): State<Arc<AppState>>,
    Actor(manager_id): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ZoneAssignment>, AppError> {
    Ok(Json(hierarchy::deactivate_zone(&state, manager_id, id)?))
}

async fn zone_stats(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(range): Query<StatsRange>,
) -> Result<Json<Vec<WorkerPerformance>>, AppError> {
    Ok(Json(stats::zone_performance(&state, &code, &range)?))
}
