use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::Actor;
use crate::engine::assignment::{self, AssignmentOutcome, HistoryFilter};
use crate::engine::transitions::{self, TaskFilter};
use crate::error::AppError;
use crate::models::assignment::{
    AssignmentHistory, AssignmentStrategy, BatchItemResult, TaskAssignmentSpec,
};
use crate::models::task::{NewTask, Task, TaskStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/:id", get(get_task))
        .route("/tasks/:id/accept", post(accept_task))
        .route("/tasks/:id/status", post(advance_task))
        .route("/tasks/:id/rating", post(rate_delivery))
        .route("/tasks/:id/assign", post(assign_task))
        .route("/tasks/:id/reassign", post(reassign_task))
        .route("/batch-assignments", post(batch_assign))
        .route("/assignments", get(assignment_history))
        .route("/reports/overdue", get(list_overdue))
}

#[derive(Deserialize)]
pub struct AdvanceTaskRequest {
    pub status: TaskStatus,
}

#[derive(Deserialize)]
pub struct RateDeliveryRequest {
    pub stars: u8,
}

#[derive(Deserialize)]
pub struct ReassignRequest {
    pub worker_id: Uuid,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct BatchAssignRequest {
    pub items: Vec<TaskAssignmentSpec>,
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewTask>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(transitions::create_task(&state, payload)?))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TaskFilter>,
) -> Json<Vec<Task>> {
    Json(transitions::list_tasks(&state, &filter))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(state.store.task(&id)?))
}

async fn accept_task(
    State(state): State<Arc<AppState>>,
    Actor(worker_id): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(transitions::accept_task(&state, worker_id, id)?))
}

async fn advance_task(
    State(state): State<Arc<AppState>>,
    Actor(worker_id): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceTaskRequest>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(transitions::advance_task(&state, worker_id, id, payload.status)?))
}

async fn rate_delivery(
    State(state): State<Arc<AppState>>,
    Actor(rater_id): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<RateDeliveryRequest>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(transitions::rate_delivery(&state, rater_id, id, payload.stars)?))
}

async fn assign_task(
    State(state): State<Arc<AppState>>,
    Actor(manager_id): Actor,
    Path(id): Path<Uuid>,
    Json(strategy): Json<AssignmentStrategy>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    Ok(Json(assignment::assign_task(&state, manager_id, id, strategy)?))
}

async fn reassign_task(
    State(state): State<Arc<AppState>>,
    Actor(manager_id): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReassignRequest>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    let outcome =
        assignment::reassign_task(&state, manager_id, id, payload.worker_id, payload.reason)?;
    Ok(Json(outcome))
}

async fn batch_assign(
    State(state): State<Arc<AppState>>,
    Actor(manager_id): Actor,
    Json(payload): Json<BatchAssignRequest>,
) -> Result<Json<Vec<BatchItemResult>>, AppError> {
    Ok(Json(assignment::batch_assign(&state, manager_id, payload.items)?))
}

async fn assignment_history(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<HistoryFilter>,
) -> Json<Vec<AssignmentHistory>> {
    Json(assignment::assignment_history(&state, &filter))
}

async fn list_overdue(State(state): State<Arc<AppState>>) -> Json<Vec<Task>> {
    Json(transitions::list_overdue(&state, Utc::now()))
}
