pub mod progression;
pub mod tasks;
pub mod workers;
pub mod ws;
pub mod zones;

use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const BOOTSTRAP_HEADER: &str = "x-bootstrap-token";

/// The worker on whose behalf the request acts, taken from `x-actor-id`.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| AppError::Validation(format!("missing {ACTOR_HEADER} header")))?
            .to_str()
            .map_err(|err| AppError::Validation(format!("invalid {ACTOR_HEADER} header: {err}")))?;

        Uuid::parse_str(raw.trim())
            .map(Actor)
            .map_err(|err| AppError::Validation(format!("invalid {ACTOR_HEADER} header: {err}")))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(workers::router())
        .merge(zones::router())
        .merge(tasks::router())
        .merge(progression::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    workers: usize,
    tasks: usize,
    assignments: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        workers: state.store.workers.len(),
        tasks: state.store.tasks.len(),
        assignments: state.store.assignment_history.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
