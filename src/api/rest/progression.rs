use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::Actor;
use crate::error::AppError;
use crate::models::progression::{
    Badge, BadgeEarned, EligibilityReport, Endorsement, LevelUpgradeRequest, PointsAccount,
    PointsTransaction, ReviewAction,
};
use crate::progression::badges::{self, NewBadge};
use crate::progression::upgrade::{self, RequestFilter};
use crate::progression::{points, requirements};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/workers/:id/eligibility", get(check_eligibility))
        .route("/workers/:id/endorsements", post(endorse))
        .route("/workers/:id/points", get(points_account))
        .route("/workers/:id/points/transactions", get(points_transactions))
        .route("/workers/:id/points/grant", post(grant_points))
        .route("/workers/:id/badges", get(earned_badges))
        .route("/workers/:id/badges/check", post(check_badges))
        .route("/points/spend", post(spend_points))
        .route("/upgrade-requests", post(submit_upgrade_request).get(list_requests))
        .route("/upgrade-requests/:id/review", post(review_upgrade_request))
        .route("/badges", get(list_badges).post(register_badge))
}

#[derive(Deserialize)]
pub struct EligibilityQuery {
    pub target_level: u8,
}

#[derive(Deserialize)]
pub struct SubmitUpgradeRequest {
    pub requested_level: u8,
    pub reason: String,
    #[serde(default)]
    pub evidence: serde_json::Value,
}

#[derive(Deserialize)]
pub struct ReviewUpgradeRequest {
    pub action: ReviewAction,
    #[serde(default)]
    pub comment: Option<String>,
    /// Zone the worker moves to when approved; defaults to the enclosing zone.
    #[serde(default)]
    pub zone_code: Option<String>,
}

#[derive(Deserialize)]
pub struct EndorseRequest {
    pub note: String,
}

#[derive(Deserialize)]
pub struct GrantPointsRequest {
    pub amount: i64,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct SpendPointsRequest {
    pub amount: i64,
    pub reason: String,
    #[serde(default)]
    pub reference: Option<String>,
}

async fn check_eligibility(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<EligibilityQuery>,
) -> Result<Json<EligibilityReport>, AppError> {
    Ok(Json(requirements::check_eligibility(&state, &id, query.target_level)?))
}

async fn submit_upgrade_request(
    State(state): State<Arc<AppState>>,
    Actor(worker_id): Actor,
    Json(payload): Json<SubmitUpgradeRequest>,
) -> Result<Json<LevelUpgradeRequest>, AppError> {
    let request = upgrade::submit_upgrade_request(
        &state,
        worker_id,
        payload.requested_level,
        payload.reason,
        payload.evidence,
    )?;
    Ok(Json(request))
}

async fn list_requests(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RequestFilter>,
) -> Json<Vec<LevelUpgradeRequest>> {
    Json(upgrade::list_requests(&state, &filter))
}

async fn review_upgrade_request(
    State(state): State<Arc<AppState>>,
    Actor(reviewer_id): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewUpgradeRequest>,
) -> Result<Json<LevelUpgradeRequest>, AppError> {
    let request = upgrade::review_upgrade_request(
        &state,
        id,
        payload.action,
        payload.comment,
        reviewer_id,
        payload.zone_code,
    )?;
    Ok(Json(request))
}

async fn endorse(
    State(state): State<Arc<AppState>>,
    Actor(endorser_id): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<EndorseRequest>,
) -> Result<Json<Endorsement>, AppError> {
    Ok(Json(upgrade::endorse(&state, endorser_id, id, payload.note)?))
}

async fn points_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PointsAccount>, AppError> {
    Ok(Json(points::account(&state, &id)?))
}

async fn points_transactions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Vec<PointsTransaction>> {
    Json(points::transactions(&state, &id))
}

async fn grant_points(
    State(state): State<Arc<AppState>>,
    Actor(manager_id): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<GrantPointsRequest>,
) -> Result<Json<PointsTransaction>, AppError> {
    let transaction =
        points::grant_points(&state, manager_id, id, payload.amount, &payload.reason)?;
    Ok(Json(transaction))
}

/// Workers only spend their own balance.
async fn spend_points(
    State(state): State<Arc<AppState>>,
    Actor(worker_id): Actor,
    Json(payload): Json<SpendPointsRequest>,
) -> Result<Json<PointsTransaction>, AppError> {
    let transaction = points::spend_points(
        &state,
        worker_id,
        payload.amount,
        &payload.reason,
        payload.reference,
    )?;
    Ok(Json(transaction))
}

async fn list_badges(State(state): State<Arc<AppState>>) -> Json<Vec<Badge>> {
    Json(badges::list_badges(&state))
}

async fn register_badge(
    State(state): State<Arc<AppState>>,
    Actor(actor_id): Actor,
    Json(payload): Json<NewBadge>,
) -> Result<Json<Badge>, AppError> {
    Ok(Json(badges::register_badge(&state, actor_id, payload)?))
}

async fn earned_badges(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Vec<BadgeEarned>> {
    Json(badges::earned_badges(&state, &id))
}

async fn check_badges(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BadgeEarned>>, AppError> {
    Ok(Json(badges::check_auto_award_badges(&state, id)?))
}
