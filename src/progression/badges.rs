//! Badge catalog and the idempotent award sweep.
//!
//! Every badge carries a structured [`BadgeCondition`]; [`evaluate_condition`] is
//! the only place conditions are interpreted. A grant is insert-if-absent on
//! `(worker, badge)` and pays the badge's points in the same commit, so repeated
//! or concurrent sweeps never award or pay twice.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit;
use crate::error::AppError;
use crate::events::notify;
use crate::models::event::{DomainEvent, EventKind};
use crate::models::progression::{Badge, BadgeCondition, BadgeEarned, PointsKind};
use crate::permission::{self, Capability, DeniedRule};
use crate::progression::points;
use crate::progression::stats::{delivery_counts, WorkerActivity};
use crate::state::AppState;
use crate::store::Store;

const CONDITION_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBadge {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub points: i64,
    pub condition: BadgeCondition,
}

fn badge(code: &str, name: &str, description: &str, points: i64, condition: BadgeCondition) -> Badge {
    Badge {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        points,
        condition,
        condition_version: CONDITION_VERSION,
    }
}

pub fn default_catalog() -> Vec<Badge> {
    vec![
        badge(
            "first_delivery",
            "First Delivery",
            "Completed a first delivery",
            10,
            BadgeCondition::CompletedTasksAtLeast { count: 1 },
        ),
        badge(
            "centurion",
            "Centurion",
            "Completed 100 deliveries",
            100,
            BadgeCondition::CompletedTasksAtLeast { count: 100 },
        ),
        badge(
            "five_star",
            "Five Star",
            "Average rating of 4.8 or better over 30 days",
            50,
            BadgeCondition::RatingAtLeast {
                value: 4.8,
                window_days: 30,
            },
        ),
        badge(
            "top_ten_percent",
            "Top 10%",
            "Among the busiest 10% of peers at the same level over 30 days",
            80,
            BadgeCondition::RankingPercentile {
                top_percent: 10.0,
                window_days: 30,
            },
        ),
        badge(
            "marathon",
            "Marathon",
            "Carried parcels over 100 km in total",
            60,
            BadgeCondition::CumulativeDistanceKm { km: 100.0 },
        ),
        badge(
            "veteran",
            "Veteran",
            "A full year of service",
            120,
            BadgeCondition::ServiceDurationAtLeast { months: 12 },
        ),
        badge(
            "area_lead",
            "Area Lead",
            "Promoted to area manager",
            30,
            BadgeCondition::LevelAtLeast { level: 2 },
        ),
    ]
}

fn in_top_percent(
    store: &Store,
    activity: &WorkerActivity,
    top_percent: f64,
    window_days: i64,
    now: DateTime<Utc>,
) -> bool {
    let counts = delivery_counts(
        store,
        activity.worker.level,
        now - Duration::days(window_days),
        now + Duration::seconds(1),
    );
    let Some(&own) = counts.get(&activity.worker.id) else {
        return false;
    };
    if own == 0 {
        return false;
    }

    let ahead = counts.values().filter(|&&count| count > own).count();
    let cutoff = ((counts.len() as f64) * top_percent / 100.0).ceil() as usize;
    ahead < cutoff
}

pub fn evaluate_condition(
    store: &Store,
    activity: &WorkerActivity,
    condition: &BadgeCondition,
    now: DateTime<Utc>,
) -> bool {
    match condition {
        BadgeCondition::RatingAtLeast { value, window_days } => activity
            .mean_rating(now, *window_days)
            .is_some_and(|rating| rating >= *value),
        BadgeCondition::RankingPercentile {
            top_percent,
            window_days,
        } => in_top_percent(store, activity, *top_percent, *window_days, now),
        BadgeCondition::CumulativeDistanceKm { km } => activity.distance_km() >= *km,
        BadgeCondition::ServiceDurationAtLeast { months } => {
            activity.months_of_service(now) >= *months
        }
        BadgeCondition::CompletedTasksAtLeast { count } => activity.delivered_total() >= *count,
        BadgeCondition::LevelAtLeast { level } => activity.worker.level >= *level,
    }
}

pub fn list_badges(state: &AppState) -> Vec<Badge> {
    let mut badges: Vec<Badge> = state
        .store
        .badges
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    badges.sort_by(|a, b| a.code.cmp(&b.code));
    badges
}

pub fn earned_badges(state: &AppState, worker_id: &Uuid) -> Vec<BadgeEarned> {
    let mut earned: Vec<BadgeEarned> = state
        .store
        .badges_earned
        .iter()
        .filter(|entry| entry.key().0 == *worker_id)
        .map(|entry| entry.value().clone())
        .collect();
    earned.sort_by(|a, b| a.earned_at.cmp(&b.earned_at).then(a.badge_code.cmp(&b.badge_code)));
    earned
}

/// Grants `badge` unless already held. `None` means it was already there.
fn grant(store: &Store, worker_id: Uuid, badge: &Badge, now: DateTime<Utc>) -> Result<Option<BadgeEarned>, AppError> {
    store.transaction(|store| {
        if store.badges_earned.contains_key(&(worker_id, badge.id)) {
            return Ok(None);
        }

        if badge.points > 0 {
            points::post(
                store,
                worker_id,
                PointsKind::Earn,
                badge.points,
                "badge_awarded",
                Some(badge.code.clone()),
            )?;
        }

        let earned = BadgeEarned {
            worker_id,
            badge_id: badge.id,
            badge_code: badge.code.clone(),
            earned_at: now,
        };
        store.badges_earned.insert((worker_id, badge.id), earned.clone());
        Ok(Some(earned))
    })
}

pub fn check_auto_award_badges_at(
    state: &AppState,
    worker_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<BadgeEarned>, AppError> {
    let activity = WorkerActivity::load(&state.store, &worker_id)?;
    if !activity.worker.is_approved() {
        return Ok(Vec::new());
    }

    let mut awarded = Vec::new();
    for badge in list_badges(state) {
        if state.store.badges_earned.contains_key(&(worker_id, badge.id)) {
            continue;
        }
        if !evaluate_condition(&state.store, &activity, &badge.condition, now) {
            continue;
        }

        let Some(earned) = grant(&state.store, worker_id, &badge, now)? else {
            debug!(worker_id = %worker_id, badge = %badge.code, "badge already granted");
            continue;
        };

        state.metrics.badges_awarded_total.inc();
        info!(worker_id = %worker_id, badge = %badge.code, points = badge.points, "badge awarded");
        notify(
            state,
            DomainEvent::new(EventKind::BadgeAwarded, badge.id, None, vec![worker_id]),
        );
        awarded.push(earned);
    }

    Ok(awarded)
}

pub fn check_auto_award_badges(state: &AppState, worker_id: Uuid) -> Result<Vec<BadgeEarned>, AppError> {
    check_auto_award_badges_at(state, worker_id, Utc::now())
}

/// Adds a catalog entry. Stored badges are never edited.
pub fn register_badge(state: &AppState, actor_id: Uuid, new_badge: NewBadge) -> Result<Badge, AppError> {
    let code = new_badge.code.trim().to_lowercase();
    if code.is_empty() || new_badge.name.trim().is_empty() {
        return Err(AppError::Validation("badge code and name are required".to_string()));
    }
    if new_badge.points < 0 {
        return Err(AppError::Validation("badge points must be >= 0".to_string()));
    }

    let result = state.store.transaction(|store| {
        let actor = store.worker(&actor_id)?;
        permission::require_capability(&actor, Capability::ManagePoints)?;
        if !actor.is_approved() {
            return Err(AppError::denied(
                DeniedRule::NotApproved,
                format!("worker {actor_id} is not approved"),
            ));
        }

        if store.badges.iter().any(|entry| entry.value().code == code) {
            return Err(AppError::AlreadyExists(format!("badge {code}")));
        }

        let badge = badge(
            &code,
            &new_badge.name,
            &new_badge.description,
            new_badge.points,
            new_badge.condition,
        );
        store.badges.insert(badge.id, badge.clone());
        Ok(badge)
    });

    let badge = audit::guard(state, actor_id, "register_badge", None, result)?;
    info!(actor_id = %actor_id, badge = %badge.code, "badge registered");
    Ok(badge)
}
