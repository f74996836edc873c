//! Versioned requirement sets for each single-step level transition.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::progression::{EligibilityReport, RequirementCheck};
use crate::models::worker::MAX_LEVEL;
use crate::progression::stats::WorkerActivity;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    CompletedTasks { min: u32 },
    ActiveDays { min_days: u32, window_days: i64 },
    ActiveAreaZones { min: u32 },
    CompletionRate { min_percent: f64, window_days: i64 },
    MonthsSinceApproval { min: u32 },
    Endorsement,
}

#[derive(Debug, Clone)]
pub struct RequirementSet {
    pub from_level: u8,
    pub to_level: u8,
    pub version: &'static str,
    pub requirements: Vec<Requirement>,
}

/// The rules for reaching `target_level` from the level below it.
pub fn requirement_set(target_level: u8) -> Option<RequirementSet> {
    let (version, requirements) = match target_level {
        2 => (
            "l1-l2/v1",
            vec![
                Requirement::CompletedTasks { min: 10 },
                Requirement::ActiveDays {
                    min_days: 7,
                    window_days: 7,
                },
            ],
        ),
        3 => (
            "l2-l3/v1",
            vec![
                Requirement::ActiveAreaZones { min: 3 },
                Requirement::CompletionRate {
                    min_percent: 80.0,
                    window_days: 30,
                },
            ],
        ),
        4 => (
            "l3-l4/v1",
            vec![
                Requirement::MonthsSinceApproval { min: 3 },
                Requirement::Endorsement,
            ],
        ),
        _ => return None,
    };

    Some(RequirementSet {
        from_level: target_level - 1,
        to_level: target_level,
        version,
        requirements,
    })
}

fn check(kind: &str, target: f64, current: f64) -> RequirementCheck {
    RequirementCheck {
        kind: kind.to_string(),
        target,
        current,
        satisfied: current >= target,
    }
}

pub fn evaluate(requirement: &Requirement, activity: &WorkerActivity, now: DateTime<Utc>) -> RequirementCheck {
    match requirement {
        Requirement::CompletedTasks { min } => check(
            "completed_tasks",
            f64::from(*min),
            f64::from(activity.delivered_total()),
        ),
        Requirement::ActiveDays {
            min_days,
            window_days,
        } => check(
            "active_days",
            f64::from(*min_days),
            f64::from(activity.active_days(now, *window_days)),
        ),
        Requirement::ActiveAreaZones { min } => check(
            "active_area_zones",
            f64::from(*min),
            f64::from(activity.active_area_zones),
        ),
        Requirement::CompletionRate {
            min_percent,
            window_days,
        } => check(
            "completion_rate",
            *min_percent,
            activity.completion_rate(now, *window_days),
        ),
        Requirement::MonthsSinceApproval { min } => check(
            "months_since_approval",
            f64::from(*min),
            f64::from(activity.months_of_service(now)),
        ),
        Requirement::Endorsement => check(
            "endorsement",
            1.0,
            f64::from(activity.endorsements.min(1)),
        ),
    }
}

pub fn check_eligibility_at(
    state: &AppState,
    worker_id: &Uuid,
    target_level: u8,
    now: DateTime<Utc>,
) -> Result<EligibilityReport, AppError> {
    let activity = WorkerActivity::load(&state.store, worker_id)?;
    let current_level = activity.worker.level;

    if current_level >= MAX_LEVEL {
        return Err(AppError::Validation(format!(
            "worker {worker_id} is already at the top level"
        )));
    }
    if target_level != current_level + 1 {
        return Err(AppError::InvalidLevelStep {
            expected: current_level + 1,
            requested: target_level,
        });
    }

    let set = requirement_set(target_level).ok_or_else(|| {
        AppError::Internal(format!("no requirement set for level {target_level}"))
    })?;

    let requirements: Vec<RequirementCheck> = set
        .requirements
        .iter()
        .map(|requirement| evaluate(requirement, &activity, now))
        .collect();
    let can_upgrade = requirements.iter().all(|check| check.satisfied);

    Ok(EligibilityReport {
        worker_id: *worker_id,
        current_level,
        target_level,
        requirement_set: set.version.to_string(),
        requirements,
        can_upgrade,
        evaluated_at: now,
    })
}

pub fn check_eligibility(
    state: &AppState,
    worker_id: &Uuid,
    target_level: u8,
) -> Result<EligibilityReport, AppError> {
    check_eligibility_at(state, worker_id, target_level, Utc::now())
}
