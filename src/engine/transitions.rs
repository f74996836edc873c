//! Task lifecycle: creation, self-claim, courier-driven status changes.
//!
//! ```text
//! available -> accepted -> collected -> in_transit -> delivered
//!                                                  \-> failed
//! ```

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::engine::assignment::{self, ClaimRequest};
use crate::error::AppError;
use crate::models::assignment::AssignmentType;
use crate::models::progression::PointsKind;
use crate::models::task::{NewTask, StatusChange, Task, TaskStatus};
use crate::permission::{self, Capability, DeniedRule};
use crate::progression::{points, sweeper};
use crate::state::AppState;

const TRANSITIONS: &[(TaskStatus, TaskStatus)] = &[
    (TaskStatus::Available, TaskStatus::Accepted),
    (TaskStatus::Accepted, TaskStatus::Collected),
    (TaskStatus::Collected, TaskStatus::InTransit),
    (TaskStatus::InTransit, TaskStatus::Delivered),
    (TaskStatus::InTransit, TaskStatus::Failed),
];

pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    TRANSITIONS.contains(&(from, to))
}

pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), AppError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition { from, to })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub courier_id: Option<Uuid>,
    pub zone: Option<String>,
}

/// Entry point for the content domain. Locations are stored as given.
pub fn create_task(state: &AppState, new_task: NewTask) -> Result<Task, AppError> {
    if new_task.content_ref.trim().is_empty() {
        return Err(AppError::Validation("content_ref cannot be empty".to_string()));
    }
    if new_task.pickup.zone_code.trim().is_empty() {
        return Err(AppError::Validation("pickup zone cannot be empty".to_string()));
    }
    if new_task.reward < 0 {
        return Err(AppError::Validation("reward must be >= 0".to_string()));
    }

    let now = Utc::now();
    let task = Task {
        id: Uuid::new_v4(),
        content_ref: new_task.content_ref,
        pickup: new_task.pickup,
        delivery: new_task.delivery,
        status: TaskStatus::Available,
        courier_id: None,
        priority: new_task.priority,
        deadline: None,
        reward: new_task.reward,
        rating: None,
        rated_by: None,
        status_history: Vec::new(),
        version: 0,
        created_at: now,
        updated_at: now,
        completed_at: None,
    };

    state.store.tasks.insert(task.id, task.clone());
    info!(task_id = %task.id, zone = %task.pickup.zone_code, "task created");
    Ok(task)
}

/// A courier claims an available task in its own zone.
pub fn accept_task(state: &AppState, worker_id: Uuid, task_id: Uuid) -> Result<Task, AppError> {
    let result = (|| {
        let worker = state.store.worker(&worker_id)?;
        permission::require_capability(&worker, Capability::AcceptTask)?;
        if !worker.is_approved() {
            return Err(AppError::denied(
                DeniedRule::NotApproved,
                format!("worker {worker_id} is not approved"),
            ));
        }

        let task = state.store.task(&task_id)?;
        if task.status != TaskStatus::Available {
            return Err(AppError::AlreadyAssigned(task_id));
        }
        if !permission::is_zone_authorized(&state.store, &worker, &task.pickup.zone_code) {
            return Err(AppError::ZoneMismatch {
                task_zone: task.pickup.zone_code.clone(),
            });
        }

        assignment::claim(
            state,
            &task,
            ClaimRequest {
                courier_id: worker_id,
                assigned_by: worker_id,
                assignment_type: AssignmentType::SelfAccept,
                reason: None,
                scored: None,
            },
        )
    })();

    let (task, _) = audit::guard(state, worker_id, "accept_task", Some(task_id), result)?;
    Ok(task)
}

/// Owner-only step along the transition table. `delivered` pays the reward.
pub fn advance_task(
    state: &AppState,
    worker_id: Uuid,
    task_id: Uuid,
    next: TaskStatus,
) -> Result<Task, AppError> {
    if next == TaskStatus::Accepted {
        return Err(AppError::Validation(
            "tasks are accepted through accept or assign".to_string(),
        ));
    }

    let result = state.store.transaction(|store| {
        let mut task = store.task(&task_id)?;
        validate_transition(task.status, next)?;

        if task.courier_id != Some(worker_id) {
            return Err(AppError::denied(
                DeniedRule::NotTaskOwner,
                format!("worker {worker_id} does not hold task {task_id}"),
            ));
        }

        let worker = store.worker(&worker_id)?;
        permission::require_capability(&worker, Capability::UpdateTaskStatus)?;

        let now = Utc::now();
        if next == TaskStatus::Delivered && task.reward > 0 {
            points::post(
                store,
                worker_id,
                PointsKind::Earn,
                task.reward,
                "task_delivered",
                Some(task_id.to_string()),
            )?;
        }

        task.status_history.push(StatusChange {
            from: task.status,
            to: next,
            actor_id: worker_id,
            at: now,
        });
        task.status = next;
        task.version += 1;
        task.updated_at = now;
        if next.is_terminal() {
            task.completed_at = Some(now);
        }

        store.tasks.insert(task.id, task.clone());
        Ok(task)
    });

    let task = audit::guard(state, worker_id, "advance_task", Some(task_id), result)?;

    info!(task_id = %task_id, worker_id = %worker_id, status = %task.status, "task status changed");

    if task.status.is_terminal() {
        sweeper::enqueue_badge_sweep(state, worker_id);
    }

    Ok(task)
}

/// Recipient feedback on a delivered task; refreshes the courier's mean rating.
/// One rating per task, and never from the courier who delivered it.
pub fn rate_delivery(
    state: &AppState,
    rater_id: Uuid,
    task_id: Uuid,
    stars: u8,
) -> Result<Task, AppError> {
    if !(1..=5).contains(&stars) {
        return Err(AppError::Validation("rating must be 1..=5".to_string()));
    }

    let result = state.store.transaction(|store| {
        let mut task = store.task(&task_id)?;
        if task.status != TaskStatus::Delivered {
            return Err(AppError::Conflict(format!("task {task_id} is not delivered")));
        }
        if task.rating.is_some() {
            return Err(AppError::Conflict(format!("task {task_id} is already rated")));
        }
        let courier_id = task
            .courier_id
            .ok_or_else(|| AppError::Internal(format!("delivered task {task_id} has no courier")))?;
        let mut worker = store.worker(&courier_id)?;
        if rater_id == worker.id || rater_id == worker.user_id {
            return Err(AppError::denied(
                DeniedRule::SelfRating,
                format!("courier {courier_id} cannot rate its own delivery"),
            ));
        }

        task.rating = Some(stars);
        task.rated_by = Some(rater_id);
        task.updated_at = Utc::now();
        store.tasks.insert(task.id, task.clone());

        let ratings: Vec<f64> = store
            .tasks_for(&courier_id)
            .iter()
            .filter_map(|task| task.rating.map(f64::from))
            .collect();
        worker.rating = ratings.iter().sum::<f64>() / ratings.len() as f64;
        worker.updated_at = Utc::now();
        store.workers.insert(worker.id, worker);

        Ok(task)
    });

    let task = audit::guard(state, rater_id, "rate_delivery", Some(task_id), result)?;
    info!(task_id = %task_id, rater_id = %rater_id, stars, "delivery rated");
    Ok(task)
}

pub fn is_overdue(task: &Task, now: DateTime<Utc>) -> bool {
    !task.status.is_terminal() && task.deadline.is_some_and(|deadline| now > deadline)
}

pub fn list_overdue(state: &AppState, now: DateTime<Utc>) -> Vec<Task> {
    let mut tasks: Vec<Task> = state
        .store
        .tasks
        .iter()
        .filter(|entry| is_overdue(entry.value(), now))
        .map(|entry| entry.value().clone())
        .collect();
    tasks.sort_by_key(|task| task.deadline);
    tasks
}

pub fn list_tasks(state: &AppState, filter: &TaskFilter) -> Vec<Task> {
    let mut tasks: Vec<Task> = state
        .store
        .tasks
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|task| filter.status.is_none_or(|status| task.status == status))
        .filter(|task| filter.courier_id.is_none_or(|id| task.courier_id == Some(id)))
        .filter(|task| {
            filter
                .zone
                .as_deref()
                .is_none_or(|zone| permission::zone::contains(zone, &task.pickup.zone_code))
        })
        .collect();
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    tasks
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::config::EngineSettings;
    use crate::events::NoopSink;
    use crate::hierarchy::{bootstrap_root, create_subordinate};
    use crate::models::task::{Location, Priority};
    use crate::models::worker::{NewWorkerSpec, Worker};

    #[test]
    fn adjacency_table_is_a_single_path() {
        assert!(can_transition(TaskStatus::Available, TaskStatus::Accepted));
        assert!(can_transition(TaskStatus::InTransit, TaskStatus::Failed));
        assert!(!can_transition(TaskStatus::Available, TaskStatus::Collected));
        assert!(!can_transition(TaskStatus::Accepted, TaskStatus::InTransit));
        assert!(!can_transition(TaskStatus::Delivered, TaskStatus::Failed));
        assert!(!can_transition(TaskStatus::Collected, TaskStatus::Accepted));
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = validate_transition(TaskStatus::Accepted, TaskStatus::Delivered).unwrap_err();
        assert_eq!(err.to_string(), "invalid transition from accepted to delivered");
    }

    struct Fixture {
        state: AppState,
        courier: Worker,
        peer: Worker,
        sweeps: tokio::sync::mpsc::Receiver<Uuid>,
    }

    fn fixture() -> Fixture {
        let (state, sweeps) = AppState::with_sink(EngineSettings::default(), 16, Arc::new(NoopSink));
        let city = bootstrap_root(&state, None, Uuid::new_v4(), "c".into(), "SCH".into(), None).unwrap();
        let mut manager = city;
        for (level, zone_code) in [(3, "SCH01"), (2, "SCH01-A2")] {
            manager = hire(&state, &manager, level, zone_code);
        }
        let courier = hire(&state, &manager, 1, "SCH01-A2-B01");
        let peer = hire(&state, &manager, 1, "SCH01-A2-B02");
        Fixture {
            state,
            courier,
            peer,
            sweeps,
        }
    }

    fn hire(state: &AppState, manager: &Worker, level: u8, zone_code: &str) -> Worker {
        create_subordinate(
            state,
            manager.id,
            NewWorkerSpec {
                user_id: Uuid::new_v4(),
                name: zone_code.to_string(),
                level,
                zone_code: zone_code.to_string(),
                location: None,
            },
        )
        .unwrap()
    }

    fn parcel(state: &AppState, zone_code: &str, reward: i64) -> Task {
        let location = Location {
            zone_code: zone_code.to_string(),
            point: None,
            description: None,
        };
        create_task(
            state,
            NewTask {
                content_ref: "parcel-7".to_string(),
                pickup: location.clone(),
                delivery: location,
                priority: Priority::High,
                reward,
            },
        )
        .unwrap()
    }

    fn deliver(state: &AppState, worker_id: Uuid, task_id: Uuid) -> Task {
        for next in [TaskStatus::Collected, TaskStatus::InTransit, TaskStatus::Delivered] {
            advance_task(state, worker_id, task_id, next).unwrap();
        }
        state.store.task(&task_id).unwrap()
    }

    #[test]
    fn accept_requires_zone_cover() {
        let f = fixture();
        let other = parcel(&f.state, "SCH01-A2-B02", 0);

        let err = accept_task(&f.state, f.courier.id, other.id).unwrap_err();
        assert!(matches!(err, AppError::ZoneMismatch { .. }));

        let accepted = accept_task(&f.state, f.peer.id, other.id).unwrap();
        assert_eq!(accepted.courier_id, Some(f.peer.id));
        assert!(accepted.deadline.is_some());

        let err = accept_task(&f.state, f.peer.id, other.id).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn only_the_holder_advances_and_delivery_pays() {
        let mut f = fixture();
        let task = parcel(&f.state, "SCH01-A2-B01", 8);
        accept_task(&f.state, f.courier.id, task.id).unwrap();

        let err = advance_task(&f.state, f.peer.id, task.id, TaskStatus::Collected).unwrap_err();
        assert_eq!(err.rule(), Some(DeniedRule::NotTaskOwner));

        let done = deliver(&f.state, f.courier.id, task.id);
        assert_eq!(done.status, TaskStatus::Delivered);
        assert!(done.completed_at.is_some());
        let path: Vec<_> = done.status_history.iter().map(|change| change.to).collect();
        assert_eq!(
            path,
            vec![
                TaskStatus::Accepted,
                TaskStatus::Collected,
                TaskStatus::InTransit,
                TaskStatus::Delivered
            ]
        );

        assert_eq!(f.state.store.worker(&f.courier.id).unwrap().points, 8);
        assert_eq!(f.sweeps.try_recv().unwrap(), f.courier.id);
    }

    #[test]
    fn rating_averages_rated_deliveries() {
        let f = fixture();
        let recipient = Uuid::new_v4();
        for stars in [5, 3] {
            let task = parcel(&f.state, "SCH01-A2-B01", 0);
            accept_task(&f.state, f.courier.id, task.id).unwrap();
            deliver(&f.state, f.courier.id, task.id);
            let rated = rate_delivery(&f.state, recipient, task.id, stars).unwrap();
            assert_eq!(rated.rated_by, Some(recipient));
        }
        assert_eq!(f.state.store.worker(&f.courier.id).unwrap().rating, 4.0);

        let pending = parcel(&f.state, "SCH01-A2-B01", 0);
        let err = rate_delivery(&f.state, recipient, pending.id, 4).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = rate_delivery(&f.state, recipient, pending.id, 6).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn couriers_cannot_rate_themselves_and_ratings_are_final() {
        let f = fixture();
        let task = parcel(&f.state, "SCH01-A2-B01", 0);
        accept_task(&f.state, f.courier.id, task.id).unwrap();
        deliver(&f.state, f.courier.id, task.id);

        for rater in [f.courier.id, f.courier.user_id] {
            let err = rate_delivery(&f.state, rater, task.id, 5).unwrap_err();
            assert_eq!(err.rule(), Some(DeniedRule::SelfRating));
        }
        assert_eq!(f.state.store.task(&task.id).unwrap().rating, None);

        rate_delivery(&f.state, Uuid::new_v4(), task.id, 2).unwrap();
        let err = rate_delivery(&f.state, Uuid::new_v4(), task.id, 5).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let courier = f.state.store.worker(&f.courier.id).unwrap();
        assert_eq!(courier.rating, 2.0);
        let denied = audit::query(
            &f.state,
            &audit::AuditFilter {
                target_id: Some(task.id),
                outcome: Some(audit::AuditOutcome::Denied),
                ..Default::default()
            },
        );
        assert_eq!(denied.len(), 2);
    }

    #[test]
    fn overdue_only_counts_open_tasks_past_deadline() {
        let f = fixture();
        let task = parcel(&f.state, "SCH01-A2-B01", 0);
        let accepted = accept_task(&f.state, f.courier.id, task.id).unwrap();
        let deadline = accepted.deadline.unwrap();

        assert!(!is_overdue(&accepted, deadline));
        assert!(is_overdue(&accepted, deadline + Duration::seconds(1)));
        assert_eq!(list_overdue(&f.state, deadline + Duration::hours(1)).len(), 1);

        let done = deliver(&f.state, f.courier.id, task.id);
        assert!(!is_overdue(&done, deadline + Duration::hours(1)));
    }
}
