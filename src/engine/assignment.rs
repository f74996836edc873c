use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit;
use crate::engine::scoring::{compute_score, pick_best, Candidate};
use crate::error::AppError;
use crate::events::notify;
use crate::models::assignment::{
    AssignmentHistory, AssignmentStrategy, AssignmentType, BatchItemResult, ScoreBreakdown,
    TaskAssignmentSpec,
};
use crate::models::event::{DomainEvent, EventKind};
use crate::models::task::{StatusChange, Task, TaskStatus};
use crate::models::worker::Worker;
use crate::permission::zone;
use crate::permission::{self, Capability, DeniedRule};
use crate::state::AppState;
use crate::store::Store;

/// Guards auto-hierarchy traversal against malformed parent chains.
pub const MAX_HIERARCHY_DEPTH: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub task: Task,
    pub history: AssignmentHistory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryFilter {
    pub task_id: Option<Uuid>,
    pub worker_id: Option<Uuid>,
    pub zone: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub struct ClaimRequest {
    pub courier_id: Uuid,
    pub assigned_by: Uuid,
    pub assignment_type: AssignmentType,
    pub reason: Option<String>,
    pub scored: Option<(f64, ScoreBreakdown)>,
}

/// Atomically moves `snapshot` from available to accepted and records the decision.
///
/// The write only lands if the stored task is still available at the version
/// that was read; otherwise the claim was lost and `AlreadyAssigned` is returned.
pub fn claim(
    state: &AppState,
    snapshot: &Task,
    request: ClaimRequest,
) -> Result<(Task, AssignmentHistory), AppError> {
    let deadline = Utc::now() + state.settings.task_sla()?;

    let (task, history) = state.store.transaction(|store| {
        let mut task = store.task(&snapshot.id)?;
        if task.status != TaskStatus::Available || task.version != snapshot.version {
            return Err(AppError::AlreadyAssigned(task.id));
        }

        let now = Utc::now();
        task.status_history.push(StatusChange {
            from: TaskStatus::Available,
            to: TaskStatus::Accepted,
            actor_id: request.assigned_by,
            at: now,
        });
        task.status = TaskStatus::Accepted;
        task.courier_id = Some(request.courier_id);
        task.deadline = Some(deadline);
        task.version += 1;
        task.updated_at = now;

        let history = AssignmentHistory {
            id: Uuid::new_v4(),
            task_id: task.id,
            assigned_courier_id: request.courier_id,
            assigned_by: request.assigned_by,
            assignment_type: request.assignment_type,
            previous_courier_id: None,
            reason: request.reason,
            score: request.scored.map(|(score, _)| score),
            score_breakdown: request.scored.map(|(_, breakdown)| breakdown),
            zone_code: task.pickup.zone_code.clone(),
            created_at: now,
        };

        store.tasks.insert(task.id, task.clone());
        store.assignment_history.insert(history.id, history.clone());
        Ok((task, history))
    })?;

    info!(
        task_id = %task.id,
        courier_id = %history.assigned_courier_id,
        assigned_by = %history.assigned_by,
        score = history.score.unwrap_or_default(),
        "task assigned"
    );
    notify(
        state,
        DomainEvent::new(
            EventKind::TaskAssigned,
            task.id,
            Some(history.assigned_by),
            vec![history.assigned_courier_id],
        ),
    );

    Ok((task, history))
}

/// Closest tier distance from any of the worker's zones down to `zone_code`.
pub fn zone_distance(store: &Store, worker: &Worker, zone_code: &str) -> Option<usize> {
    permission::worker_zones(store, worker)
        .iter()
        .filter_map(|outer| zone::specificity(outer, zone_code))
        .min()
}

fn eligible(store: &Store, worker: Worker, zone_code: &str) -> Option<Candidate> {
    if !worker.is_approved() {
        return None;
    }

    let zone_distance = zone_distance(store, &worker, zone_code)?;
    let open_tasks = store.open_task_count(&worker.id);

    Some(Candidate {
        worker,
        zone_distance,
        open_tasks,
    })
}

/// Breadth-first walk of the manager's sub-tree, staying inside the manager's zones.
pub fn subtree(store: &Store, manager: &Worker) -> Vec<Worker> {
    let manager_zones = permission::worker_zones(store, manager);
    let mut visited = HashSet::from([manager.id]);
    let mut queue = VecDeque::from([(manager.id, 0usize)]);
    let mut found = Vec::new();

    while let Some((parent_id, depth)) = queue.pop_front() {
        if depth >= MAX_HIERARCHY_DEPTH {
            warn!(manager_id = %manager.id, "hierarchy depth limit reached");
            continue;
        }

        for child in store.children_of(&parent_id) {
            if !visited.insert(child.id) {
                continue;
            }
            let in_scope = manager_zones
                .iter()
                .any(|outer| zone::contains(outer, &child.zone_code));
            if !in_scope {
                continue;
            }

            queue.push_back((child.id, depth + 1));
            found.push(child);
        }
    }

    found
}

fn authorize_assigner(state: &AppState, manager: &Worker, task: &Task) -> Result<(), AppError> {
    permission::require_capability(manager, Capability::AssignTasks)?;

    let scope = permission::permission_scope(&state.store, &manager.id);
    if !scope.can_assign_in(&task.pickup.zone_code) {
        return Err(AppError::denied(
            DeniedRule::ZoneOutsideScope,
            format!(
                "task zone {} is outside the assignable zones of {}",
                task.pickup.zone_code, manager.id
            ),
        ));
    }

    Ok(())
}

fn select_worker(
    state: &AppState,
    manager: &Worker,
    task: &Task,
    strategy: &AssignmentStrategy,
) -> Result<(Worker, (f64, ScoreBreakdown)), AppError> {
    let store = &state.store;
    let zone_code = task.pickup.zone_code.as_str();
    let pickup = task.pickup.point.as_ref();

    let pool = match strategy {
        AssignmentStrategy::Direct { worker_id } => {
            permission::require_manage(store, &manager.id, worker_id)?;

            let worker = store.worker(worker_id)?;
            if !worker.is_approved() {
                return Err(AppError::Validation(format!(
                    "worker {worker_id} is not approved"
                )));
            }

            let candidate = eligible(store, worker, zone_code).ok_or_else(|| {
                AppError::ZoneMismatch {
                    task_zone: zone_code.to_string(),
                }
            })?;
            let scored = compute_score(&candidate, pickup);
            return Ok((candidate.worker, scored));
        }
        AssignmentStrategy::Cascade => store.children_of(&manager.id),
        AssignmentStrategy::AutoHierarchy => subtree(store, manager),
    };

    let candidates: Vec<Candidate> = pool
        .into_iter()
        .filter_map(|worker| eligible(store, worker, zone_code))
        .collect();

    let best = pick_best(candidates, pickup).ok_or(AppError::NoEligibleWorker)?;
    Ok((best.candidate.worker, (best.score, best.breakdown)))
}

fn assign_with_retry(
    state: &AppState,
    manager_id: Uuid,
    task_id: Uuid,
    strategy: &AssignmentStrategy,
) -> Result<AssignmentOutcome, AppError> {
    let manager = state.store.worker(&manager_id)?;
    if !manager.is_approved() {
        return Err(AppError::denied(
            DeniedRule::NotApproved,
            format!("manager {manager_id} is not approved"),
        ));
    }

    let mut attempt = 0;
    loop {
        let task = state.store.task(&task_id)?;
        if task.status != TaskStatus::Available {
            return Err(AppError::AlreadyAssigned(task_id));
        }

        authorize_assigner(state, &manager, &task)?;
        let (worker, scored) = select_worker(state, &manager, &task, strategy)?;

        let request = ClaimRequest {
            courier_id: worker.id,
            assigned_by: manager_id,
            assignment_type: AssignmentType::from(strategy),
            reason: None,
            scored: Some(scored),
        };

        match claim(state, &task, request) {
            Ok((task, history)) => return Ok(AssignmentOutcome { task, history }),
            Err(err) if err.is_retryable() && attempt < state.settings.assign_retry_limit => {
                attempt += 1;
                warn!(task_id = %task_id, attempt, "claim lost, retrying with fresh task");
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn assign_task(
    state: &AppState,
    manager_id: Uuid,
    task_id: Uuid,
    strategy: AssignmentStrategy,
) -> Result<AssignmentOutcome, AppError> {
    let label = strategy.label();
    let start = Instant::now();

    let result = assign_with_retry(state, manager_id, task_id, &strategy);

    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&[label])
        .observe(start.elapsed().as_secs_f64());
    let outcome = match &result {
        Ok(_) => "success",
        Err(err) => err.kind().as_str(),
    };
    state
        .metrics
        .assignments_total
        .with_label_values(&[label, outcome])
        .inc();

    audit::guard(state, manager_id, "assign_task", Some(task_id), result)
}

pub fn reassign_task(
    state: &AppState,
    manager_id: Uuid,
    task_id: Uuid,
    new_worker_id: Uuid,
    reason: String,
) -> Result<AssignmentOutcome, AppError> {
    let deadline = Utc::now() + state.settings.task_sla()?;

    let result = state.store.transaction(|store| {
        let manager = store.worker(&manager_id)?;
        permission::require_capability(&manager, Capability::AssignTasks)?;

        let mut task = store.task(&task_id)?;
        if !matches!(
            task.status,
            TaskStatus::Available | TaskStatus::Accepted | TaskStatus::Collected
        ) {
            return Err(AppError::Conflict(format!(
                "task {task_id} in status {} cannot be reassigned",
                task.status
            )));
        }

        let previous = task.courier_id;
        if previous == Some(new_worker_id) {
            return Err(AppError::Validation(format!(
                "task {task_id} is already held by {new_worker_id}"
            )));
        }
        if let Some(current) = previous {
            permission::require_manage(store, &manager_id, &current)?;
        }
        permission::require_manage(store, &manager_id, &new_worker_id)?;

        let worker = store.worker(&new_worker_id)?;
        if !worker.is_approved() {
            return Err(AppError::Validation(format!(
                "worker {new_worker_id} is not approved"
            )));
        }
        if !permission::is_zone_authorized(store, &worker, &task.pickup.zone_code) {
            return Err(AppError::ZoneMismatch {
                task_zone: task.pickup.zone_code.clone(),
            });
        }

        let now = Utc::now();
        if task.status == TaskStatus::Available {
            task.status_history.push(StatusChange {
                from: TaskStatus::Available,
                to: TaskStatus::Accepted,
                actor_id: manager_id,
                at: now,
            });
            task.status = TaskStatus::Accepted;
        }
        task.courier_id = Some(new_worker_id);
        task.deadline = Some(deadline);
        task.version += 1;
        task.updated_at = now;

        let history = AssignmentHistory {
            id: Uuid::new_v4(),
            task_id,
            assigned_courier_id: new_worker_id,
            assigned_by: manager_id,
            assignment_type: AssignmentType::Reassign,
            previous_courier_id: previous,
            reason: Some(reason),
            score: None,
            score_breakdown: None,
            zone_code: task.pickup.zone_code.clone(),
            created_at: now,
        };

        store.tasks.insert(task.id, task.clone());
        store.assignment_history.insert(history.id, history.clone());
        Ok(AssignmentOutcome { task, history })
    });

    let outcome = audit::guard(state, manager_id, "reassign_task", Some(task_id), result)?;

    info!(
        task_id = %task_id,
        previous_courier_id = ?outcome.history.previous_courier_id,
        courier_id = %new_worker_id,
        "task reassigned"
    );

    let mut recipients = vec![new_worker_id];
    recipients.extend(outcome.history.previous_courier_id);
    notify(
        state,
        DomainEvent::new(EventKind::TaskReassigned, task_id, Some(manager_id), recipients),
    );

    Ok(outcome)
}

/// Each item is assigned on its own; one failure never aborts its siblings.
pub fn batch_assign(
    state: &AppState,
    manager_id: Uuid,
    specs: Vec<TaskAssignmentSpec>,
) -> Result<Vec<BatchItemResult>, AppError> {
    if specs.is_empty() {
        return Err(AppError::Validation("batch cannot be empty".to_string()));
    }
    if specs.len() > state.settings.max_batch_size {
        return Err(AppError::Validation(format!(
            "batch of {} exceeds the limit of {}",
            specs.len(),
            state.settings.max_batch_size
        )));
    }

    let manager = state.store.worker(&manager_id)?;
    audit::guard(
        state,
        manager_id,
        "batch_assign",
        None,
        permission::require_capability(&manager, Capability::BatchAssign),
    )?;

    let results: Vec<BatchItemResult> = specs
        .into_iter()
        .map(|spec| match assign_task(state, manager_id, spec.task_id, spec.strategy) {
            Ok(outcome) => BatchItemResult {
                task_id: spec.task_id,
                success: true,
                courier_id: outcome.task.courier_id,
                error: None,
            },
            Err(err) => BatchItemResult {
                task_id: spec.task_id,
                success: false,
                courier_id: None,
                error: Some(err.to_string()),
            },
        })
        .collect();

    let succeeded = results.iter().filter(|item| item.success).count();
    info!(
        manager_id = %manager_id,
        total = results.len(),
        succeeded,
        "batch assignment finished"
    );

    Ok(results)
}

pub fn assignment_history(state: &AppState, filter: &HistoryFilter) -> Vec<AssignmentHistory> {
    let mut rows: Vec<AssignmentHistory> = state
        .store
        .assignment_history
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|row| filter.task_id.is_none_or(|id| row.task_id == id))
        .filter(|row| {
            filter.worker_id.is_none_or(|id| {
                row.assigned_courier_id == id || row.previous_courier_id == Some(id)
            })
        })
        .filter(|row| {
            filter
                .zone
                .as_deref()
                .is_none_or(|zone| zone::contains(zone, &row.zone_code))
        })
        .filter(|row| filter.from.is_none_or(|from| row.created_at >= from))
        .filter(|row| filter.to.is_none_or(|to| row.created_at < to))
        .collect();

    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    rows
}
