//! Hierarchy manager: enrolment, transfers, and zone claims.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::error::AppError;
use crate::events::notify;
use crate::models::event::{DomainEvent, EventKind};
use crate::models::worker::{GeoPoint, NewWorkerSpec, Worker, WorkerStatus, MAX_LEVEL};
use crate::models::zone::{ZoneAssignment, ZoneType};
use crate::permission::zone;
use crate::permission::{self, Capability, DeniedRule};
use crate::state::AppState;
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub user_id: Uuid,
    pub name: String,
    pub level: u8,
    pub zone_code: String,
    pub parent_id: Uuid,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

fn zone_type_for(level: u8) -> Result<ZoneType, AppError> {
    ZoneType::for_level(level)
        .ok_or_else(|| AppError::Validation(format!("level must be 1..=4, got {level}")))
}

fn ensure_user_free(store: &Store, user_id: &Uuid) -> Result<(), AppError> {
    if store.workers_by_user.contains_key(user_id) {
        return Err(AppError::AlreadyExists(format!(
            "user {user_id} is already a worker"
        )));
    }
    Ok(())
}

fn insert_worker(store: &Store, worker: &Worker) {
    store.workers_by_user.insert(worker.user_id, worker.id);
    store.workers.insert(worker.id, worker.clone());
}

#[allow(clippy::too_many_arguments)]
fn build_worker(
    user_id: Uuid,
    name: String,
    level: u8,
    zone_code: String,
    zone_type: ZoneType,
    parent_id: Option<Uuid>,
    status: WorkerStatus,
    location: Option<GeoPoint>,
) -> Worker {
    let now = Utc::now();
    Worker {
        id: Uuid::new_v4(),
        user_id,
        name,
        level,
        zone_code,
        zone_type,
        parent_id,
        status,
        points: 0,
        rating: 0.0,
        location,
        approved_at: (status == WorkerStatus::Approved).then_some(now),
        created_at: now,
        updated_at: now,
    }
}

fn require_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    Ok(())
}

/// With a configured token the caller must present it; without one, seeding is
/// only open while the hierarchy is empty.
fn check_bootstrap(state: &AppState, store: &Store, token: Option<&str>) -> Result<(), AppError> {
    match state.settings.bootstrap_token.as_deref() {
        Some(expected) if token == Some(expected) => Ok(()),
        Some(_) => Err(AppError::denied(
            DeniedRule::BootstrapClosed,
            "bootstrap token missing or wrong",
        )),
        None if store.workers.is_empty() => Ok(()),
        None => Err(AppError::denied(
            DeniedRule::BootstrapClosed,
            "hierarchy already seeded and no bootstrap token is configured",
        )),
    }
}

/// Seeds the parentless level-4 root of a city. Each city has one root.
pub fn bootstrap_root(
    state: &AppState,
    token: Option<&str>,
    user_id: Uuid,
    name: String,
    city_code: String,
    location: Option<GeoPoint>,
) -> Result<Worker, AppError> {
    require_name(&name)?;
    zone::validate(ZoneType::City, &city_code)?;

    let result = state.store.transaction(|store| {
        check_bootstrap(state, store, token)?;
        ensure_user_free(store, &user_id)?;
        if permission::zone_claimed_by(store, ZoneType::City, &city_code).is_some() {
            return Err(AppError::AlreadyExists(format!(
                "city {city_code} already has a root"
            )));
        }

        let worker = build_worker(
            user_id,
            name,
            MAX_LEVEL,
            city_code,
            ZoneType::City,
            None,
            WorkerStatus::Approved,
            location,
        );
        insert_worker(store, &worker);
        Ok(worker)
    });
    let worker = audit::guard(state, user_id, "bootstrap_root", None, result)?;

    audit::record_change(
        state,
        worker.id,
        "bootstrap_root",
        Some(worker.id),
        format!("city {}", worker.zone_code),
    );
    Ok(worker)
}

/// Manager-vouched enrolment: the new worker starts out approved.
pub fn create_subordinate(
    state: &AppState,
    manager_id: Uuid,
    spec: NewWorkerSpec,
) -> Result<Worker, AppError> {
    let result = create_subordinate_inner(state, manager_id, spec);
    let worker = audit::guard(state, manager_id, "create_subordinate", None, result)?;

    audit::record_change(
        state,
        manager_id,
        "create_subordinate",
        Some(worker.id),
        format!("level {} in {}", worker.level, worker.zone_code),
    );
    info!(
        manager_id = %manager_id,
        worker_id = %worker.id,
        level = worker.level,
        zone = %worker.zone_code,
        "subordinate created"
    );
    notify(
        state,
        DomainEvent::new(
            EventKind::SubordinateCreated,
            worker.id,
            Some(manager_id),
            vec![manager_id, worker.id],
        ),
    );

    Ok(worker)
}

fn create_subordinate_inner(
    state: &AppState,
    manager_id: Uuid,
    spec: NewWorkerSpec,
) -> Result<Worker, AppError> {
    require_name(&spec.name)?;

    state.store.transaction(|store| {
        let manager = store.worker(&manager_id)?;
        ensure_user_free(store, &spec.user_id)?;
        permission::require_capability(&manager, Capability::CreateSubordinate)?;

        if !manager.is_approved() {
            return Err(AppError::denied(
                DeniedRule::NotApproved,
                format!("manager {manager_id} is not approved"),
            ));
        }

        let expected = manager.level - 1;
        if spec.level != expected {
            return Err(AppError::InvalidLevelStep {
                expected,
                requested: spec.level,
            });
        }

        let zone_type = zone_type_for(spec.level)?;
        zone::validate(zone_type, &spec.zone_code)?;

        if !permission::is_zone_authorized(store, &manager, &spec.zone_code) {
            return Err(AppError::denied(
                DeniedRule::ZoneOutsideScope,
                format!("zone {} is outside the manager's zones", spec.zone_code),
            ));
        }
        permission::require_unclaimed(store, zone_type, &spec.zone_code, None)?;

        let worker = build_worker(
            spec.user_id,
            spec.name,
            spec.level,
            spec.zone_code,
            zone_type,
            Some(manager.id),
            WorkerStatus::Approved,
            spec.location,
        );
        insert_worker(store, &worker);
        Ok(worker)
    })
}

/// Self-service application; the worker waits in `pending` until reviewed.
pub fn apply(state: &AppState, spec: ApplicationSpec) -> Result<Worker, AppError> {
    require_name(&spec.name)?;

    let worker = state.store.transaction(|store| {
        ensure_user_free(store, &spec.user_id)?;

        let parent = store.worker(&spec.parent_id)?;
        if !parent.is_approved() {
            return Err(AppError::Validation(format!(
                "parent {} is not approved",
                parent.id
            )));
        }

        if spec.level >= MAX_LEVEL || parent.level != spec.level + 1 {
            return Err(AppError::InvalidLevelStep {
                expected: parent.level.saturating_sub(1),
                requested: spec.level,
            });
        }

        let zone_type = zone_type_for(spec.level)?;
        zone::validate(zone_type, &spec.zone_code)?;

        if !permission::is_zone_authorized(store, &parent, &spec.zone_code) {
            return Err(AppError::Validation(format!(
                "zone {} is not inside parent zone {}",
                spec.zone_code, parent.zone_code
            )));
        }
        permission::require_unclaimed(store, zone_type, &spec.zone_code, None)?;

        let worker = build_worker(
            spec.user_id,
            spec.name,
            spec.level,
            spec.zone_code,
            zone_type,
            Some(parent.id),
            WorkerStatus::Pending,
            spec.location,
        );
        insert_worker(store, &worker);
        Ok(worker)
    })?;

    info!(worker_id = %worker.id, level = worker.level, zone = %worker.zone_code, "application submitted");
    Ok(worker)
}

pub fn review_application(
    state: &AppState,
    approver_id: Uuid,
    worker_id: Uuid,
    approve: bool,
    comment: Option<String>,
) -> Result<Worker, AppError> {
    let result = state.store.transaction(|store| {
        let approver = store.worker(&approver_id)?;
        let mut worker = store.worker(&worker_id)?;

        permission::require_capability(&approver, Capability::ApproveApplications)?;

        let scope = permission::permission_scope(store, &approver_id);
        if !scope.can_approve_in(&worker.zone_code) {
            return Err(AppError::denied(
                DeniedRule::ZoneOutsideScope,
                format!("zone {} is outside the approver's zones", worker.zone_code),
            ));
        }

        if worker.status != WorkerStatus::Pending {
            return Err(AppError::ApplicationClosed {
                worker_id,
                status: worker.status,
            });
        }

        let now = Utc::now();
        if approve {
            permission::require_unclaimed(store, worker.zone_type, &worker.zone_code, None)?;
            worker.status = WorkerStatus::Approved;
            worker.approved_at = Some(now);
        } else {
            worker.status = WorkerStatus::Rejected;
        }
        worker.updated_at = now;
        store.workers.insert(worker.id, worker.clone());
        Ok(worker)
    });

    let worker = audit::guard(state, approver_id, "review_application", Some(worker_id), result)?;

    let verdict = if approve { "approved" } else { "rejected" };
    audit::record_change(
        state,
        approver_id,
        "review_application",
        Some(worker_id),
        match comment {
            Some(comment) => format!("{verdict}: {comment}"),
            None => verdict.to_string(),
        },
    );
    info!(approver_id = %approver_id, worker_id = %worker_id, verdict, "application reviewed");

    Ok(worker)
}

pub fn transfer_subordinate(
    state: &AppState,
    manager_id: Uuid,
    worker_id: Uuid,
    new_parent_id: Uuid,
    reason: String,
) -> Result<Worker, AppError> {
    let result = state.store.transaction(|store| {
        let manager = store.worker(&manager_id)?;
        permission::require_capability(&manager, Capability::TransferSubordinates)?;
        permission::require_manage(store, &manager_id, &worker_id)?;

        let mut worker = store.worker(&worker_id)?;
        let new_parent = store.worker(&new_parent_id)?;

        if new_parent.id == worker.id {
            return Err(AppError::Validation(
                "a worker cannot be its own parent".to_string(),
            ));
        }

        if !new_parent.is_approved() || new_parent.level <= worker.level {
            return Err(AppError::denied(
                DeniedRule::NewParentLevelTooLow,
                format!(
                    "new parent {} (level {}) cannot manage level {}",
                    new_parent.id, new_parent.level, worker.level
                ),
            ));
        }

        if new_parent.id != manager_id {
            permission::require_manage(store, &manager_id, &new_parent_id)?;
        }

        let old_parent = worker.parent_id;
        worker.parent_id = Some(new_parent.id);
        worker.updated_at = Utc::now();
        store.workers.insert(worker.id, worker.clone());

        Ok((worker, old_parent))
    });

    let (worker, old_parent) =
        audit::guard(state, manager_id, "transfer_subordinate", Some(worker_id), result)?;

    audit::record_change(
        state,
        manager_id,
        "transfer_subordinate",
        Some(worker_id),
        format!(
            "{} -> {}: {reason}",
            old_parent.map(|id| id.to_string()).unwrap_or_else(|| "none".to_string()),
            new_parent_id
        ),
    );
    info!(
        manager_id = %manager_id,
        worker_id = %worker_id,
        new_parent_id = %new_parent_id,
        "subordinate transferred"
    );

    let mut recipients = vec![new_parent_id, worker_id];
    recipients.extend(old_parent);
    notify(
        state,
        DomainEvent::new(
            EventKind::SubordinateTransferred,
            worker_id,
            Some(manager_id),
            recipients,
        ),
    );

    Ok(worker)
}

pub fn assign_zone(
    state: &AppState,
    manager_id: Uuid,
    worker_id: Uuid,
    zone_type: ZoneType,
    zone_id: String,
) -> Result<ZoneAssignment, AppError> {
    let result = state.store.transaction(|store| {
        let manager = store.worker(&manager_id)?;
        permission::require_capability(&manager, Capability::AssignZones)?;
        permission::require_manage(store, &manager_id, &worker_id)?;

        zone::validate(zone_type, &zone_id)?;

        let worker = store.worker(&worker_id)?;
        if ZoneType::for_level(worker.level) != Some(zone_type) {
            return Err(AppError::Validation(format!(
                "level {} workers hold {} zones, not {zone_type}",
                worker.level,
                worker.zone_type
            )));
        }

        if !permission::permission_scope(store, &manager_id).can_manage_in(&zone_id) {
            return Err(AppError::denied(
                DeniedRule::ZoneOutsideScope,
                format!("zone {zone_id} is outside the manager's zones"),
            ));
        }

        permission::require_unclaimed(store, zone_type, &zone_id, None)?;

        let assignment = ZoneAssignment {
            id: Uuid::new_v4(),
            worker_id,
            zone_type,
            zone_id,
            is_active: true,
            assigned_at: Utc::now(),
            assigned_by: manager_id,
            deactivated_at: None,
        };
        store.zone_assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    });

    let assignment = audit::guard(state, manager_id, "assign_zone", Some(worker_id), result)?;

    audit::record_change(
        state,
        manager_id,
        "assign_zone",
        Some(worker_id),
        format!("{} {}", assignment.zone_type, assignment.zone_id),
    );
    info!(
        manager_id = %manager_id,
        worker_id = %worker_id,
        zone = %assignment.zone_id,
        "zone assigned"
    );
    notify(
        state,
        DomainEvent::new(
            EventKind::ZoneAssigned,
            assignment.id,
            Some(manager_id),
            vec![worker_id],
        ),
    );

    Ok(assignment)
}

pub fn deactivate_zone(
    state: &AppState,
    manager_id: Uuid,
    assignment_id: Uuid,
) -> Result<ZoneAssignment, AppError> {
    let result = state.store.transaction(|store| {
        let manager = store.worker(&manager_id)?;
        permission::require_capability(&manager, Capability::AssignZones)?;

        let mut assignment = store
            .zone_assignments
            .get(&assignment_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("zone assignment {assignment_id} not found")))?;

        permission::require_manage(store, &manager_id, &assignment.worker_id)?;

        if !assignment.is_active {
            return Err(AppError::Conflict(format!(
                "zone assignment {assignment_id} is already inactive"
            )));
        }

        assignment.is_active = false;
        assignment.deactivated_at = Some(Utc::now());
        store.zone_assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    });

    let assignment = audit::guard(state, manager_id, "deactivate_zone", None, result)?;

    audit::record_change(
        state,
        manager_id,
        "deactivate_zone",
        Some(assignment.worker_id),
        format!("{} {}", assignment.zone_type, assignment.zone_id),
    );
    Ok(assignment)
}

pub fn list_workers(state: &AppState) -> Vec<Worker> {
    let mut workers: Vec<Worker> = state
        .store
        .workers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    workers.sort_by(|a, b| b.level.cmp(&a.level).then(a.zone_code.cmp(&b.zone_code)));
    workers
}

pub fn list_zone_assignments(state: &AppState, worker_id: Option<Uuid>) -> Vec<ZoneAssignment> {
    let mut assignments: Vec<ZoneAssignment> = state
        .store
        .zone_assignments
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|assignment| worker_id.is_none_or(|id| assignment.worker_id == id))
        .collect();
    assignments.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at));
    assignments
}
