//! Zone-scoped authorization.
//!
//! Everything here is a read-only query over the store. Failures come back as
//! `false`, an empty scope, or a [`DeniedRule`] naming the rule that failed;
//! callers turn rules into `AppError::PermissionDenied`.

pub mod zone;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::worker::Worker;
use crate::models::zone::ZoneType;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AcceptTask,
    UpdateTaskStatus,
    ViewOwnStats,
    CreateSubordinate,
    ManageSubordinates,
    AssignTasks,
    ViewZoneStats,
    BatchAssign,
    AssignZones,
    TransferSubordinates,
    ApproveApplications,
    ReviewUpgrades,
    ManagePoints,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::AcceptTask => "accept_task",
            Capability::UpdateTaskStatus => "update_task_status",
            Capability::ViewOwnStats => "view_own_stats",
            Capability::CreateSubordinate => "create_subordinate",
            Capability::ManageSubordinates => "manage_subordinates",
            Capability::AssignTasks => "assign_tasks",
            Capability::ViewZoneStats => "view_zone_stats",
            Capability::BatchAssign => "batch_assign",
            Capability::AssignZones => "assign_zones",
            Capability::TransferSubordinates => "transfer_subordinates",
            Capability::ApproveApplications => "approve_applications",
            Capability::ReviewUpgrades => "review_upgrades",
            Capability::ManagePoints => "manage_points",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const LEVEL_1: &[Capability] = &[
    Capability::AcceptTask,
    Capability::UpdateTaskStatus,
    Capability::ViewOwnStats,
];

const LEVEL_2: &[Capability] = &[
    Capability::CreateSubordinate,
    Capability::ManageSubordinates,
    Capability::AssignTasks,
    Capability::ViewZoneStats,
];

const LEVEL_3: &[Capability] = &[
    Capability::BatchAssign,
    Capability::AssignZones,
    Capability::TransferSubordinates,
    Capability::ApproveApplications,
    Capability::ReviewUpgrades,
];

const LEVEL_4: &[Capability] = &[Capability::ManagePoints];

/// Capabilities granted at `level`. Each level inherits everything below it.
pub fn capabilities_for(level: u8) -> BTreeSet<Capability> {
    [LEVEL_1, LEVEL_2, LEVEL_3, LEVEL_4]
        .iter()
        .take(usize::from(level.min(4)))
        .flat_map(|tier| tier.iter().copied())
        .collect()
}

pub fn has_capability(level: u8, capability: Capability) -> bool {
    capabilities_for(level).contains(&capability)
}

pub fn require_capability(worker: &Worker, capability: Capability) -> Result<(), AppError> {
    if has_capability(worker.level, capability) {
        Ok(())
    } else {
        Err(AppError::InsufficientLevel {
            level: worker.level,
            capability,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeniedRule {
    UnknownWorker,
    SelfManagement,
    NotApproved,
    LevelBelowTarget,
    ZoneNotContained,
    MissingCapability,
    ZoneOutsideScope,
    NotTaskOwner,
    ReviewerLevelTooLow,
    NewParentLevelTooLow,
    BootstrapClosed,
    SelfRating,
}

impl DeniedRule {
    pub fn as_str(self) -> &'static str {
        match self {
            DeniedRule::UnknownWorker => "unknown_worker",
            DeniedRule::SelfManagement => "self_management",
            DeniedRule::NotApproved => "not_approved",
            DeniedRule::LevelBelowTarget => "level_below_target",
            DeniedRule::ZoneNotContained => "zone_not_contained",
            DeniedRule::MissingCapability => "missing_capability",
            DeniedRule::ZoneOutsideScope => "zone_outside_scope",
            DeniedRule::NotTaskOwner => "not_task_owner",
            DeniedRule::ReviewerLevelTooLow => "reviewer_level_too_low",
            DeniedRule::NewParentLevelTooLow => "new_parent_level_too_low",
            DeniedRule::BootstrapClosed => "bootstrap_closed",
            DeniedRule::SelfRating => "self_rating",
        }
    }
}

impl fmt::Display for DeniedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionScope {
    pub worker_id: Uuid,
    pub level: u8,
    pub capabilities: BTreeSet<Capability>,
    pub manageable_zone_ids: BTreeSet<String>,
    pub assignable_zone_ids: BTreeSet<String>,
    pub approvable_zone_ids: BTreeSet<String>,
}

impl PermissionScope {
    fn empty(worker_id: Uuid, level: u8) -> Self {
        Self {
            worker_id,
            level,
            capabilities: BTreeSet::new(),
            manageable_zone_ids: BTreeSet::new(),
            assignable_zone_ids: BTreeSet::new(),
            approvable_zone_ids: BTreeSet::new(),
        }
    }

    pub fn can_assign_in(&self, zone_code: &str) -> bool {
        covers(&self.assignable_zone_ids, zone_code)
    }

    pub fn can_manage_in(&self, zone_code: &str) -> bool {
        covers(&self.manageable_zone_ids, zone_code)
    }

    pub fn can_approve_in(&self, zone_code: &str) -> bool {
        covers(&self.approvable_zone_ids, zone_code)
    }
}

fn covers(zones: &BTreeSet<String>, zone_code: &str) -> bool {
    zones.iter().any(|outer| zone::contains(outer, zone_code))
}

/// Primary zone plus every actively assigned zone.
pub fn worker_zones(store: &Store, worker: &Worker) -> BTreeSet<String> {
    let mut zones: BTreeSet<String> = store
        .active_zones(&worker.id)
        .into_iter()
        .map(|assignment| assignment.zone_id)
        .collect();
    zones.insert(worker.zone_code.clone());
    zones
}

/// Who holds `zone_id` of `zone_type`, either as an approved worker's primary zone
/// or through an active assignment. Zones are never shared.
pub fn zone_claimed_by(store: &Store, zone_type: ZoneType, zone_id: &str) -> Option<Uuid> {
    let primary = store.workers.iter().find_map(|entry| {
        let worker = entry.value();
        (worker.is_approved() && worker.zone_type == zone_type && worker.zone_code == zone_id)
            .then_some(worker.id)
    });

    primary.or_else(|| {
        store.zone_assignments.iter().find_map(|entry| {
            let assignment = entry.value();
            (assignment.is_active
                && assignment.zone_type == zone_type
                && assignment.zone_id == zone_id)
                .then_some(assignment.worker_id)
        })
    })
}

/// [`zone_claimed_by`] as a typed error; `owner` may already hold the zone.
pub fn require_unclaimed(
    store: &Store,
    zone_type: ZoneType,
    zone_id: &str,
    owner: Option<Uuid>,
) -> Result<(), AppError> {
    match zone_claimed_by(store, zone_type, zone_id) {
        Some(holder) if Some(holder) != owner => Err(AppError::ZoneConflict {
            zone_type,
            zone_id: zone_id.to_string(),
        }),
        _ => Ok(()),
    }
}

/// True if any of the worker's zones covers `zone_code`.
pub fn is_zone_authorized(store: &Store, worker: &Worker, zone_code: &str) -> bool {
    covers(&worker_zones(store, worker), zone_code)
}

pub fn permission_scope(store: &Store, worker_id: &Uuid) -> PermissionScope {
    let Some(worker) = store.workers.get(worker_id).map(|entry| entry.value().clone()) else {
        return PermissionScope::empty(*worker_id, 0);
    };

    if !worker.is_approved() {
        return PermissionScope::empty(worker.id, worker.level);
    }

    let capabilities = capabilities_for(worker.level);
    let zones = worker_zones(store, &worker);
    let zones_if = |capability: Capability| {
        if capabilities.contains(&capability) {
            zones.clone()
        } else {
            BTreeSet::new()
        }
    };

    PermissionScope {
        worker_id: worker.id,
        level: worker.level,
        manageable_zone_ids: zones_if(Capability::ManageSubordinates),
        assignable_zone_ids: zones_if(Capability::AssignTasks),
        approvable_zone_ids: zones_if(Capability::ApproveApplications),
        capabilities,
    }
}

/// Authorization primitive: may `manager` act on `target`?
///
/// Granted when the target is a direct child, or when the manager is at least
/// the target's level and one of the manager's zones contains the target's zone.
pub fn check_manage(store: &Store, manager_id: &Uuid, target_id: &Uuid) -> Result<(), DeniedRule> {
    if manager_id == target_id {
        return Err(DeniedRule::SelfManagement);
    }

    let manager = store.worker(manager_id).map_err(|_| DeniedRule::UnknownWorker)?;
    let target = store.worker(target_id).map_err(|_| DeniedRule::UnknownWorker)?;

    if !manager.is_approved() {
        return Err(DeniedRule::NotApproved);
    }

    if target.parent_id == Some(manager.id) {
        return Ok(());
    }

    if manager.level < target.level {
        return Err(DeniedRule::LevelBelowTarget);
    }

    if is_zone_authorized(store, &manager, &target.zone_code) {
        Ok(())
    } else {
        Err(DeniedRule::ZoneNotContained)
    }
}

pub fn can_manage(store: &Store, manager_id: &Uuid, target_id: &Uuid) -> bool {
    check_manage(store, manager_id, target_id).is_ok()
}

/// [`check_manage`] as a typed error for mutating callers.
pub fn require_manage(store: &Store, manager_id: &Uuid, target_id: &Uuid) -> Result<(), AppError> {
    check_manage(store, manager_id, target_id).map_err(|rule| {
        AppError::denied(
            rule,
            format!("worker {manager_id} cannot manage worker {target_id}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::worker::WorkerStatus;
    use crate::models::zone::ZoneAssignment;

    fn worker(store: &Store, level: u8, zone: &str, parent: Option<Uuid>) -> Worker {
        let now = Utc::now();
        let worker = Worker {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: format!("l{level}"),
            level,
            zone_code: zone.to_string(),
            zone_type: ZoneType::for_level(level).unwrap(),
            parent_id: parent,
            status: WorkerStatus::Approved,
            points: 0,
            rating: 4.0,
            location: None,
            approved_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        store.workers.insert(worker.id, worker.clone());
        worker
    }

    #[test]
    fn capabilities_accumulate_by_level() {
        assert!(!has_capability(1, Capability::CreateSubordinate));
        assert!(has_capability(2, Capability::CreateSubordinate));
        assert!(!has_capability(2, Capability::BatchAssign));
        assert!(has_capability(3, Capability::BatchAssign));
        assert!(has_capability(4, Capability::AcceptTask));
        assert!(has_capability(3, Capability::ReviewUpgrades));
        assert!(!has_capability(3, Capability::ManagePoints));
        assert!(capabilities_for(0).is_empty());
    }

    #[test]
    fn direct_child_is_manageable_regardless_of_zone() {
        let store = Store::new();
        let manager = worker(&store, 2, "SCH01-A1", None);
        let child = worker(&store, 1, "SCH02-A1-B01", Some(manager.id));

        assert!(can_manage(&store, &manager.id, &child.id));
    }

    #[test]
    fn zone_containment_grants_management() {
        let store = Store::new();
        let school = worker(&store, 3, "SCH01", None);
        let courier = worker(&store, 1, "SCH01-A2-B03", None);
        let outsider = worker(&store, 1, "SCH02-A2-B03", None);

        assert!(can_manage(&store, &school.id, &courier.id));
        assert_eq!(
            check_manage(&store, &school.id, &outsider.id),
            Err(DeniedRule::ZoneNotContained)
        );
    }

    #[test]
    fn lower_level_cannot_manage_higher() {
        let store = Store::new();
        let area = worker(&store, 2, "SCH01-A2", None);
        let school = worker(&store, 3, "SCH01", None);

        assert_eq!(
            check_manage(&store, &area.id, &school.id),
            Err(DeniedRule::LevelBelowTarget)
        );
        assert_eq!(
            check_manage(&store, &area.id, &area.id),
            Err(DeniedRule::SelfManagement)
        );
    }

    #[test]
    fn scope_includes_active_assignments() {
        let store = Store::new();
        let area = worker(&store, 2, "SCH01-A2", None);
        let assignment = ZoneAssignment {
            id: Uuid::new_v4(),
            worker_id: area.id,
            zone_type: ZoneType::Area,
            zone_id: "SCH01-A3".to_string(),
            is_active: true,
            assigned_at: Utc::now(),
            assigned_by: Uuid::new_v4(),
            deactivated_at: None,
        };
        store.zone_assignments.insert(assignment.id, assignment);

        let scope = permission_scope(&store, &area.id);
        assert_eq!(scope.level, 2);
        assert!(scope.can_assign_in("SCH01-A3-B01"));
        assert!(scope.can_manage_in("SCH01-A2-B07"));
        assert!(scope.approvable_zone_ids.is_empty());
    }

    #[test]
    fn unknown_worker_has_empty_scope() {
        let store = Store::new();
        let scope = permission_scope(&store, &Uuid::new_v4());
        assert!(scope.capabilities.is_empty());
        assert!(scope.assignable_zone_ids.is_empty());
    }

    #[test]
    fn primary_zones_and_active_rows_are_claims() {
        let store = Store::new();
        let area = worker(&store, 2, "SCH01-A2", None);
        assert_eq!(zone_claimed_by(&store, ZoneType::Area, "SCH01-A2"), Some(area.id));
        assert_eq!(zone_claimed_by(&store, ZoneType::Area, "SCH01-A3"), None);

        let mut assignment = ZoneAssignment {
            id: Uuid::new_v4(),
            worker_id: area.id,
            zone_type: ZoneType::Area,
            zone_id: "SCH01-A3".to_string(),
            is_active: true,
            assigned_at: Utc::now(),
            assigned_by: Uuid::new_v4(),
            deactivated_at: None,
        };
        store.zone_assignments.insert(assignment.id, assignment.clone());
        assert!(matches!(
            require_unclaimed(&store, ZoneType::Area, "SCH01-A3", None),
            Err(AppError::ZoneConflict { .. })
        ));
        assert!(require_unclaimed(&store, ZoneType::Area, "SCH01-A3", Some(area.id)).is_ok());

        assignment.is_active = false;
        store.zone_assignments.insert(assignment.id, assignment);
        assert_eq!(zone_claimed_by(&store, ZoneType::Area, "SCH01-A3"), None);
    }

    #[test]
    fn pending_workers_hold_no_claim() {
        let store = Store::new();
        let mut applicant = worker(&store, 2, "SCH01-A4", None);
        applicant.status = WorkerStatus::Pending;
        store.workers.insert(applicant.id, applicant);
        assert_eq!(zone_claimed_by(&store, ZoneType::Area, "SCH01-A4"), None);
    }
}
