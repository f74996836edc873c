//! In-process transactional store.
//!
//! Tables are `DashMap`s so reads never block each other. Every mutating unit of
//! work runs under [`Store::transaction`], which serializes writers: a closure
//! re-reads the rows it depends on, performs all of its checks, and only then
//! writes. A closure must not write before its last fallible check.

use std::sync::Mutex;

use dashmap::DashMap;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::error::AppError;
use crate::models::assignment::AssignmentHistory;
use crate::models::progression::{
    Badge, BadgeEarned, Endorsement, LevelUpgradeRequest, PointsAccount, PointsTransaction,
};
use crate::models::task::Task;
use crate::models::worker::Worker;
use crate::models::zone::ZoneAssignment;

#[derive(Default)]
pub struct Store {
    pub workers: DashMap<Uuid, Worker>,
    /// External user id -> worker id.
    pub workers_by_user: DashMap<Uuid, Uuid>,
    pub zone_assignments: DashMap<Uuid, ZoneAssignment>,
    pub tasks: DashMap<Uuid, Task>,
    pub assignment_history: DashMap<Uuid, AssignmentHistory>,
    pub upgrade_requests: DashMap<Uuid, LevelUpgradeRequest>,
    pub endorsements: DashMap<Uuid, Endorsement>,
    pub points_accounts: DashMap<Uuid, PointsAccount>,
    pub points_transactions: DashMap<Uuid, PointsTransaction>,
    pub badges: DashMap<Uuid, Badge>,
    pub badges_earned: DashMap<(Uuid, Uuid), BadgeEarned>,
    pub audit_log: DashMap<Uuid, AuditEntry>,
    commit_lock: Mutex<()>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction<T>(&self, work: impl FnOnce(&Store) -> Result<T, AppError>) -> Result<T, AppError> {
        let _guard = self
            .commit_lock
            .lock()
            .map_err(|err| AppError::Internal(format!("store lock poisoned: {err}")))?;

        work(self)
    }

    pub fn worker(&self, id: &Uuid) -> Result<Worker, AppError> {
        self.workers
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("worker {id} not found")))
    }

    pub fn task(&self, id: &Uuid) -> Result<Task, AppError> {
        self.tasks
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("task {id} not found")))
    }

    pub fn children_of(&self, parent_id: &Uuid) -> Vec<Worker> {
        let mut children: Vec<Worker> = self
            .workers
            .iter()
            .filter(|entry| entry.value().parent_id.as_ref() == Some(parent_id))
            .map(|entry| entry.value().clone())
            .collect();
        children.sort_by_key(|worker| worker.id);
        children
    }

    /// Active zone ids held through assignments (not the primary zone).
    pub fn active_zones(&self, worker_id: &Uuid) -> Vec<ZoneAssignment> {
        let mut zones: Vec<ZoneAssignment> = self
            .zone_assignments
            .iter()
            .filter(|entry| entry.value().is_active && entry.value().worker_id == *worker_id)
            .map(|entry| entry.value().clone())
            .collect();
        zones.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));
        zones
    }

    pub fn open_task_count(&self, worker_id: &Uuid) -> usize {
        self.tasks
            .iter()
            .filter(|entry| {
                let task = entry.value();
                task.courier_id.as_ref() == Some(worker_id) && task.status.is_open()
            })
            .count()
    }

    pub fn tasks_for(&self, worker_id: &Uuid) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|entry| entry.value().courier_id.as_ref() == Some(worker_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn points_account(&self, worker_id: &Uuid) -> PointsAccount {
        self.points_accounts
            .get(worker_id)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }
}
