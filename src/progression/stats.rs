//! Per-worker activity figures shared by eligibility, badges, and ops queries.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::route_km;
use crate::models::progression::PointsAccount;
use crate::models::task::{Task, TaskStatus};
use crate::models::worker::Worker;
use crate::models::zone::ZoneType;
use crate::permission::{self, zone::ZonePath};
use crate::state::AppState;
use crate::store::Store;

/// A worker plus everything it has done, read once per evaluation.
#[derive(Debug, Clone)]
pub struct WorkerActivity {
    pub worker: Worker,
    pub tasks: Vec<Task>,
    pub active_area_zones: u32,
    pub endorsements: u32,
}

impl WorkerActivity {
    pub fn load(store: &Store, worker_id: &Uuid) -> Result<Self, AppError> {
        let worker = store.worker(worker_id)?;

        let active_area_zones = permission::worker_zones(store, &worker)
            .iter()
            .filter(|code| {
                ZonePath::parse(code).is_some_and(|path| path.zone_type() == ZoneType::Area)
            })
            .count() as u32;

        let endorsements = store
            .endorsements
            .iter()
            .filter(|entry| entry.value().worker_id == *worker_id)
            .count() as u32;

        Ok(Self {
            tasks: store.tasks_for(worker_id),
            worker,
            active_area_zones,
            endorsements,
        })
    }

    fn finished(&self, status: TaskStatus) -> impl Iterator<Item = (&Task, DateTime<Utc>)> + '_ {
        self.tasks
            .iter()
            .filter(move |task| task.status == status)
            .filter_map(|task| task.completed_at.map(|at| (task, at)))
    }

    pub fn delivered_total(&self) -> u32 {
        self.finished(TaskStatus::Delivered).count() as u32
    }

    pub fn delivered_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
        self.finished(TaskStatus::Delivered)
            .filter(|(_, at)| *at >= from && *at < to)
            .count() as u32
    }

    pub fn failed_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
        self.finished(TaskStatus::Failed)
            .filter(|(_, at)| *at >= from && *at < to)
            .count() as u32
    }

    /// Distinct calendar days (UTC) with a delivery among the `window_days` ending today.
    pub fn active_days(&self, now: DateTime<Utc>, window_days: i64) -> u32 {
        let today = now.date_naive();
        let days: BTreeSet<_> = self
            .finished(TaskStatus::Delivered)
            .map(|(_, at)| at.date_naive())
            .filter(|day| *day <= today && (today - *day).num_days() < window_days)
            .collect();
        days.len() as u32
    }

    /// Delivered share of tasks finished in the trailing window, as a percentage.
    pub fn completion_rate(&self, now: DateTime<Utc>, window_days: i64) -> f64 {
        let from = now - Duration::days(window_days);
        let to = now + Duration::seconds(1);
        rate(self.delivered_between(from, to), self.failed_between(from, to))
    }

    pub fn mean_rating(&self, now: DateTime<Utc>, window_days: i64) -> Option<f64> {
        let from = now - Duration::days(window_days);
        let ratings: Vec<f64> = self
            .finished(TaskStatus::Delivered)
            .filter(|(_, at)| *at >= from)
            .filter_map(|(task, _)| task.rating.map(f64::from))
            .collect();

        if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
        }
    }

    /// Pickup-to-delivery distance over deliveries where both points are known.
    pub fn distance_km(&self) -> f64 {
        self.finished(TaskStatus::Delivered)
            .filter_map(|(task, _)| route_km(task))
            .sum()
    }

    pub fn months_of_service(&self, now: DateTime<Utc>) -> u32 {
        self.worker
            .approved_at
            .map(|approved_at| months_between(approved_at, now))
            .unwrap_or(0)
    }
}

fn rate(delivered: u32, failed: u32) -> f64 {
    let finished = delivered + failed;
    if finished == 0 {
        0.0
    } else {
        f64::from(delivered) * 100.0 / f64::from(finished)
    }
}

/// Whole calendar months elapsed from `start` to `end`.
pub fn months_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    if end <= start {
        return 0;
    }

    let rough = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    let mut months = rough.max(0) as u32;
    while months > 0
        && start
            .checked_add_months(Months::new(months))
            .is_none_or(|reached| reached > end)
    {
        months -= 1;
    }
    months
}

/// Count of approved same-level workers' deliveries in a window, keyed by worker.
pub fn delivery_counts(
    store: &Store,
    level: u8,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> HashMap<Uuid, u32> {
    let mut counts: HashMap<Uuid, u32> = store
        .workers
        .iter()
        .filter(|entry| entry.value().level == level && entry.value().is_approved())
        .map(|entry| (*entry.key(), 0))
        .collect();

    for entry in store.tasks.iter() {
        let task = entry.value();
        let in_window = task.completed_at.is_some_and(|at| at >= from && at < to);
        if task.status != TaskStatus::Delivered || !in_window {
            continue;
        }
        if let Some(count) = task.courier_id.and_then(|id| counts.get_mut(&id)) {
            *count += 1;
        }
    }

    counts
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPerformance {
    pub worker_id: Uuid,
    pub name: String,
    pub level: u8,
    pub zone_code: String,
    pub delivered: u32,
    pub failed: u32,
    pub completion_rate: f64,
    pub open_tasks: usize,
    pub rating: f64,
    pub points: PointsAccount,
    pub available_points: i64,
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl StatsRange {
    fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.from.unwrap_or(DateTime::<Utc>::MIN_UTC),
            self.to.unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}

pub fn worker_performance(
    state: &AppState,
    worker_id: &Uuid,
    range: &StatsRange,
) -> Result<WorkerPerformance, AppError> {
    let store = &state.store;
    let activity = WorkerActivity::load(store, worker_id)?;
    let (from, to) = range.bounds();

    let delivered = activity.delivered_between(from, to);
    let failed = activity.failed_between(from, to);
    let points = store.points_account(worker_id);

    let mut badges: Vec<String> = store
        .badges_earned
        .iter()
        .filter(|entry| entry.key().0 == *worker_id)
        .map(|entry| entry.value().badge_code.clone())
        .collect();
    badges.sort();

    Ok(WorkerPerformance {
        worker_id: *worker_id,
        name: activity.worker.name.clone(),
        level: activity.worker.level,
        zone_code: activity.worker.zone_code.clone(),
        delivered,
        failed,
        completion_rate: rate(delivered, failed),
        open_tasks: store.open_task_count(worker_id),
        rating: activity.worker.rating,
        available_points: points.available(),
        points,
        badges,
    })
}

/// One row per worker whose primary zone lies inside `zone_code`.
pub fn zone_performance(
    state: &AppState,
    zone_code: &str,
    range: &StatsRange,
) -> Result<Vec<WorkerPerformance>, AppError> {
    let mut worker_ids: Vec<(u8, String, Uuid)> = state
        .store
        .workers
        .iter()
        .filter(|entry| permission::zone::contains(zone_code, &entry.value().zone_code))
        .map(|entry| {
            let worker = entry.value();
            (worker.level, worker.zone_code.clone(), worker.id)
        })
        .collect();
    worker_ids.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    worker_ids
        .iter()
        .map(|(_, _, id)| worker_performance(state, id, range))
        .collect()
}
