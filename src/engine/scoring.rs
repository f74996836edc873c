use std::cmp::Ordering;

use crate::geo::distance_km;
use crate::models::assignment::ScoreBreakdown;
use crate::models::worker::{GeoPoint, Worker};

const ZONE_WEIGHT: f64 = 0.40;
const RATING_WEIGHT: f64 = 0.25;
const LOAD_WEIGHT: f64 = 0.20;
const PROXIMITY_WEIGHT: f64 = 0.15;

/// A worker eligible for a task, with the facts scoring needs.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub worker: Worker,
    /// Tiers between the worker's closest covering zone and the pickup zone.
    pub zone_distance: usize,
    pub open_tasks: usize,
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

pub fn compute_score(candidate: &Candidate, pickup: Option<&GeoPoint>) -> (f64, ScoreBreakdown) {
    let breakdown = ScoreBreakdown {
        zone_score: zone_score(candidate.zone_distance),
        rating_score: rating_score(candidate.worker.rating),
        load_score: load_score(candidate.open_tasks),
        proximity_score: proximity_score(candidate.worker.location.as_ref(), pickup),
    };

    let score = weighted_score(&breakdown);
    (score, breakdown)
}

pub fn weighted_score(breakdown: &ScoreBreakdown) -> f64 {
    (breakdown.zone_score * ZONE_WEIGHT)
        + (breakdown.rating_score * RATING_WEIGHT)
        + (breakdown.load_score * LOAD_WEIGHT)
        + (breakdown.proximity_score * PROXIMITY_WEIGHT)
}

fn zone_score(zone_distance: usize) -> f64 {
    match zone_distance {
        0 => 1.0,
        1 => 0.6,
        2 => 0.3,
        _ => 0.1,
    }
}

fn rating_score(rating: f64) -> f64 {
    (rating / 5.0).clamp(0.0, 1.0)
}

fn load_score(open_tasks: usize) -> f64 {
    1.0 / (1.0 + open_tasks as f64)
}

fn proximity_score(worker: Option<&GeoPoint>, pickup: Option<&GeoPoint>) -> f64 {
    distance_km(worker, pickup)
        .map(|km| 1.0 / (1.0 + km.max(0.0)))
        .unwrap_or(0.0)
}

/// Highest score first, then seniority (earliest approval), then id.
fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            match (a.candidate.worker.approved_at, b.candidate.worker.approved_at) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
        .then_with(|| a.candidate.worker.id.cmp(&b.candidate.worker.id))
}

pub fn pick_best(candidates: Vec<Candidate>, pickup: Option<&GeoPoint>) -> Option<ScoredCandidate> {
    candidates
        .into_iter()
        .map(|candidate| {
            let (score, breakdown) = compute_score(&candidate, pickup);
            ScoredCandidate {
                candidate,
                score,
                breakdown,
            }
        })
        .min_by(rank_order)
}
