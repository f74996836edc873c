use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::progression::badges::check_auto_award_badges;
use crate::state::AppState;

/// Queues a badge sweep for `worker_id` without waiting. A full queue drops it.
pub fn enqueue_badge_sweep(state: &AppState, worker_id: Uuid) {
    match state.badge_sweep_tx.try_send(worker_id) {
        Ok(()) => state.metrics.badge_sweeps_in_queue.inc(),
        Err(TrySendError::Full(_)) => {
            warn!(worker_id = %worker_id, "badge sweep queue full; sweep dropped");
        }
        Err(TrySendError::Closed(_)) => {
            warn!(worker_id = %worker_id, "badge sweeper stopped; sweep dropped");
        }
    }
}

pub async fn run_badge_sweeper(state: Arc<AppState>, mut sweep_rx: mpsc::Receiver<Uuid>) {
    info!("badge sweeper started");

    while let Some(worker_id) = sweep_rx.recv().await {
        state.metrics.badge_sweeps_in_queue.dec();

        match check_auto_award_badges(&state, worker_id) {
            Ok(awarded) => {
                debug!(worker_id = %worker_id, awarded = awarded.len(), "badge sweep finished");
            }
            Err(err) => error!(worker_id = %worker_id, error = %err, "badge sweep failed"),
        }
    }

    warn!("badge sweeper stopped: queue channel closed");
}
