//! Domain event emission.
//!
//! The engine depends on an injected [`EventSink`]; delivery and fan-out belong
//! to whatever sits behind it. Emission is best effort and always happens after
//! the state change has committed.

pub mod wire;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::models::event::DomainEvent;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("no subscribers for {0}")]
    NoSubscribers(&'static str),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DomainEvent) -> Result<(), EmitError>;
}

/// Discards everything. Used where nobody listens.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &DomainEvent) -> Result<(), EmitError> {
        Ok(())
    }
}

/// Publishes onto a tokio broadcast channel consumed by the websocket stream.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<DomainEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &DomainEvent) -> Result<(), EmitError> {
        self.tx
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| EmitError::NoSubscribers(event.kind.as_str()))
    }
}

/// Emits `event`, logging and counting a failure instead of returning it.
pub fn notify(state: &AppState, event: DomainEvent) {
    match state.events.emit(&event) {
        Ok(()) => debug!(kind = event.kind.as_str(), entity_id = %event.entity_id, "event emitted"),
        Err(EmitError::NoSubscribers(kind)) => debug!(kind, "event dropped, nobody listening"),
        Err(err) => {
            state.metrics.notification_failures_total.inc();
            warn!(
                kind = event.kind.as_str(),
                entity_id = %event.entity_id,
                error = %err,
                "event emission failed"
            );
        }
    }
}
