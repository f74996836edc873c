use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::events::{BroadcastSink, EventSink};
use crate::models::event::DomainEvent;
use crate::observability::metrics::Metrics;
use crate::progression::badges;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub settings: EngineSettings,
    pub events: Arc<dyn EventSink>,
    pub event_tx: broadcast::Sender<DomainEvent>,
    /// Worker ids awaiting a background badge sweep.
    pub badge_sweep_tx: mpsc::Sender<Uuid>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        settings: EngineSettings,
        badge_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let (event_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        let sink = Arc::new(BroadcastSink::new(event_tx.clone()));
        Self::build(settings, badge_queue_size, event_tx, sink)
    }

    /// Same as [`AppState::new`] but with a caller supplied sink, e.g. `NoopSink`.
    pub fn with_sink(
        settings: EngineSettings,
        badge_queue_size: usize,
        sink: Arc<dyn EventSink>,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let (event_tx, _unused_rx) = broadcast::channel(16);
        Self::build(settings, badge_queue_size, event_tx, sink)
    }

    fn build(
        settings: EngineSettings,
        badge_queue_size: usize,
        event_tx: broadcast::Sender<DomainEvent>,
        events: Arc<dyn EventSink>,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let (badge_sweep_tx, badge_sweep_rx) = mpsc::channel(badge_queue_size);

        let store = Store::new();
        for badge in badges::default_catalog() {
            store.badges.insert(badge.id, badge);
        }

        (
            Self {
                store,
                settings,
                events,
                event_tx,
                badge_sweep_tx,
                metrics: Metrics::new(),
            },
            badge_sweep_rx,
        )
    }
}
