use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::wire::encode_event;
use crate::models::event::DomainEvent;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Json,
    Protobuf,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub worker_id: Option<Uuid>,
    #[serde(default)]
    pub encoding: Encoding,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

fn frame(event: &DomainEvent, encoding: Encoding) -> Option<Message> {
    match encoding {
        Encoding::Protobuf => Some(Message::Binary(encode_event(event))),
        Encoding::Json => match serde_json::to_string(event) {
            Ok(json) => Some(Message::Text(json)),
            Err(err) => {
                warn!(error = %err, "failed to serialize event for ws");
                None
            }
        },
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: StreamQuery) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.event_tx.subscribe());

    info!(worker_id = ?query.worker_id, encoding = ?query.encoding, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagged; events dropped");
                    continue;
                }
            };

            if query.worker_id.is_some_and(|id| !event.is_for(&id)) {
                continue;
            }
            let Some(message) = frame(&event, query.encoding) else {
                continue;
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
