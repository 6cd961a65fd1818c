//! WebSocket stream of queue events for displays and operator consoles.
//!
//! Every committed engine change is forwarded as one JSON text frame, the
//! serialized `QueueEvent` (`{"type": "ticket_transitioned", ...}`).
//! Clients that fall behind get a `lagged` frame and should re-read the
//! channel views over HTTP.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use antrian_core::QueueEvent;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Sent when the client missed events.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamNotice {
    Lagged { skipped: u64 },
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut rx = state.engine().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let frame = match rx.recv().await {
                Ok(event) => {
                    WS_MESSAGES_SENT
                        .with_label_values(&[event.event_type()])
                        .inc();
                    event_frame(&event)
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} events", n);
                    WS_LAG_EVENTS.inc();
                    serde_json::to_string(&StreamNotice::Lagged { skipped: n })
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event stream closed");
                    break;
                }
            };

            match frame {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize queue event: {}", e),
            }
        }
    });

    // Clients only listen; drain until close.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Ignoring client message: {}", text.as_str());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

/// Serialize an event the way the stream sends it.
pub fn event_frame(event: &QueueEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}
