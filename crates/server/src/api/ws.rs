//! WebSocket support for live ticket updates.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Interval between heartbeats on an idle connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket message sent to clients for real-time updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// A ticket changed.
    TicketUpdate {
        ticket_id: String,
        /// `processing`, `completed`, `failed`, or `<subtask>:<status>`.
        event: String,
    },
    /// Server heartbeat (sent periodically to keep connection alive).
    Heartbeat { timestamp: i64 },
}

impl WsMessage {
    fn kind(&self) -> &'static str {
        match self {
            WsMessage::TicketUpdate { .. } => "ticket_update",
            WsMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Broadcaster for WebSocket messages using tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast(&self, msg: WsMessage) {
        // Ignore send errors - they just mean no one is listening
        let _ = self.sender.send(msg);
    }

    /// Subscribe to receive messages.
    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    /// Convenience method to broadcast a ticket update.
    pub fn ticket_updated(&self, ticket_id: &str, event: &str) {
        self.broadcast(WsMessage::TicketUpdate {
            ticket_id: ticket_id.to_string(),
            event: event.to_string(),
        });
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
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

    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!("WebSocket client connected");

    // Forward broadcast messages (and heartbeats) to this client
    let send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            let msg = tokio::select! {
                result = rx.recv() => match result {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged, skipped {} messages", n);
                        WS_LAG_EVENTS.inc();
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                },
                _ = heartbeat.tick() => WsMessage::Heartbeat {
                    timestamp: Utc::now().timestamp(),
                },
            };

            WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();

            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize WsMessage: {}", e);
                }
            }
        }
    });

    // Handle incoming messages from client (ping/pong, close)
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Ignoring client message: {}", text);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let broadcaster = WsBroadcaster::default();
        let mut rx = broadcaster.subscribe();

        broadcaster.ticket_updated("t-1", "feedback:completed");

        let msg = rx.recv().await.unwrap();
        assert_eq!(
            msg,
            WsMessage::TicketUpdate {
                ticket_id: "t-1".to_string(),
                event: "feedback:completed".to_string(),
            }
        );
    }

    #[test]
    fn test_broadcast_without_subscribers_is_ignored() {
        let broadcaster = WsBroadcaster::new(4);
        broadcaster.ticket_updated("t-1", "processing");
    }

    #[test]
    fn test_message_serialization() {
        let msg = WsMessage::TicketUpdate {
            ticket_id: "t-1".to_string(),
            event: "completed".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ticket_update");
        assert_eq!(json["ticket_id"], "t-1");
        assert_eq!(json["event"], "completed");
    }
}
