//! Push channel transport: one websocket per stream.
//!
//! The socket bridges a `PushHub` subscription to the wire. Outbound
//! frames are hub events; inbound frames are a tiny client protocol
//! (`ping`, `get_jobs`). Disconnects tear the registry entry down.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use quizhive_push::PushEvent;
use tracing::{debug, warn};

use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(recipient): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, recipient, socket))
}

async fn handle_socket(state: AppState, recipient: String, socket: WebSocket) {
    let mut subscription = state.push.subscribe(&recipient);
    let stream_id = subscription.stream_id;
    debug!(recipient, stream_id, "push channel connected");

    state.push.publish(
        &recipient,
        PushEvent::ConnectionEstablished {
            message: format!("Connected to real-time updates for {recipient}"),
        },
    );

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            event = subscription.receiver.recv() => {
                let Some(event) = event else { break };
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "dropping unserializable push event");
                        continue;
                    }
                };
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(&state, &recipient, &text);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(recipient, error = %e, "push channel read error");
                        break;
                    }
                }
            }
        }
    }

    state.push.unsubscribe(&recipient, stream_id);
    debug!(recipient, stream_id, "push channel disconnected");
}

/// Client frames: `{"type": "ping"}` and `{"type": "get_jobs"}`.
/// Replies go through the hub so every stream of the recipient sees them.
fn handle_client_frame(state: &AppState, recipient: &str, text: &str) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };

    match value.get("type").and_then(|t| t.as_str()) {
        Some("ping") => {
            state.push.publish(
                recipient,
                PushEvent::Pong {
                    timestamp: Utc::now().to_rfc3339(),
                },
            );
        }
        Some("get_jobs") => {
            let jobs = state
                .jobs
                .jobs_for_owner(recipient)
                .iter()
                .filter_map(|snapshot| serde_json::to_value(snapshot).ok())
                .collect();
            state
                .push
                .publish(recipient, PushEvent::JobsStatus { jobs });
        }
        _ => {}
    }
}
