//! Push channel for clients waiting on an upload.
//!
//! A client connects, sends `{"videoKey": "..."}` as its first text frame,
//! and then receives every `{videoKey, status, message}` published for that
//! key. The socket closes after `completed` is delivered.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};
use vdo_models::{ChannelHello, CorrelationKey, NotificationMessage};

use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

/// Configuration for WebSocket backpressure.
const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const WS_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Serialize and queue a notification for the send task.
async fn send_notification(tx: &mpsc::Sender<Message>, msg: &NotificationMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(_) => return false,
    };
    match tx.try_send(Message::Text(json)) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(msg).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

fn close_with(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

/// Parse the client's hello frame into the key it waits on.
fn parse_hello(text: &str) -> Option<CorrelationKey> {
    let hello: ChannelHello = serde_json::from_str(text).ok()?;
    let key = CorrelationKey::parse(hello.video_key.as_str()).ok()?;
    key.video_key().ok()
}

/// WebSocket endpoint.
pub async fn ws_notifications(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection();

    ws.on_upgrade(|socket| async move {
        handle_socket(socket, state).await;
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    })
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);
    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() || closing {
                break;
            }
        }
        ws_sender
    });

    let key = match tokio::time::timeout(WS_CLIENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => match parse_hello(&text) {
            Some(key) => key,
            None => {
                warn!("Rejecting WebSocket client with invalid hello");
                let close = close_with(close_code::POLICY, "expected {\"videoKey\": ...}");
                let _ = tx.send(close).await;
                drop(tx);
                let _ = send_task.await;
                return;
            }
        },
        Ok(_) | Err(_) => {
            debug!("WebSocket client sent no hello");
            let _ = tx.send(close_with(close_code::POLICY, "hello timeout")).await;
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    let mut subscription = state.hub.subscribe(key.clone()).await;
    info!(video_key = %key, subscription = subscription.id, "Client waiting on key");

    let mut completed = false;
    if let Some(replay) = subscription.replay.take() {
        metrics::record_ws_message_sent(replay.status.as_str());
        completed = send_notification(&tx, &replay).await && replay.is_completed();
    }

    if !completed {
        let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                event = subscription.events.recv() => {
                    let Some(event) = event else { break };
                    last_activity = Instant::now();
                    metrics::record_ws_message_sent(event.status.as_str());

                    if !send_notification(&tx, &event).await {
                        warn!(video_key = %key, "WebSocket send failed, client disconnected");
                        break;
                    }
                    if event.is_completed() {
                        completed = true;
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if last_activity.elapsed() > WS_HEARTBEAT_INTERVAL / 2
                        && tx.send(Message::Ping(vec![])).await.is_err()
                    {
                        warn!(video_key = %key, "Heartbeat failed, client disconnected");
                        break;
                    }
                }
                client_msg = receiver.next() => {
                    match client_msg {
                        Some(Ok(Message::Pong(_))) => {
                            last_activity = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(video_key = %key, "Client closed connection");
                            break;
                        }
                        Some(Err(e)) => {
                            debug!(video_key = %key, "WebSocket receive error: {}", e);
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    state.hub.unsubscribe(&key, subscription.id).await;

    if completed {
        let _ = tx.send(close_with(close_code::NORMAL, "completed")).await;
    }
    drop(tx);
    let _ = send_task.await;
    info!(video_key = %key, completed, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_maps_to_raw_upload_key() {
        assert_eq!(
            parse_hello(r#"{"videoKey":"videos/abc123"}"#),
            Some(CorrelationKey::from("videos/abc123"))
        );
        assert_eq!(
            parse_hello(r#"{"videoKey":"frames/abc123.zip"}"#),
            Some(CorrelationKey::from("videos/abc123"))
        );
    }

    #[test]
    fn test_bad_hello_rejected() {
        assert!(parse_hello("not json").is_none());
        assert!(parse_hello(r#"{"videoKey":"  "}"#).is_none());
        assert!(parse_hello(r#"{"videoKey":"thumbnails/x"}"#).is_none());
    }
}
