//! `WebSocket` adapter for live viewer sessions.
//!
//! Clients connect to `GET /ws` and receive every accepted sensor payload
//! as a raw text frame, starting with the current latest payload if one
//! exists. Each connection drives one [`ViewerSession`].
//!
//! Text and binary frames sent by the viewer are ignored. The server
//! pings every `ping_interval`; a viewer that has not answered the
//! previous ping when the next one is due is disconnected.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use occupancy_core::{CloseReason, ViewerSession};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::state::AppState;

/// Smallest ping interval accepted; shorter settings are raised to it.
const MIN_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Largest ping interval accepted; longer settings are lowered to it.
const MAX_PING_INTERVAL: Duration = Duration::from_secs(86_400);

/// Upgrade an HTTP request to a `WebSocket` viewer session.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_viewer(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// The configured ping interval pulled into the supported range.
fn ping_period(configured: Duration) -> Duration {
    configured.clamp(MIN_PING_INTERVAL, MAX_PING_INTERVAL)
}

fn text_frame(raw: &str) -> Message {
    Message::Text(raw.to_owned().into())
}

/// Run one session from subscription to teardown.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let mut session = ViewerSession::connecting();

    if let Some(initial) = session.open(&state.state, &state.broadcaster).await
        && let Err(e) = socket.send(text_frame(&initial)).await
    {
        session.close(CloseReason::Delivery(e.to_string()));
        return;
    }
    debug!(session = session.id(), "WebSocket viewer connected");

    let period = ping_period(state.ping_interval);
    let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut ping = tokio::time::interval_at(start, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut awaiting_pong = false;

    let reason = loop {
        tokio::select! {
            // Next accepted payload from the pipeline.
            payload = session.next_payload() => {
                let Some(raw) = payload else {
                    break CloseReason::ChannelClosed;
                };
                if let Err(e) = socket.send(text_frame(&raw)).await {
                    break CloseReason::Delivery(e.to_string());
                }
            }
            // Liveness check.
            _ = ping.tick() => {
                if awaiting_pong {
                    break CloseReason::LivenessTimeout;
                }
                if let Err(e) = socket.send(Message::Ping(Bytes::new())).await {
                    break CloseReason::Delivery(e.to_string());
                }
                awaiting_pong = true;
            }
            // Frames from the viewer.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                    Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            break CloseReason::Delivery(e.to_string());
                        }
                    }
                    Some(Err(e)) => break CloseReason::Delivery(e.to_string()),
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {}
                }
            }
        }
    };

    session.close(reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_period_is_clamped() {
        assert_eq!(ping_period(Duration::ZERO), MIN_PING_INTERVAL);
        assert_eq!(ping_period(Duration::MAX), MAX_PING_INTERVAL);
        assert_eq!(ping_period(Duration::from_secs(30)), Duration::from_secs(30));
    }
}
