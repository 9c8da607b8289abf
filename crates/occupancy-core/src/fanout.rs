//! Fanout of accepted raw payloads to connected viewer sessions.
//!
//! Uses a single [`tokio::sync::broadcast`] channel. Every open
//! [`ViewerSession`](crate::session::ViewerSession) holds one receiver.
//! Publishing never waits on a receiver: closed sessions have dropped
//! their receiver and are skipped, and a session that falls more than
//! the channel capacity behind skips ahead to the newest payloads.

use std::sync::Arc;

use tokio::sync::broadcast;

/// Default capacity of the broadcast channel.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Largest accepted channel capacity. Larger requests are lowered to it.
pub const MAX_BROADCAST_CAPACITY: usize = 65_536;

/// Cloneable handle to the fanout channel.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<Arc<str>>,
}

impl Broadcaster {
    /// Create a broadcaster with the given per-receiver backlog, clamped
    /// to `1..=MAX_BROADCAST_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.clamp(1, MAX_BROADCAST_CAPACITY));
        Self { tx }
    }

    /// Register a new receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    /// Publish a payload to every open session.
    ///
    /// Returns the number of sessions it was queued for; 0 when nobody is
    /// connected, which is not an error.
    pub fn publish(&self, raw: Arc<str>) -> usize {
        self.tx.send(raw).unwrap_or(0)
    }

    /// Number of currently open sessions.
    pub fn open_sessions(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}
