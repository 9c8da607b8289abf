//! Viewer session lifecycle.
//!
//! A [`ViewerSession`] models one live viewer independent of transport:
//!
//! ```text
//! Connecting --open()--> Open --close()--> Closed
//! ```
//!
//! Only an `Open` session receives payloads. A closed session stays
//! closed; a reconnecting viewer gets a brand new session. Polling viewers
//! never create a session, they just read the [`StateStore`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::debug;

use crate::fanout::Broadcaster;
use crate::state::{StateStore, is_placeholder};

/// Lifecycle state of a viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, not yet subscribed.
    Connecting,
    /// Subscribed and receiving payloads.
    Open,
    /// Torn down. Terminal.
    Closed,
}

/// Why a session was closed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloseReason {
    /// The viewer closed the connection.
    #[error("closed by viewer")]
    ClientClosed,

    /// Sending to the viewer failed.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The viewer did not answer a liveness ping in time.
    #[error("liveness check failed")]
    LivenessTimeout,

    /// The fanout channel shut down.
    #[error("broadcast channel closed")]
    ChannelClosed,
}

/// Source of process-unique session ids, for log correlation only.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One connected viewer.
#[derive(Debug)]
pub struct ViewerSession {
    id: u64,
    state: SessionState,
    rx: Option<broadcast::Receiver<Arc<str>>>,
    close_reason: Option<CloseReason>,
}

impl ViewerSession {
    /// A new session in the `Connecting` state.
    pub fn connecting() -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            state: SessionState::Connecting,
            rx: None,
            close_reason: None,
        }
    }

    /// Subscribe to the fanout and move to `Open`.
    ///
    /// Returns the current latest payload when one exists, so a late
    /// joiner has state without waiting for the next sensor message.
    /// Calling this on a session that is not `Connecting` does nothing.
    pub async fn open(&mut self, store: &StateStore, broadcaster: &Broadcaster) -> Option<Arc<str>> {
        if self.state != SessionState::Connecting {
            return None;
        }
        let (rx, latest) = store.subscribe(broadcaster).await;
        self.rx = Some(rx);
        self.state = SessionState::Open;
        debug!(session = self.id, "viewer session opened");
        (!is_placeholder(&latest)).then_some(latest)
    }

    /// Wait for the next payload.
    ///
    /// Returns `None` once the session is not open. If the viewer fell
    /// behind, the missed payloads are skipped and delivery resumes with
    /// the oldest payload still buffered.
    pub async fn next_payload(&mut self) -> Option<Arc<str>> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(raw) => return Some(raw),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(session = self.id, skipped, "viewer lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.close(CloseReason::ChannelClosed);
                    return None;
                }
            }
        }
    }

    /// Move to `Closed`, releasing the fanout receiver.
    ///
    /// The first reason recorded wins; closing twice is harmless.
    pub fn close(&mut self, reason: CloseReason) {
        if self.state == SessionState::Closed {
            return;
        }
        debug!(session = self.id, reason = %reason, "viewer session closed");
        self.rx = None;
        self.state = SessionState::Closed;
        self.close_reason = Some(reason);
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session receives payloads.
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Process-unique id for logging.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Why the session closed, once it has.
    pub const fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_session(store: &StateStore, broadcaster: &Broadcaster) -> ViewerSession {
        let mut session = ViewerSession::connecting();
        session.open(store, broadcaster).await;
        session
    }

    #[tokio::test]
    async fn lifecycle_moves_forward_only() {
        let store = StateStore::new();
        let broadcaster = Broadcaster::default();
        let mut session = ViewerSession::connecting();
        assert_eq!(session.state(), SessionState::Connecting);

        session.open(&store, &broadcaster).await;
        assert_eq!(session.state(), SessionState::Open);

        session.close(CloseReason::ClientClosed);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.close_reason(), Some(&CloseReason::ClientClosed));

        // No resurrection.
        assert!(session.open(&store, &broadcaster).await.is_none());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.next_payload().await.is_none());
    }

    #[tokio::test]
    async fn fresh_session_gets_no_placeholder() {
        let store = StateStore::new();
        let broadcaster = Broadcaster::default();
        let mut session = ViewerSession::connecting();
        assert!(session.open(&store, &broadcaster).await.is_none());
    }

    #[tokio::test]
    async fn late_joiner_receives_latest_immediately() {
        let store = StateStore::new();
        let broadcaster = Broadcaster::default();
        store
            .update_and_broadcast(Arc::from("Count: 4"), &broadcaster)
            .await;

        let mut session = ViewerSession::connecting();
        let initial = session.open(&store, &broadcaster).await;
        assert_eq!(initial.as_deref(), Some("Count: 4"));
    }

    #[tokio::test]
    async fn only_open_sessions_receive_payloads() {
        let store = StateStore::new();
        let broadcaster = Broadcaster::default();
        let mut open = Vec::new();
        for _ in 0..3 {
            open.push(open_session(&store, &broadcaster).await);
        }
        let mut closed = open_session(&store, &broadcaster).await;
        closed.close(CloseReason::Delivery(String::from("socket reset")));

        let delivered = store
            .update_and_broadcast(Arc::from("one"), &broadcaster)
            .await;
        store
            .update_and_broadcast(Arc::from("two"), &broadcaster)
            .await;
        assert_eq!(delivered, 3);

        for session in &mut open {
            assert_eq!(session.next_payload().await.as_deref(), Some("one"));
            assert_eq!(session.next_payload().await.as_deref(), Some("two"));
        }
        assert!(closed.next_payload().await.is_none());
    }

    #[tokio::test]
    async fn lagging_session_skips_ahead() {
        let store = StateStore::new();
        let broadcaster = Broadcaster::new(2);
        let mut session = open_session(&store, &broadcaster).await;
        for raw in ["a", "b", "c", "d"] {
            store.update_and_broadcast(Arc::from(raw), &broadcaster).await;
        }
        assert_eq!(session.next_payload().await.as_deref(), Some("c"));
        assert_eq!(session.next_payload().await.as_deref(), Some("d"));
    }

    #[tokio::test]
    async fn dropping_broadcaster_closes_session() {
        let store = StateStore::new();
        let broadcaster = Broadcaster::default();
        let mut session = open_session(&store, &broadcaster).await;
        drop(broadcaster);
        assert!(session.next_payload().await.is_none());
        assert_eq!(session.close_reason(), Some(&CloseReason::ChannelClosed));
    }
}
