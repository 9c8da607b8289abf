//! Process-wide current state shared by ingestion and the read API.
//!
//! [`StateStore`] holds two things:
//!
//! - the latest raw payload, served verbatim to pollers and late-joining
//!   viewers (a single space before any data arrives), and
//! - the last reading that was durably recorded, which is the debounce
//!   baseline.
//!
//! Only the ingestion pipeline writes to it. Reads take a short
//! [`RwLock`] read guard and never wait on persistence.
//!
//! Publishing to viewers happens under the same write guard that replaces
//! the latest payload, and subscribing happens under a read guard. A new
//! viewer therefore sees each payload exactly once: either as its initial
//! snapshot or through its receiver, never both and never out of order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use occupancy_types::{Reading, RecordSummary};
use tokio::sync::{RwLock, broadcast};

use crate::debounce::LastRecorded;
use crate::fanout::Broadcaster;

/// Value of `latest_raw` before the first message arrives.
///
/// Distinguishable from an empty-but-valid payload and from a real zero
/// count.
pub const NO_DATA_PLACEHOLDER: &str = " ";

/// Snapshot of the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentState {
    /// Most recently accepted raw payload.
    pub latest_raw: Arc<str>,
    /// Last persisted reading, if any.
    pub last_recorded: Option<LastRecorded>,
}

impl Default for CurrentState {
    fn default() -> Self {
        Self {
            latest_raw: Arc::from(NO_DATA_PLACEHOLDER),
            last_recorded: None,
        }
    }
}

/// Shared handle to the current state.
#[derive(Debug, Default)]
pub struct StateStore {
    inner: RwLock<CurrentState>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose debounce baseline is an already-stored reading.
    ///
    /// Used at startup so a restart does not write a duplicate row.
    pub fn with_baseline(baseline: LastRecorded) -> Self {
        Self {
            inner: RwLock::new(CurrentState {
                latest_raw: Arc::from(NO_DATA_PLACEHOLDER),
                last_recorded: Some(baseline),
            }),
        }
    }

    /// Replace the latest raw payload.
    pub async fn update(&self, raw: Arc<str>) {
        self.inner.write().await.latest_raw = raw;
    }

    /// Replace the latest raw payload and publish it to open sessions.
    ///
    /// Returns the number of sessions the payload was queued for.
    pub async fn update_and_broadcast(&self, raw: Arc<str>, broadcaster: &Broadcaster) -> usize {
        let mut state = self.inner.write().await;
        state.latest_raw = Arc::clone(&raw);
        broadcaster.publish(raw)
    }

    /// Register a receiver and read the latest payload atomically with
    /// respect to [`update_and_broadcast`](Self::update_and_broadcast).
    pub async fn subscribe(
        &self,
        broadcaster: &Broadcaster,
    ) -> (broadcast::Receiver<Arc<str>>, Arc<str>) {
        let state = self.inner.read().await;
        (broadcaster.subscribe(), Arc::clone(&state.latest_raw))
    }

    /// Advance the debounce baseline after a successful write.
    ///
    /// Returns `false` and leaves the baseline untouched when `reading`
    /// is older than the current baseline.
    pub async fn record_persisted(&self, reading: Reading, recorded_at: DateTime<Utc>) -> bool {
        let mut state = self.inner.write().await;
        if let Some(last) = &state.last_recorded
            && reading.timestamp() < last.reading.timestamp()
        {
            return false;
        }
        state.last_recorded = Some(LastRecorded {
            reading,
            recorded_at,
        });
        true
    }

    /// The latest raw payload, or [`NO_DATA_PLACEHOLDER`].
    pub async fn latest_raw(&self) -> Arc<str> {
        Arc::clone(&self.inner.read().await.latest_raw)
    }

    /// Whether any payload has been accepted yet.
    pub async fn has_data(&self) -> bool {
        !is_placeholder(&self.inner.read().await.latest_raw)
    }

    /// The current debounce baseline.
    pub async fn last_recorded(&self) -> Option<LastRecorded> {
        self.inner.read().await.last_recorded
    }

    /// Summary of the last persisted reading for the read API.
    pub async fn summary(&self) -> Option<RecordSummary> {
        self.last_recorded().await.map(|last| RecordSummary {
            count: last.reading.count(),
            day: last.reading.day(),
            timestamp: last.reading.timestamp(),
            recorded_at: last.recorded_at,
        })
    }

    /// A copy of the full state.
    pub async fn snapshot(&self) -> CurrentState {
        self.inner.read().await.clone()
    }
}

/// Whether a payload carries no data (blank or the placeholder).
pub fn is_placeholder(raw: &str) -> bool {
    raw.trim().is_empty()
}
