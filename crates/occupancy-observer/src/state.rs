//! Shared application state for the viewer API server.
//!
//! [`AppState`] bundles the handles the HTTP and `WebSocket` adapters read
//! from: the [`StateStore`] holding the latest payload and debounce
//! baseline, the [`Broadcaster`] that live sessions subscribe to, and the
//! [`ReadingStore`] serving historical queries. The observer never writes
//! any of them; only the ingestion pipeline does.

use std::sync::Arc;
use std::time::Duration;

use occupancy_core::{Broadcaster, StateStore};
use occupancy_db::ReadingStore;

/// Default interval between liveness pings on a viewer socket.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Latest payload and last-recorded baseline.
    pub state: Arc<StateStore>,
    /// Fanout handle that viewer sessions subscribe to.
    pub broadcaster: Broadcaster,
    /// Historical readings.
    pub store: ReadingStore,
    /// Interval between liveness pings on each viewer socket.
    pub ping_interval: Duration,
}

impl AppState {
    /// Assemble application state over handles shared with the pipeline.
    pub const fn new(state: Arc<StateStore>, broadcaster: Broadcaster, store: ReadingStore) -> Self {
        Self {
            state,
            broadcaster,
            store,
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }

    /// Override the liveness ping interval.
    #[must_use]
    pub const fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }
}
