//! Persistence sink trait and in-memory implementation.
//!
//! The pipeline writes accepted readings through a [`ReadingSink`]. The
//! production implementation is the `SQLite` store in `occupancy-db`;
//! [`MemorySink`] keeps rows in a `Vec` and can be switched into a failing
//! mode to exercise the write-failure path.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use occupancy_types::{DayOfWeek, Reading, StoredRecord};
use tokio::sync::Mutex;

/// Errors reported by a persistence sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Appending a reading failed.
    #[error("storage write failed: {0}")]
    Write(String),

    /// Querying stored readings failed.
    #[error("storage read failed: {0}")]
    Read(String),

    /// The write did not complete within the configured timeout.
    #[error("storage write timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },
}

/// Append-only storage for accepted readings.
///
/// Uses return-position `impl Future` so implementations can be used from
/// spawned tasks; the trait is consumed generically, not as a trait object.
pub trait ReadingSink: Send + Sync {
    /// Append one reading to the log.
    fn append(&self, reading: &Reading) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// All stored records, newest first.
    fn query_all(&self) -> impl Future<Output = Result<Vec<StoredRecord>, SinkError>> + Send;

    /// Stored records for one weekday, newest first.
    fn query_by_day(
        &self,
        day: DayOfWeek,
    ) -> impl Future<Output = Result<Vec<StoredRecord>, SinkError>> + Send;
}

/// In-memory sink used by tests and local runs without a database.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<StoredRecord>>,
    failing: AtomicBool,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail (`true`) or succeed (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Rows in insertion order.
    pub async fn rows(&self) -> Vec<StoredRecord> {
        self.rows.lock().await.clone()
    }

    fn newest_first(rows: &[StoredRecord], day: Option<DayOfWeek>) -> Vec<StoredRecord> {
        let mut out: Vec<StoredRecord> = rows
            .iter()
            .filter(|r| day.is_none_or(|d| r.day == d))
            .copied()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out
    }
}

impl ReadingSink for MemorySink {
    async fn append(&self, reading: &Reading) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Write(String::from("memory sink set to fail")));
        }
        self.rows.lock().await.push(StoredRecord::from(reading));
        Ok(())
    }

    async fn query_all(&self) -> Result<Vec<StoredRecord>, SinkError> {
        Ok(Self::newest_first(&self.rows.lock().await, None))
    }

    async fn query_by_day(&self, day: DayOfWeek) -> Result<Vec<StoredRecord>, SinkError> {
        Ok(Self::newest_first(&self.rows.lock().await, Some(day)))
    }
}
