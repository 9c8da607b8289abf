//! The ingestion pipeline: parse, debounce, persist, fan out.
//!
//! ```text
//! raw payload --> parse --> StateStore + Broadcaster --> DebouncePolicy --> ReadingSink
//!                                                                   \--> baseline advance
//! ```
//!
//! [`Pipeline::ingest`] handles one message at a time. An async mutex
//! serializes the whole step, so the debounce read of the baseline and
//! the write that advances it form one critical section: two messages
//! arriving together can never both decide against the same stale
//! baseline.
//!
//! No error here is fatal. A malformed payload changes nothing; a failed
//! write leaves the baseline where it was so the next sensor message is
//! re-evaluated against it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use occupancy_types::Reading;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::debounce::{DebouncePolicy, Decision, LastRecorded};
use crate::fanout::Broadcaster;
use crate::parse::{ParseError, parse_payload};
use crate::sink::{ReadingSink, SinkError};
use crate::state::StateStore;

/// Default upper bound on a single sink write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reasons a message did not complete the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// The payload was rejected by the parser. No state changed.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] ParseError),

    /// The reading was accepted and broadcast, but writing it failed.
    /// The debounce baseline was not advanced.
    #[error(transparent)]
    StorageWrite(SinkError),
}

/// What happened to an accepted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// The parsed reading.
    pub reading: Reading,
    /// The debounce decision taken.
    pub decision: Decision,
    /// Whether a row was written.
    pub persisted: bool,
    /// Number of viewer sessions the payload was queued for.
    pub delivered: usize,
}

/// Pipeline settings.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Debounce policy.
    pub policy: DebouncePolicy,
    /// Upper bound on a single sink write.
    pub write_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            policy: DebouncePolicy::default(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Single owner of the ingestion path.
pub struct Pipeline<S> {
    state: Arc<StateStore>,
    broadcaster: Broadcaster,
    sink: Arc<S>,
    options: PipelineOptions,
    ingest_lock: Mutex<()>,
}

impl<S: ReadingSink> Pipeline<S> {
    /// Assemble a pipeline over shared state, fanout and sink.
    pub fn new(
        state: Arc<StateStore>,
        broadcaster: Broadcaster,
        sink: Arc<S>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            state,
            broadcaster,
            sink,
            options,
            ingest_lock: Mutex::new(()),
        }
    }

    /// Run one raw sensor payload through the pipeline.
    ///
    /// On success the latest payload has been replaced, broadcast to every
    /// open session, and persisted if the debounce policy asked for it.
    ///
    /// # Errors
    ///
    /// - [`IngestError::MalformedPayload`] when parsing fails; nothing
    ///   changed.
    /// - [`IngestError::StorageWrite`] when the write failed or timed out;
    ///   the payload was still broadcast and the baseline is unchanged.
    pub async fn ingest(&self, raw: &str) -> Result<IngestOutcome, IngestError> {
        let _guard = self.ingest_lock.lock().await;

        let message = parse_payload(raw).inspect_err(|e| {
            warn!(error = %e, payload = raw, "dropping malformed sensor payload");
        })?;
        let reading = message.reading;

        let delivered = self
            .state
            .update_and_broadcast(message.raw, &self.broadcaster)
            .await;

        let last = self.state.last_recorded().await;
        let decision = self.options.policy.evaluate(&reading, last.as_ref());
        debug!(
            count = reading.count(),
            day = %reading.day(),
            timestamp = %reading.timestamp(),
            ?decision,
            delivered,
            "sensor reading accepted"
        );

        if !decision.should_persist() {
            return Ok(IngestOutcome {
                reading,
                decision,
                persisted: false,
                delivered,
            });
        }

        self.persist(&reading, last.as_ref()).await?;
        Ok(IngestOutcome {
            reading,
            decision,
            persisted: true,
            delivered,
        })
    }

    /// Write `reading` and advance the baseline on success.
    ///
    /// A timeout drops the in-flight append, but the sink may already have
    /// committed the row. The baseline is not advanced in that case, so the
    /// next identical reading is persisted again and the log can hold a
    /// duplicate row. Readers tolerate duplicates; the log is never
    /// deduplicated.
    async fn persist(
        &self,
        reading: &Reading,
        previous: Option<&LastRecorded>,
    ) -> Result<(), IngestError> {
        let timeout = self.options.write_timeout;
        let result = match tokio::time::timeout(timeout, self.sink.append(reading)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(SinkError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        if let Err(e) = result {
            warn!(
                error = %e,
                count = reading.count(),
                baseline_count = previous.map(|l| l.reading.count()),
                "failed to persist reading, keeping previous baseline"
            );
            return Err(IngestError::StorageWrite(e));
        }

        self.state.record_persisted(*reading, Utc::now()).await;
        info!(
            count = reading.count(),
            day = %reading.day(),
            timestamp = %reading.timestamp(),
            "reading persisted"
        );
        Ok(())
    }

    /// The shared state handle.
    pub const fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// The fanout handle.
    pub const fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// The persistence sink.
    pub const fn sink(&self) -> &Arc<S> {
        &self.sink
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::future::Future;

    use chrono::{DateTime, TimeZone, TimeDelta};
    use occupancy_types::{DayOfWeek, StoredRecord};

    use super::*;
    use crate::session::ViewerSession;
    use crate::sink::MemorySink;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, hour, minute, second)
            .single()
            .unwrap()
    }

    fn pipeline_with(sink: Arc<MemorySink>, state: Arc<StateStore>) -> Pipeline<MemorySink> {
        Pipeline::new(state, Broadcaster::default(), sink, PipelineOptions::default())
    }

    fn payload(day: &str, date: &str, time: &str, count: u32) -> String {
        format!("Time: {day}, {date}, {time}, Count: {count}")
    }

    #[tokio::test]
    async fn end_to_end_count_change() {
        let sink = Arc::new(MemorySink::new());
        let state = Arc::new(StateStore::with_baseline(LastRecorded {
            reading: Reading::new(0, DayOfWeek::Monday, at(14, 0, 0)),
            recorded_at: at(14, 0, 1),
        }));
        let pipeline = pipeline_with(Arc::clone(&sink), Arc::clone(&state));

        let mut viewers = Vec::new();
        for _ in 0..2 {
            let mut session = ViewerSession::connecting();
            session.open(&state, pipeline.broadcaster()).await;
            viewers.push(session);
        }

        let raw = "Time: Monday, 17.05.24, 14:30:05, Count: 2";
        let outcome = pipeline.ingest(raw).await.unwrap();

        assert_eq!(
            outcome.reading,
            Reading::new(2, DayOfWeek::Monday, at(14, 30, 5))
        );
        assert_eq!(outcome.decision, Decision::CountChanged);
        assert!(outcome.persisted);
        assert_eq!(outcome.delivered, 2);

        assert_eq!(
            sink.rows().await,
            vec![StoredRecord {
                count: 2,
                day: DayOfWeek::Monday,
                timestamp: at(14, 30, 5),
            }]
        );
        assert_eq!(&*state.latest_raw().await, raw);
        assert_eq!(state.last_recorded().await.unwrap().reading.count(), 2);
        for viewer in &mut viewers {
            assert_eq!(viewer.next_payload().await.as_deref(), Some(raw));
        }
    }

    #[tokio::test]
    async fn malformed_payload_changes_nothing() {
        let sink = Arc::new(MemorySink::new());
        let state = Arc::new(StateStore::new());
        let pipeline = pipeline_with(Arc::clone(&sink), Arc::clone(&state));
        pipeline
            .ingest(&payload("Friday", "17.05.24", "10:00:00", 1))
            .await
            .unwrap();
        let before = state.snapshot().await;

        let mut viewer = ViewerSession::connecting();
        viewer.open(&state, pipeline.broadcaster()).await;

        let result = pipeline.ingest("Time: Friday, 17.05.24, ten past, Count: 3").await;
        assert!(matches!(result, Err(IngestError::MalformedPayload(_))));
        assert_eq!(state.snapshot().await, before);
        assert_eq!(sink.rows().await.len(), 1);

        let nothing = tokio::time::timeout(Duration::from_millis(20), viewer.next_payload()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn repeated_count_is_debounced_but_still_broadcast() {
        let sink = Arc::new(MemorySink::new());
        let state = Arc::new(StateStore::new());
        let pipeline = pipeline_with(Arc::clone(&sink), Arc::clone(&state));

        let first = payload("Friday", "17.05.24", "10:00:00", 3);
        let repeat = payload("Friday", "17.05.24", "10:29:00", 3);
        let heartbeat = payload("Friday", "17.05.24", "10:31:00", 3);

        assert!(pipeline.ingest(&first).await.unwrap().persisted);
        let outcome = pipeline.ingest(&repeat).await.unwrap();
        assert!(!outcome.persisted);
        assert_eq!(outcome.decision, Decision::Unchanged);
        assert_eq!(&*state.latest_raw().await, repeat.as_str());

        // Heartbeat measured from the last *recorded* reading (10:00).
        let outcome = pipeline.ingest(&heartbeat).await.unwrap();
        assert_eq!(outcome.decision, Decision::Heartbeat);
        assert_eq!(sink.rows().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_write_keeps_baseline_and_retries_on_next_message() {
        let sink = Arc::new(MemorySink::new());
        let state = Arc::new(StateStore::new());
        let pipeline = pipeline_with(Arc::clone(&sink), Arc::clone(&state));

        pipeline
            .ingest(&payload("Friday", "17.05.24", "10:00:00", 1))
            .await
            .unwrap();

        sink.set_failing(true);
        let changed = payload("Friday", "17.05.24", "10:05:00", 2);
        let result = pipeline.ingest(&changed).await;
        assert!(matches!(result, Err(IngestError::StorageWrite(SinkError::Write(_)))));
        assert_eq!(&*state.latest_raw().await, changed.as_str());
        assert_eq!(state.last_recorded().await.unwrap().reading.count(), 1);

        sink.set_failing(false);
        let again = pipeline
            .ingest(&payload("Friday", "17.05.24", "10:06:00", 2))
            .await
            .unwrap();
        assert!(again.persisted);
        assert_eq!(state.last_recorded().await.unwrap().reading.count(), 2);
    }

    #[tokio::test]
    async fn out_of_order_reading_is_not_recorded() {
        let sink = Arc::new(MemorySink::new());
        let state = Arc::new(StateStore::new());
        let pipeline = pipeline_with(Arc::clone(&sink), Arc::clone(&state));

        pipeline
            .ingest(&payload("Friday", "17.05.24", "10:00:00", 1))
            .await
            .unwrap();
        let late = pipeline
            .ingest(&payload("Friday", "17.05.24", "09:00:00", 5))
            .await
            .unwrap();
        assert_eq!(late.decision, Decision::OutOfOrder);
        assert_eq!(sink.rows().await.len(), 1);
        assert_eq!(
            state.last_recorded().await.unwrap().reading.timestamp(),
            at(10, 0, 0)
        );
    }

    #[tokio::test]
    async fn concurrent_duplicates_persist_once() {
        let sink = Arc::new(MemorySink::new());
        let state = Arc::new(StateStore::new());
        let pipeline = Arc::new(pipeline_with(Arc::clone(&sink), state));

        let raw = payload("Friday", "17.05.24", "11:00:00", 4);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pipeline = Arc::clone(&pipeline);
            let raw = raw.clone();
            handles.push(tokio::spawn(async move { pipeline.ingest(&raw).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(sink.rows().await.len(), 1);
    }

    #[tokio::test]
    async fn persisted_rows_keep_arrival_order() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline_with(Arc::clone(&sink), Arc::new(StateStore::new()));
        for (minute, count) in [(0, 1), (1, 2), (2, 3), (3, 2)] {
            let time = format!("12:{minute:02}:00");
            pipeline
                .ingest(&payload("Friday", "17.05.24", &time, count))
                .await
                .unwrap();
        }
        let counts: Vec<u32> = sink.rows().await.iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![1, 2, 3, 2]);
    }

    /// A sink whose writes never complete.
    struct StalledSink;

    impl ReadingSink for StalledSink {
        fn append(&self, _: &Reading) -> impl Future<Output = Result<(), SinkError>> + Send {
            std::future::pending()
        }

        async fn query_all(&self) -> Result<Vec<StoredRecord>, SinkError> {
            Ok(Vec::new())
        }

        async fn query_by_day(&self, _: DayOfWeek) -> Result<Vec<StoredRecord>, SinkError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out() {
        let state = Arc::new(StateStore::new());
        let pipeline = Pipeline::new(
            Arc::clone(&state),
            Broadcaster::default(),
            Arc::new(StalledSink),
            PipelineOptions {
                policy: DebouncePolicy::new(TimeDelta::minutes(30)),
                write_timeout: Duration::from_secs(2),
            },
        );
        let result = pipeline
            .ingest(&payload("Friday", "17.05.24", "10:00:00", 1))
            .await;
        assert_eq!(
            result.map(|o| o.persisted),
            Err(IngestError::StorageWrite(SinkError::Timeout { timeout_ms: 2000 }))
        );
        assert!(state.last_recorded().await.is_none());
    }

    /// A sink that commits each row and then never acknowledges it.
    #[derive(Default)]
    struct CommitThenStallSink {
        inner: MemorySink,
    }

    impl ReadingSink for CommitThenStallSink {
        async fn append(&self, reading: &Reading) -> Result<(), SinkError> {
            self.inner.append(reading).await?;
            std::future::pending().await
        }

        async fn query_all(&self) -> Result<Vec<StoredRecord>, SinkError> {
            self.inner.query_all().await
        }

        async fn query_by_day(&self, day: DayOfWeek) -> Result<Vec<StoredRecord>, SinkError> {
            self.inner.query_by_day(day).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_commit_is_written_again() {
        let state = Arc::new(StateStore::new());
        let sink = Arc::new(CommitThenStallSink::default());
        let pipeline = Pipeline::new(
            Arc::clone(&state),
            Broadcaster::default(),
            Arc::clone(&sink),
            PipelineOptions {
                policy: DebouncePolicy::new(TimeDelta::minutes(30)),
                write_timeout: Duration::from_secs(2),
            },
        );
        let raw = payload("Friday", "17.05.24", "10:00:00", 1);

        assert!(pipeline.ingest(&raw).await.is_err());
        assert!(pipeline.ingest(&raw).await.is_err());

        // Both appends committed; the baseline never moved.
        assert_eq!(sink.inner.rows().await.len(), 2);
        assert!(state.last_recorded().await.is_none());
    }
}
