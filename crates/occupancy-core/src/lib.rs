//! Ingestion and fanout core for the room occupancy monitor.
//!
//! A door sensor publishes free-text payloads such as
//! `Time: Monday, 17.05.24, 14:30:05, Count: 2`. This crate turns them into
//! typed readings, decides which ones are worth recording, keeps the
//! current state that pollers read, and fans every accepted payload out
//! to live viewers.
//!
//! # Modules
//!
//! - [`parse`] -- Two-stage payload parser (strict time, lenient count).
//! - [`debounce`] -- Count-change plus heartbeat persistence policy.
//! - [`state`] -- [`StateStore`]: latest raw payload and debounce baseline.
//! - [`sink`] -- [`ReadingSink`] trait and the in-memory [`MemorySink`].
//! - [`fanout`] -- [`Broadcaster`] over a bounded broadcast channel.
//! - [`session`] -- [`ViewerSession`] lifecycle state machine.
//! - [`pipeline`] -- [`Pipeline`]: the serialized ingest step.
//! - [`analytics`] -- Three-hour block averages for the dashboard chart.
//! - [`config`] -- Configuration loading from `occupancy-config.yaml`.
//!
//! [`StateStore`]: state::StateStore
//! [`ReadingSink`]: sink::ReadingSink
//! [`MemorySink`]: sink::MemorySink
//! [`Broadcaster`]: fanout::Broadcaster
//! [`ViewerSession`]: session::ViewerSession
//! [`Pipeline`]: pipeline::Pipeline

pub mod analytics;
pub mod config;
pub mod debounce;
pub mod fanout;
pub mod parse;
pub mod pipeline;
pub mod session;
pub mod sink;
pub mod state;

pub use debounce::{DebouncePolicy, Decision, LastRecorded};
pub use fanout::Broadcaster;
pub use parse::{ParseError, SensorMessage, parse_payload};
pub use pipeline::{IngestError, IngestOutcome, Pipeline, PipelineOptions};
pub use session::{CloseReason, SessionState, ViewerSession};
pub use sink::{MemorySink, ReadingSink, SinkError};
pub use state::{CurrentState, NO_DATA_PLACEHOLDER, StateStore};
