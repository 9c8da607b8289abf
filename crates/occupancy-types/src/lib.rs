//! Shared type definitions for the room occupancy monitor.
//!
//! This crate is the single source of truth for the data model used across
//! the workspace: the parsed sensor [`Reading`], the durable
//! [`StoredRecord`] row, and the derived views served to viewers.
//!
//! # Modules
//!
//! - [`enums`] -- Weekday enumeration with sensor-name parsing
//! - [`structs`] -- Readings, stored records, summaries and block averages

pub mod enums;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{DayOfWeek, UnknownDay};
pub use structs::{BlockAverage, Reading, RecordSummary, StoredRecord, format_timestamp};
