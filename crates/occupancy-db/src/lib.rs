//! `SQLite` persistence for the room occupancy monitor.
//!
//! Accepted readings are appended to a single `readings` table. The table
//! is never updated or deleted from; reads are ordered newest first.
//!
//! # Modules
//!
//! - [`sqlite`] -- Connection pool, configuration and migrations
//! - [`reading_store`] -- Inserts and queries; implements
//!   [`ReadingSink`](occupancy_core::sink::ReadingSink)
//! - [`error`] -- Shared error types

pub mod error;
pub mod reading_store;
pub mod sqlite;

// Re-export primary types for convenience.
pub use error::DbError;
pub use reading_store::{ReadingRow, ReadingStore};
pub use sqlite::{SqliteConfig, SqliteDatabase};
