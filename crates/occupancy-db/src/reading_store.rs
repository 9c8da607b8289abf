//! Reading store operations on the append-only `readings` table.
//!
//! Rows are only ever inserted. Timestamps are stored as ISO-8601 UTC text
//! with millisecond precision, so ordering by the text column is
//! chronological.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use occupancy_core::sink::{ReadingSink, SinkError};
use occupancy_core::{LastRecorded, StateStore};
use occupancy_types::{DayOfWeek, Reading, StoredRecord, format_timestamp};
use sqlx::SqlitePool;

use crate::error::DbError;

/// Operations on the `readings` table.
#[derive(Clone)]
pub struct ReadingStore {
    pool: SqlitePool,
}

impl ReadingStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one reading.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the insert fails.
    pub async fn insert(&self, reading: &Reading) -> Result<(), DbError> {
        sqlx::query("INSERT INTO readings (count, day, timestamp) VALUES (?1, ?2, ?3)")
            .bind(i64::from(reading.count()))
            .bind(reading.day().as_str())
            .bind(format_timestamp(&reading.timestamp()))
            .execute(&self.pool)
            .await?;

        tracing::debug!(count = reading.count(), "Inserted reading");
        Ok(())
    }

    /// All stored records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails or [`DbError::Decode`]
    /// if a row holds unusable values.
    pub async fn all(&self) -> Result<Vec<StoredRecord>, DbError> {
        let rows = sqlx::query_as::<_, ReadingRow>(
            "SELECT count, day, timestamp FROM readings ORDER BY timestamp DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredRecord::try_from).collect()
    }

    /// Stored records for one weekday, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails or [`DbError::Decode`]
    /// if a row holds unusable values.
    pub async fn by_day(&self, day: DayOfWeek) -> Result<Vec<StoredRecord>, DbError> {
        let rows = sqlx::query_as::<_, ReadingRow>(
            "SELECT count, day, timestamp FROM readings WHERE day = ?1 ORDER BY timestamp DESC",
        )
        .bind(day.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredRecord::try_from).collect()
    }

    /// The newest stored record, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails or [`DbError::Decode`]
    /// if the row holds unusable values.
    pub async fn latest(&self) -> Result<Option<StoredRecord>, DbError> {
        let row = sqlx::query_as::<_, ReadingRow>(
            "SELECT count, day, timestamp FROM readings ORDER BY timestamp DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredRecord::try_from).transpose()
    }

    /// Build a state store whose debounce baseline is the newest stored row.
    ///
    /// Without a baseline a restart would treat the first message as a
    /// first reading and write a duplicate row. The baseline is optional:
    /// an empty table, a failed query or an undecodable newest row all
    /// yield an empty store instead of an error.
    pub async fn restore_state(&self) -> StateStore {
        match self.latest().await {
            Ok(Some(record)) => {
                tracing::info!(
                    count = record.count,
                    day = %record.day,
                    timestamp = %record.timestamp,
                    "Restored debounce baseline from storage"
                );
                StateStore::with_baseline(LastRecorded {
                    reading: Reading::from(record),
                    recorded_at: record.timestamp,
                })
            }
            Ok(None) => {
                tracing::info!("No stored readings, starting without a baseline");
                StateStore::new()
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Could not restore debounce baseline, starting without one"
                );
                StateStore::new()
            }
        }
    }
}

impl ReadingSink for ReadingStore {
    async fn append(&self, reading: &Reading) -> Result<(), SinkError> {
        self.insert(reading)
            .await
            .map_err(|e| SinkError::Write(e.to_string()))
    }

    async fn query_all(&self) -> Result<Vec<StoredRecord>, SinkError> {
        self.all().await.map_err(|e| SinkError::Read(e.to_string()))
    }

    async fn query_by_day(&self, day: DayOfWeek) -> Result<Vec<StoredRecord>, SinkError> {
        self.by_day(day)
            .await
            .map_err(|e| SinkError::Read(e.to_string()))
    }
}

/// A row from the `readings` table.
///
/// Columns are nullable in the legacy schema, so every field is read as
/// optional and validated on conversion.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReadingRow {
    /// People count.
    pub count: Option<i64>,
    /// Weekday name.
    pub day: Option<String>,
    /// ISO-8601 UTC timestamp.
    pub timestamp: Option<String>,
}

impl TryFrom<ReadingRow> for StoredRecord {
    type Error = DbError;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        let count = row
            .count
            .and_then(|c| u32::try_from(c).ok())
            .ok_or_else(|| DbError::Decode(format!("count {:?}", row.count)))?;
        let day = row
            .day
            .as_deref()
            .ok_or_else(|| DbError::Decode(String::from("missing day")))
            .and_then(|d| DayOfWeek::from_str(d).map_err(|e| DbError::Decode(e.to_string())))?;
        let timestamp = row
            .timestamp
            .as_deref()
            .ok_or_else(|| DbError::Decode(String::from("missing timestamp")))
            .and_then(|ts| {
                DateTime::parse_from_rfc3339(ts)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|e| DbError::Decode(format!("timestamp {ts:?}: {e}")))
            })?;

        Ok(Self {
            count,
            day,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(count: Option<i64>, day: Option<&str>, ts: Option<&str>) -> ReadingRow {
        ReadingRow {
            count,
            day: day.map(str::to_owned),
            timestamp: ts.map(str::to_owned),
        }
    }

    #[test]
    fn converts_legacy_row() {
        let record = StoredRecord::try_from(row(
            Some(3),
            Some("Tuesday"),
            Some("2024-05-17T09:50:29.000Z"),
        ));
        assert!(matches!(
            record,
            Ok(StoredRecord { count: 3, day: DayOfWeek::Tuesday, .. })
        ));
    }

    #[test]
    fn rejects_negative_count() {
        let record = StoredRecord::try_from(row(
            Some(-1),
            Some("Monday"),
            Some("2024-05-17T09:50:29.000Z"),
        ));
        assert!(matches!(record, Err(DbError::Decode(_))));
    }

    #[test]
    fn rejects_unknown_day_and_bad_timestamp() {
        let bad_day = StoredRecord::try_from(row(Some(1), Some("Caturday"), Some("2024-05-17T09:50:29.000Z")));
        assert!(matches!(bad_day, Err(DbError::Decode(_))));
        let bad_ts = StoredRecord::try_from(row(Some(1), Some("Monday"), Some("yesterday")));
        assert!(matches!(bad_ts, Err(DbError::Decode(_))));
        let missing = StoredRecord::try_from(row(Some(1), None, None));
        assert!(matches!(missing, Err(DbError::Decode(_))));
    }
}
