//! Core data structs for the occupancy monitor.
//!
//! A [`Reading`] is what the parser produces from one sensor payload. A
//! [`StoredRecord`] is the durable row written for readings that pass the
//! debounce policy. [`RecordSummary`] and [`BlockAverage`] are read-side
//! projections served to viewers.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::DayOfWeek;

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// One occupancy observation parsed from a sensor payload.
///
/// Immutable once constructed: every sensor message yields a fresh
/// `Reading`, never a mutation of a previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    count: u32,
    day: DayOfWeek,
    #[serde(with = "iso8601")]
    timestamp: DateTime<Utc>,
}

impl Reading {
    /// Build a reading from its parts.
    pub const fn new(count: u32, day: DayOfWeek, timestamp: DateTime<Utc>) -> Self {
        Self {
            count,
            day,
            timestamp,
        }
    }

    /// Number of people detected.
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Weekday reported by the sensor.
    pub const fn day(&self) -> DayOfWeek {
        self.day
    }

    /// Sensor time of the observation.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

// ---------------------------------------------------------------------------
// StoredRecord
// ---------------------------------------------------------------------------

/// A durable row of the append-only readings log.
///
/// The JSON shape matches the table layout: `count`, `day`, and an
/// ISO-8601 `timestamp` with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Number of people detected.
    pub count: u32,
    /// Weekday reported by the sensor.
    pub day: DayOfWeek,
    /// Sensor time of the observation.
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
}

impl From<&Reading> for StoredRecord {
    fn from(reading: &Reading) -> Self {
        Self {
            count: reading.count,
            day: reading.day,
            timestamp: reading.timestamp,
        }
    }
}

impl From<StoredRecord> for Reading {
    fn from(record: StoredRecord) -> Self {
        Self::new(record.count, record.day, record.timestamp)
    }
}

// ---------------------------------------------------------------------------
// Read-side projections
// ---------------------------------------------------------------------------

/// Summary of the most recently persisted reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    /// Count of the last persisted reading.
    pub count: u32,
    /// Weekday of the last persisted reading.
    pub day: DayOfWeek,
    /// Sensor time of the last persisted reading.
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time at which the row was written.
    #[serde(with = "iso8601")]
    pub recorded_at: DateTime<Utc>,
}

/// Average occupancy over one block of hours of a weekday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockAverage {
    /// Display label, e.g. `"08-11"`.
    pub label: String,
    /// First hour (UTC, inclusive) covered by the block.
    pub start_hour: u32,
    /// Last hour (UTC, exclusive) covered by the block.
    pub end_hour: u32,
    /// Mean count over the records in the block, `0.0` when empty.
    pub average: f64,
    /// Number of records that fell in the block.
    pub samples: u32,
}

/// Format a timestamp the way the readings table stores it.
///
/// Always UTC with millisecond precision and a `Z` suffix, so that
/// lexicographic order of the stored text equals chronological order.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter for [`format_timestamp`].
mod iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn friday_afternoon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 14, 30, 5)
            .single()
            .unwrap_or_default()
    }

    #[test]
    fn stored_record_serializes_with_millis() {
        let record = StoredRecord {
            count: 2,
            day: DayOfWeek::Friday,
            timestamp: friday_afternoon(),
        };
        let json = serde_json::to_value(record).unwrap_or_default();
        assert_eq!(
            json,
            serde_json::json!({
                "count": 2,
                "day": "Friday",
                "timestamp": "2024-05-17T14:30:05.000Z",
            })
        );
    }

    #[test]
    fn stored_record_reads_legacy_rows() {
        let json = r#"{"count":1,"day":"Tuesday","timestamp":"2024-05-17T09:58:49.000Z"}"#;
        let record: Result<StoredRecord, _> = serde_json::from_str(json);
        assert!(matches!(
            record,
            Ok(StoredRecord { count: 1, day: DayOfWeek::Tuesday, .. })
        ));
    }

    #[test]
    fn reading_converts_to_record_and_back() {
        let reading = Reading::new(4, DayOfWeek::Friday, friday_afternoon());
        let record = StoredRecord::from(&reading);
        assert_eq!(record.count, 4);
        assert_eq!(Reading::from(record), reading);
    }

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let early = format_timestamp(&friday_afternoon());
        let late = format_timestamp(
            &Utc.with_ymd_and_hms(2024, 5, 17, 9, 0, 0)
                .single()
                .unwrap_or_default(),
        );
        assert!(early > late);
    }
}
