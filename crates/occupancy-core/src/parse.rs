//! Sensor payload parsing into typed [`Reading`]s.
//!
//! The door sensor publishes free-form text such as
//!
//! ```text
//! Time: Monday, 17.05.24, 14:30:05, Count: 2
//! ```
//!
//! Parsing runs in two stages:
//!
//! 1. **Strict** -- the `Time:` segment (weekday, `DD.MM.YY` date and
//!    `HH:MM[:SS]` time) must be present and describe a real calendar
//!    instant. Anything else is a [`ParseError`] and the message is dropped.
//! 2. **Lenient** -- the `Count: <n>` token may appear anywhere. If it is
//!    missing or does not fit a `u32`, the count defaults to `0`.
//!
//! Two-digit years always map to the 2000s (`24` becomes `2024`), and the
//! date fields are read in the order the sensor emits them: day, month,
//! year.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use occupancy_types::{DayOfWeek, Reading, UnknownDay};
use regex::{Captures, Regex};

/// Weekday, `DD.MM.YY` date, `HH:MM` time with optional `:SS`.
///
/// The time must end the payload or be followed by something other than a
/// digit or colon, so `14:30:5` does not match as `14:30`.
static TIME_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"Time:\s*([A-Za-z]+),\s*(\d{2})[./-](\d{2})[./-](\d{2}),\s*(\d{2}):(\d{2})(?::(\d{2}))?(?:$|[^\d:])",
    )
    .ok()
});

/// `Count: <n>` anywhere in the payload.
static COUNT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Count:\s*(\d+)").ok());

/// Century prepended to the sensor's two-digit year.
const CENTURY: i32 = 2000;

/// Reasons a payload is rejected as malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// No `Time:` segment of the expected shape was found.
    #[error("payload has no recognizable time segment")]
    MissingTime,

    /// The weekday token is not an English weekday name.
    #[error(transparent)]
    UnknownDay(#[from] UnknownDay),

    /// The date fields do not name a real calendar day.
    #[error("invalid calendar date {day:02}.{month:02}.{year:02}")]
    InvalidDate {
        /// Day of month as sent.
        day: u32,
        /// Month as sent.
        month: u32,
        /// Two-digit year as sent.
        year: u32,
    },

    /// The time fields are out of range.
    #[error("invalid time of day {hour:02}:{minute:02}:{second:02}")]
    InvalidTime {
        /// Hour as sent.
        hour: u32,
        /// Minute as sent.
        minute: u32,
        /// Second as sent (0 when omitted).
        second: u32,
    },

    /// A built-in pattern failed to compile.
    #[error("payload pattern unavailable")]
    Pattern,
}

/// A well-formed sensor message: the parsed reading and the payload text
/// exactly as received.
///
/// The raw text (not a re-rendering of the reading) is what pollers and
/// viewers are shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorMessage {
    /// The structured observation.
    pub reading: Reading,
    /// The verbatim payload.
    pub raw: Arc<str>,
}

/// Parse a raw sensor payload.
///
/// # Errors
///
/// Returns a [`ParseError`] when the time segment is missing or invalid.
/// A missing count is not an error.
pub fn parse_payload(raw: &str) -> Result<SensorMessage, ParseError> {
    let (day, timestamp) = parse_time(raw)?;
    let count = parse_count(raw);
    Ok(SensorMessage {
        reading: Reading::new(count, day, timestamp),
        raw: Arc::from(raw),
    })
}

/// Render a reading in the sensor's wire format.
///
/// The inverse of [`parse_payload`] for timestamps in the years
/// 2000-2099 with whole seconds.
pub fn render_payload(reading: &Reading) -> String {
    let ts = reading.timestamp();
    format!(
        "Time: {day}, {dd:02}.{mm:02}.{yy:02}, {h:02}:{m:02}:{s:02}, Count: {count}",
        day = reading.day(),
        dd = ts.day(),
        mm = ts.month(),
        yy = ts.year().rem_euclid(100),
        h = ts.hour(),
        m = ts.minute(),
        s = ts.second(),
        count = reading.count(),
    )
}

/// Strict stage: weekday and absolute timestamp.
fn parse_time(raw: &str) -> Result<(DayOfWeek, DateTime<Utc>), ParseError> {
    let pattern = TIME_PATTERN.as_ref().ok_or(ParseError::Pattern)?;
    let caps = pattern.captures(raw).ok_or(ParseError::MissingTime)?;

    let day: DayOfWeek = caps
        .get(1)
        .map(|m| m.as_str())
        .ok_or(ParseError::MissingTime)?
        .parse()?;

    let dd = numeric(&caps, 2)?;
    let mm = numeric(&caps, 3)?;
    let yy = numeric(&caps, 4)?;
    let hour = numeric(&caps, 5)?;
    let minute = numeric(&caps, 6)?;
    let second = if caps.get(7).is_some() {
        numeric(&caps, 7)?
    } else {
        0
    };

    let year = CENTURY.saturating_add(i32::try_from(yy).unwrap_or(i32::MAX));
    let date = NaiveDate::from_ymd_opt(year, mm, dd).ok_or(ParseError::InvalidDate {
        day: dd,
        month: mm,
        year: yy,
    })?;
    let datetime = date
        .and_hms_opt(hour, minute, second)
        .ok_or(ParseError::InvalidTime {
            hour,
            minute,
            second,
        })?;

    Ok((day, datetime.and_utc()))
}

/// Lenient stage: missing or oversized counts become zero.
fn parse_count(raw: &str) -> u32 {
    COUNT_PATTERN
        .as_ref()
        .and_then(|pattern| pattern.captures(raw))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Read a two-digit capture group as a number.
fn numeric(caps: &Captures<'_>, group: usize) -> Result<u32, ParseError> {
    caps.get(group)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or(ParseError::MissingTime)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    #[test]
    fn parses_full_payload() {
        let raw = "Time: Monday, 17.05.24, 14:30:05, Count: 2";
        let msg = parse_payload(raw).unwrap();
        assert_eq!(msg.reading.count(), 2);
        assert_eq!(msg.reading.day(), DayOfWeek::Monday);
        assert_eq!(msg.reading.timestamp(), utc(2024, 5, 17, 14, 30, 5));
        assert_eq!(&*msg.raw, raw);
    }

    #[test]
    fn seconds_are_optional() {
        let msg = parse_payload("Time: Friday, 03.01.25, 08:15, Count: 7").unwrap();
        assert_eq!(msg.reading.timestamp(), utc(2025, 1, 3, 8, 15, 0));
        assert_eq!(msg.reading.count(), 7);
    }

    #[test]
    fn count_may_precede_time() {
        let msg = parse_payload("Count: 5 | Time: Sunday, 19.05.24, 23:59:59").unwrap();
        assert_eq!(msg.reading.count(), 5);
        assert_eq!(msg.reading.day(), DayOfWeek::Sunday);
    }

    #[test]
    fn missing_count_defaults_to_zero() {
        let msg = parse_payload("Time: Tuesday, 14.05.24, 09:00:00").unwrap();
        assert_eq!(msg.reading.count(), 0);
    }

    #[test]
    fn oversized_count_defaults_to_zero() {
        let msg = parse_payload("Time: Tuesday, 14.05.24, 09:00:00, Count: 99999999999").unwrap();
        assert_eq!(msg.reading.count(), 0);
    }

    #[test]
    fn garbled_time_is_rejected() {
        assert_eq!(
            parse_payload("Time: Monday, 17.05.24, 14h30, Count: 2"),
            Err(ParseError::MissingTime)
        );
        for garbled in ["14:30:5", "14:30:055", "14:30:"] {
            let raw = format!("Time: Friday, 17.05.24, {garbled}, Count: 2");
            assert_eq!(parse_payload(&raw), Err(ParseError::MissingTime), "{raw}");
        }
        assert_eq!(parse_payload("Count: 3"), Err(ParseError::MissingTime));
        assert_eq!(parse_payload(""), Err(ParseError::MissingTime));
    }

    #[test]
    fn out_of_range_date_is_rejected() {
        let err = parse_payload("Time: Monday, 32.05.24, 14:30:05, Count: 2").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidDate {
                day: 32,
                month: 5,
                year: 24
            }
        );
        assert!(matches!(
            parse_payload("Time: Monday, 30.02.24, 10:00, Count: 1"),
            Err(ParseError::InvalidDate { .. })
        ));
    }

    #[test]
    fn out_of_range_time_is_rejected() {
        assert!(matches!(
            parse_payload("Time: Monday, 17.05.24, 24:10:00, Count: 2"),
            Err(ParseError::InvalidTime { hour: 24, .. })
        ));
        assert!(matches!(
            parse_payload("Time: Monday, 17.05.24, 10:60, Count: 2"),
            Err(ParseError::InvalidTime { minute: 60, .. })
        ));
    }

    #[test]
    fn unknown_weekday_is_rejected() {
        assert!(matches!(
            parse_payload("Time: Someday, 17.05.24, 10:00:00, Count: 2"),
            Err(ParseError::UnknownDay(_))
        ));
    }

    #[test]
    fn leap_day_is_accepted() {
        let msg = parse_payload("Time: Thursday, 29.02.24, 12:00:00, Count: 1").unwrap();
        assert_eq!(msg.reading.timestamp(), utc(2024, 2, 29, 12, 0, 0));
    }

    #[test]
    fn rendered_readings_parse_back_unchanged() {
        let readings = [
            Reading::new(0, DayOfWeek::Monday, utc(2024, 5, 13, 0, 0, 0)),
            Reading::new(2, DayOfWeek::Friday, utc(2024, 5, 17, 14, 30, 5)),
            Reading::new(41, DayOfWeek::Sunday, utc(2099, 12, 31, 23, 59, 59)),
            Reading::new(u32::MAX, DayOfWeek::Saturday, utc(2000, 1, 1, 7, 5, 9)),
        ];
        for reading in readings {
            let payload = render_payload(&reading);
            let parsed = parse_payload(&payload).unwrap();
            assert_eq!(parsed.reading, reading, "payload {payload}");
        }
    }
}
