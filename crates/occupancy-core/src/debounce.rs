//! Debounce policy deciding which readings are durably recorded.
//!
//! The sensor re-announces its state periodically, so most messages repeat
//! the previous count. A reading is persisted when the count changed, or
//! when the heartbeat interval has elapsed since the last recorded reading
//! so that the stored series is never staler than one heartbeat.
//!
//! Elapsed time is measured in sensor time (reading timestamps), not
//! wall-clock receipt time.

use chrono::{DateTime, TimeDelta, Utc};
use occupancy_types::Reading;

/// Default heartbeat interval: one stored row at least every 30 minutes.
pub const DEFAULT_HEARTBEAT_MINUTES: i64 = 30;

/// The last reading that was actually written to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastRecorded {
    /// The persisted reading.
    pub reading: Reading,
    /// Wall-clock time at which the write completed.
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of evaluating a reading against the last recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing recorded yet.
    FirstReading,
    /// The count differs from the last recorded count.
    CountChanged,
    /// Same count, but the heartbeat interval has elapsed.
    Heartbeat,
    /// Same count within the heartbeat interval.
    Unchanged,
    /// The reading is older than the last recorded one.
    OutOfOrder,
}

impl Decision {
    /// Whether this decision results in a write.
    pub const fn should_persist(self) -> bool {
        matches!(self, Self::FirstReading | Self::CountChanged | Self::Heartbeat)
    }
}

/// Count-change plus heartbeat debounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePolicy {
    heartbeat: TimeDelta,
}

impl DebouncePolicy {
    /// Create a policy with the given heartbeat interval.
    pub const fn new(heartbeat: TimeDelta) -> Self {
        Self { heartbeat }
    }

    /// The configured heartbeat interval.
    pub const fn heartbeat(&self) -> TimeDelta {
        self.heartbeat
    }

    /// Classify `reading` against the last recorded reading.
    pub fn evaluate(&self, reading: &Reading, last: Option<&LastRecorded>) -> Decision {
        let Some(last) = last else {
            return Decision::FirstReading;
        };
        let elapsed = reading
            .timestamp()
            .signed_duration_since(last.reading.timestamp());
        if elapsed < TimeDelta::zero() {
            Decision::OutOfOrder
        } else if reading.count() != last.reading.count() {
            Decision::CountChanged
        } else if elapsed > self.heartbeat {
            Decision::Heartbeat
        } else {
            Decision::Unchanged
        }
    }

    /// Shorthand for `evaluate(..).should_persist()`.
    pub fn should_persist(&self, reading: &Reading, last: Option<&LastRecorded>) -> bool {
        self.evaluate(reading, last).should_persist()
    }
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self::new(TimeDelta::minutes(DEFAULT_HEARTBEAT_MINUTES))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use occupancy_types::DayOfWeek;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 14, 0, 0).single().unwrap()
    }

    fn recorded(count: u32, at: DateTime<Utc>) -> LastRecorded {
        LastRecorded {
            reading: Reading::new(count, DayOfWeek::Friday, at),
            recorded_at: at,
        }
    }

    fn reading(count: u32, at: DateTime<Utc>) -> Reading {
        Reading::new(count, DayOfWeek::Friday, at)
    }

    #[test]
    fn first_reading_is_always_persisted() {
        let policy = DebouncePolicy::default();
        assert_eq!(policy.evaluate(&reading(0, t0()), None), Decision::FirstReading);
        assert!(policy.should_persist(&reading(0, t0()), None));
    }

    #[test]
    fn same_count_inside_heartbeat_is_suppressed() {
        let policy = DebouncePolicy::default();
        let last = recorded(3, t0());
        let next = reading(3, t0() + TimeDelta::minutes(29));
        assert!(!policy.should_persist(&next, Some(&last)));
    }

    #[test]
    fn same_count_after_heartbeat_is_persisted() {
        let policy = DebouncePolicy::default();
        let last = recorded(3, t0());
        let next = reading(3, t0() + TimeDelta::minutes(31));
        assert_eq!(policy.evaluate(&next, Some(&last)), Decision::Heartbeat);
    }

    #[test]
    fn heartbeat_threshold_is_exclusive() {
        let policy = DebouncePolicy::default();
        let last = recorded(3, t0());
        let next = reading(3, t0() + TimeDelta::minutes(30));
        assert_eq!(policy.evaluate(&next, Some(&last)), Decision::Unchanged);
    }

    #[test]
    fn count_change_is_persisted_immediately() {
        let policy = DebouncePolicy::default();
        let last = recorded(3, t0());
        let next = reading(4, t0() + TimeDelta::seconds(1));
        assert_eq!(policy.evaluate(&next, Some(&last)), Decision::CountChanged);
        let same_instant = reading(4, t0());
        assert!(policy.should_persist(&same_instant, Some(&last)));
    }

    #[test]
    fn older_reading_is_never_persisted() {
        let policy = DebouncePolicy::default();
        let last = recorded(3, t0());
        let stale = reading(9, t0() - TimeDelta::minutes(5));
        assert_eq!(policy.evaluate(&stale, Some(&last)), Decision::OutOfOrder);
        assert!(!policy.should_persist(&stale, Some(&last)));
    }

    #[test]
    fn custom_heartbeat_is_honoured() {
        let policy = DebouncePolicy::new(TimeDelta::minutes(5));
        let last = recorded(1, t0());
        assert!(policy.should_persist(&reading(1, t0() + TimeDelta::minutes(6)), Some(&last)));
        assert_eq!(policy.heartbeat(), TimeDelta::minutes(5));
    }
}
