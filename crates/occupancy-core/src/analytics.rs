//! Bucketed averages over stored records.
//!
//! The dashboard chart shows one weekday split into five three-hour
//! blocks between 08:00 and 23:00. Each block reports the mean `count` of
//! the records whose (UTC) hour falls inside it; empty blocks report 0.
//! Records outside the opening hours are ignored.

use chrono::Timelike;
use occupancy_types::{BlockAverage, StoredRecord};

/// First hour covered by the first block.
pub const OPENING_HOUR: u32 = 8;

/// Width of one block in hours.
pub const BLOCK_HOURS: u32 = 3;

/// Number of blocks.
pub const BLOCK_COUNT: u32 = 5;

/// Average counts per three-hour block, in chronological block order.
pub fn block_averages(records: &[StoredRecord]) -> Vec<BlockAverage> {
    (0..BLOCK_COUNT)
        .map(|block| {
            let start = OPENING_HOUR.saturating_add(block.saturating_mul(BLOCK_HOURS));
            let end = start.saturating_add(BLOCK_HOURS);
            let (sum, samples) = records
                .iter()
                .filter(|r| (start..end).contains(&r.timestamp.hour()))
                .fold((0_u64, 0_u32), |(sum, n), r| {
                    (sum.saturating_add(u64::from(r.count)), n.saturating_add(1))
                });
            BlockAverage {
                label: format!("{start:02}-{end:02}"),
                start_hour: start,
                end_hour: end,
                average: mean(sum, samples),
                samples,
            }
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn mean(sum: u64, samples: u32) -> f64 {
    if samples == 0 {
        0.0
    } else {
        sum as f64 / f64::from(samples)
    }
}
