//! History entry records for the three tiers.
//!
//! Entries are created by the aggregation engine, never mutated afterwards,
//! and evicted only by ring-buffer overwrite. All three derive `serde` so the
//! persistence bridge can encode whole tiers with `postcard`.

use serde::{Deserialize, Serialize};

use crate::sources::EnvironmentalSnapshot;

/// Min/max/mean summary of one environmental quantity over a bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatTriple {
    pub min: f32,
    pub max: f32,
    pub avg: f32,
}

/// Running accumulator used while folding a set of source values into a
/// [`StatTriple`]. Values flagged invalid upstream are simply not offered to
/// the accumulator, so a bucket with no valid readings folds to the default
/// (all-zero) triple.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StatAccumulator {
    min: f32,
    max: f32,
    sum: f32,
    n: u32,
}

impl StatAccumulator {
    pub(crate) fn fold(&mut self, value: f32) {
        if self.n == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.n += 1;
    }

    /// Fold an already-summarized triple (used for daily -> monthly, where
    /// extremes carry over and the mean is taken over the source averages).
    pub(crate) fn fold_triple(&mut self, triple: &StatTriple) {
        if self.n == 0 {
            self.min = triple.min;
            self.max = triple.max;
        } else {
            self.min = self.min.min(triple.min);
            self.max = self.max.max(triple.max);
        }
        self.sum += triple.avg;
        self.n += 1;
    }

    pub(crate) fn finish(self) -> StatTriple {
        if self.n == 0 {
            return StatTriple::default();
        }
        StatTriple {
            min: self.min,
            max: self.max,
            avg: self.sum / self.n as f32,
        }
    }

    pub(crate) fn sample_count(&self) -> u32 {
        self.n
    }
}

/// One hour bucket of environmental and irrigation activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlyEntry {
    /// Start of the hour bucket (seconds since epoch).
    pub timestamp: u32,
    /// Environmental readings valid as of this hour. During backfill after a
    /// gap this may be a repeated stale snapshot, flagged accordingly.
    pub snapshot: EnvironmentalSnapshot,
    /// Rainfall accumulated during the hour, in millimetres.
    pub rainfall_mm: f32,
    /// Number of irrigation events started in the hour (saturating).
    pub watering_events: u8,
    /// Total metered volume dispensed in the hour, in millilitres.
    pub total_volume_ml: u32,
    /// Bitmask of channels active during the hour.
    pub active_channels: u16,
}

/// One day bucket, folded from the hourly entries inside it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyEntry {
    /// Start of the day bucket (seconds since epoch).
    pub day_start: u32,
    pub temperature: StatTriple,
    pub humidity: StatTriple,
    pub pressure: StatTriple,
    pub total_rainfall_mm: f32,
    pub watering_events: u16,
    pub total_volume_ml: u32,
    /// Number of hourly entries folded into this record.
    pub sample_count: u16,
    /// Union of the hourly channel bitmasks.
    pub active_channels: u16,
}

/// One 30-day "month" bucket, folded from the daily entries inside it.
///
/// Extremes are taken over the daily extremes; averages are means of the
/// daily averages. The volume accumulator is widened to `u64` so years of
/// irrigation cannot overflow it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyEntry {
    /// Start of the month bucket (seconds since epoch).
    pub month_start: u32,
    pub temperature: StatTriple,
    pub humidity: StatTriple,
    pub pressure: StatTriple,
    pub total_rainfall_mm: f32,
    pub watering_events: u32,
    pub total_volume_ml: u64,
    /// Days in the bucket with any irrigation activity.
    pub days_active: u8,
}

impl DailyEntry {
    /// Whether any channel dispensed water on this day.
    pub fn had_activity(&self) -> bool {
        self.watering_events > 0 || self.total_volume_ml > 0
    }
}
