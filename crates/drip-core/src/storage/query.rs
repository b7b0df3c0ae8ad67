//! Read-only access to the history tiers.
//!
//! Everything here is safe for the telemetry/protocol layer to call at any
//! time: range scans are fresh, finite and cursor-free (restartable by
//! construction), and nothing mutates the store. The protocol layer owns all
//! wire framing; it consumes the structured entries returned here.

use alloc::vec::Vec;
use core::mem::size_of;

use crate::error::HistoryError;
use crate::storage::bucket::{Resolution, to_bucket};
use crate::storage::entry::{DailyEntry, HourlyEntry, MonthlyEntry};
use crate::storage::{HistoryStore, RingBuffer};

/// Per-tier flags reporting whether a finalized bucket is waiting to be
/// aggregated at `current_ts`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingAggregation {
    pub hourly: bool,
    pub daily: bool,
    pub monthly: bool,
}

/// Aggregation watermarks plus pending flags, as exposed to diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStatus {
    pub last_hourly_update: u32,
    pub last_daily_update: u32,
    pub last_monthly_update: u32,
    pub pending: PendingAggregation,
}

/// Storage statistics for the telemetry layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStats {
    pub hourly_entries: u16,
    pub daily_entries: u16,
    pub monthly_entries: u16,
    /// Start timestamp of the oldest entry per tier; 0 when the tier is
    /// empty.
    pub oldest_hourly_timestamp: u32,
    pub oldest_daily_timestamp: u32,
    pub oldest_monthly_timestamp: u32,
    /// Bytes occupied by live entries across all tiers.
    pub total_storage_bytes: u32,
    pub utilization_pct: u8,
}

/// Shared range-scan core: logical order equals chronological order, so a
/// single oldest-first pass bounded by `max_entries` preserves ordering.
fn scan_range<T: Copy, const N: usize>(
    ring: &RingBuffer<T, N>,
    start_ts: u32,
    end_ts: u32,
    max_entries: usize,
    timestamp: impl Fn(&T) -> u32,
) -> Result<Vec<T>, HistoryError> {
    if start_ts > end_ts {
        return Err(HistoryError::InvalidParameter(
            "range start is after range end",
        ));
    }
    let mut out = Vec::with_capacity(max_entries.min(ring.len()));
    for entry in ring.iter() {
        if out.len() >= max_entries {
            break;
        }
        let ts = timestamp(entry);
        if ts >= start_ts && ts <= end_ts {
            out.push(*entry);
        }
    }
    Ok(out)
}

impl HistoryStore {
    /// Hourly entries with `start_ts <= timestamp <= end_ts`, chronological,
    /// at most `max_entries`. An empty tier yields an empty vec, not an
    /// error.
    pub fn hourly_range(
        &self,
        start_ts: u32,
        end_ts: u32,
        max_entries: usize,
    ) -> Result<Vec<HourlyEntry>, HistoryError> {
        scan_range(&self.hourly, start_ts, end_ts, max_entries, |e| e.timestamp)
    }

    /// Daily entries whose day bucket starts within `[start_ts, end_ts]`.
    pub fn daily_range(
        &self,
        start_ts: u32,
        end_ts: u32,
        max_entries: usize,
    ) -> Result<Vec<DailyEntry>, HistoryError> {
        scan_range(&self.daily, start_ts, end_ts, max_entries, |e| e.day_start)
    }

    /// Monthly entries whose month bucket starts within `[start_ts, end_ts]`.
    pub fn monthly_range(
        &self,
        start_ts: u32,
        end_ts: u32,
        max_entries: usize,
    ) -> Result<Vec<MonthlyEntry>, HistoryError> {
        scan_range(&self.monthly, start_ts, end_ts, max_entries, |e| {
            e.month_start
        })
    }

    pub fn latest_hourly(&self) -> Result<HourlyEntry, HistoryError> {
        self.hourly
            .latest()
            .copied()
            .ok_or(HistoryError::Empty(Resolution::Hourly))
    }

    pub fn oldest_hourly(&self) -> Result<HourlyEntry, HistoryError> {
        self.hourly
            .oldest()
            .copied()
            .ok_or(HistoryError::Empty(Resolution::Hourly))
    }

    pub fn latest_daily(&self) -> Result<DailyEntry, HistoryError> {
        self.daily
            .latest()
            .copied()
            .ok_or(HistoryError::Empty(Resolution::Daily))
    }

    pub fn oldest_daily(&self) -> Result<DailyEntry, HistoryError> {
        self.daily
            .oldest()
            .copied()
            .ok_or(HistoryError::Empty(Resolution::Daily))
    }

    pub fn latest_monthly(&self) -> Result<MonthlyEntry, HistoryError> {
        self.monthly
            .latest()
            .copied()
            .ok_or(HistoryError::Empty(Resolution::Monthly))
    }

    pub fn oldest_monthly(&self) -> Result<MonthlyEntry, HistoryError> {
        self.monthly
            .oldest()
            .copied()
            .ok_or(HistoryError::Empty(Resolution::Monthly))
    }

    /// Number of live entries in a tier.
    pub fn entry_count(&self, resolution: Resolution) -> usize {
        match resolution {
            Resolution::Hourly => self.hourly.len(),
            Resolution::Daily => self.daily.len(),
            Resolution::Monthly => self.monthly.len(),
        }
    }

    /// Ring buffer write-cursor position for a tier (diagnostics only).
    pub fn head_position(&self, resolution: Resolution) -> usize {
        match resolution {
            Resolution::Hourly => self.hourly.head_position(),
            Resolution::Daily => self.daily.head_position(),
            Resolution::Monthly => self.monthly.head_position(),
        }
    }

    /// Storage statistics for the telemetry layer.
    pub fn stats(&self) -> HistoryStats {
        let total_storage_bytes = (self.hourly.len() * size_of::<HourlyEntry>()
            + self.daily.len() * size_of::<DailyEntry>()
            + self.monthly.len() * size_of::<MonthlyEntry>()) as u32;

        HistoryStats {
            hourly_entries: self.hourly.len() as u16,
            daily_entries: self.daily.len() as u16,
            monthly_entries: self.monthly.len() as u16,
            oldest_hourly_timestamp: self.hourly.oldest().map_or(0, |e| e.timestamp),
            oldest_daily_timestamp: self.daily.oldest().map_or(0, |e| e.day_start),
            oldest_monthly_timestamp: self.monthly.oldest().map_or(0, |e| e.month_start),
            total_storage_bytes,
            utilization_pct: self.utilization(),
        }
    }

    /// Whether each tier has a finalized bucket newer than its watermark.
    pub fn aggregation_pending(&self, current_ts: u32) -> PendingAggregation {
        let pending = |resolution: Resolution, watermark: u32| {
            to_bucket(current_ts, resolution) > to_bucket(watermark, resolution)
        };
        PendingAggregation {
            hourly: pending(Resolution::Hourly, self.last_hourly_update),
            daily: pending(Resolution::Daily, self.last_daily_update),
            monthly: pending(Resolution::Monthly, self.last_monthly_update),
        }
    }

    /// Watermarks and pending flags in one snapshot.
    pub fn aggregation_status(&self, current_ts: u32) -> AggregationStatus {
        AggregationStatus {
            last_hourly_update: self.last_hourly_update,
            last_daily_update: self.last_daily_update,
            last_monthly_update: self.last_monthly_update,
            pending: self.aggregation_pending(current_ts),
        }
    }
}
