//! Multi-resolution environmental history storage.
//!
//! Three fixed-capacity ring buffers hold hourly, daily and monthly records.
//! A periodic driver feeds [`HistoryStore::advance`] with the current time;
//! elapsed hour buckets are synthesized from the live-sample, rainfall and
//! irrigation-event collaborators, then cascaded into daily and monthly
//! summaries. The telemetry layer reads back through the range/latest/oldest
//! queries and the stats surface; it never mutates the store.
//!
//! Retention at the reference sizing:
//!
//! | Tier    | Entries | Span       |
//! |---------|---------|------------|
//! | Hourly  | 720     | 30 days    |
//! | Daily   | 372     | ~12 months |
//! | Monthly | 60      | ~5 years   |
//!
//! Module map:
//!
//! - [`ring`] — the generic overwrite-oldest ring buffer primitive
//! - [`bucket`] — timestamp <-> bucket-index arithmetic per resolution
//! - [`entry`] — the hourly/daily/monthly record types and stat folding
//! - [`aggregate`] — bucket scheduling, synthesis and cascading folds
//! - [`query`] — range scans, latest/oldest, stats and pending flags
//! - [`integrity`] — structural validation and destructive repair
//! - [`capacity`] — utilization measurement and high-water trimming
//! - [`persist`] — save/restore through an external persistence provider
//! - [`shared`] — the coarse lock shared by the driver and telemetry

pub mod aggregate;
pub mod bucket;
pub mod capacity;
pub mod entry;
pub mod integrity;
pub mod persist;
pub mod query;
pub mod ring;
pub mod shared;

#[cfg(test)]
pub(crate) mod testutil;

pub use bucket::{DAILY_CAPACITY, HOURLY_CAPACITY, MONTHLY_CAPACITY, Resolution};
pub use entry::{DailyEntry, HourlyEntry, MonthlyEntry, StatTriple};
pub use query::{AggregationStatus, HistoryStats, PendingAggregation};
pub use ring::RingBuffer;
pub use shared::SharedHistory;

/// The three history tiers plus their aggregation watermarks.
///
/// The `last_*_update` fields record the start timestamp of the most recent
/// bucket successfully aggregated for each tier. They are the sole source of
/// truth for "what has already been aggregated": they never regress, and
/// re-running aggregation against an unchanged watermark is a no-op.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    pub(crate) hourly: RingBuffer<HourlyEntry, HOURLY_CAPACITY>,
    pub(crate) daily: RingBuffer<DailyEntry, DAILY_CAPACITY>,
    pub(crate) monthly: RingBuffer<MonthlyEntry, MONTHLY_CAPACITY>,
    pub(crate) last_hourly_update: u32,
    pub(crate) last_daily_update: u32,
    pub(crate) last_monthly_update: u32,
}

impl HistoryStore {
    /// An empty store with zeroed watermarks.
    pub const fn new() -> Self {
        Self {
            hourly: RingBuffer::new(),
            daily: RingBuffer::new(),
            monthly: RingBuffer::new(),
            last_hourly_update: 0,
            last_daily_update: 0,
            last_monthly_update: 0,
        }
    }

    /// Insert a prebuilt hourly record directly.
    ///
    /// Used by upstream samplers that assemble their own hour records and by
    /// the test suite. Aggregation scheduling keys off the newest stored
    /// entry, so directly inserted hours are never re-synthesized; the
    /// hourly watermark itself only advances through
    /// [`aggregate_hourly`](HistoryStore::aggregate_hourly).
    pub fn add_hourly_entry(&mut self, entry: HourlyEntry) {
        self.hourly.insert(entry);
        log::debug!(
            "added hourly environmental entry at timestamp {}",
            entry.timestamp
        );
    }

    /// Clear every tier and all watermarks (factory reset).
    ///
    /// Callers holding the store through [`SharedHistory`] get this atomically
    /// with respect to concurrent queries.
    pub fn reset_all(&mut self) {
        self.hourly.clear();
        self.daily.clear();
        self.monthly.clear();
        self.last_hourly_update = 0;
        self.last_daily_update = 0;
        self.last_monthly_update = 0;
        log::info!("environmental history reset completed");
    }
}
