//! Structural validation and destructive repair.
//!
//! In normal operation the ring buffers cannot violate their invariants;
//! corruption enters through a damaged persistence blob (truncated flash
//! write, bit rot) restored at boot. [`HistoryStore::validate`] is therefore
//! run after every load, with `repair` set, and may also be invoked from a
//! diagnostics command at any time.

use log::{error, info, warn};

use crate::error::HistoryError;
use crate::storage::bucket::Resolution;
use crate::storage::ring::RingBuffer;
use crate::storage::HistoryStore;

/// Structural soundness of one tier: cursor/count bounds plus timestamp
/// monotonicity of the live entries.
fn tier_is_sound<T, const N: usize>(
    ring: &RingBuffer<T, N>,
    timestamp: impl Fn(&T) -> u32,
) -> bool {
    if !ring.is_structurally_valid() {
        return false;
    }
    let mut prev: Option<u32> = None;
    for entry in ring.iter() {
        let ts = timestamp(entry);
        if prev.is_some_and(|p| ts < p) {
            return false;
        }
        prev = Some(ts);
    }
    true
}

impl HistoryStore {
    /// Validate every tier's structural invariants.
    ///
    /// With `repair` set, a corrupted tier is reset to empty; the call still
    /// reports [`HistoryError::Corruption`] (naming the first affected tier)
    /// so the caller can decide whether to escalate. Watermark skew between
    /// tiers beyond one coarser period is logged as a warning but is not
    /// corruption.
    pub fn validate(&mut self, repair: bool) -> Result<(), HistoryError> {
        let mut corrupt: Option<Resolution> = None;

        if !tier_is_sound(&self.hourly, |e| e.timestamp) {
            error!("hourly ring buffer corruption detected");
            corrupt.get_or_insert(Resolution::Hourly);
            if repair {
                self.hourly.clear();
                info!("repaired hourly ring buffer");
            }
        }

        if !tier_is_sound(&self.daily, |e| e.day_start) {
            error!("daily ring buffer corruption detected");
            corrupt.get_or_insert(Resolution::Daily);
            if repair {
                self.daily.clear();
                info!("repaired daily ring buffer");
            }
        }

        if !tier_is_sound(&self.monthly, |e| e.month_start) {
            error!("monthly ring buffer corruption detected");
            corrupt.get_or_insert(Resolution::Monthly);
            if repair {
                self.monthly.clear();
                info!("repaired monthly ring buffer");
            }
        }

        // Soft check: the finer watermark should lead the coarser one by at
        // most one coarser period.
        if self.last_hourly_update
            > self.last_daily_update + Resolution::Daily.period_secs()
            || self.last_daily_update
                > self.last_monthly_update + Resolution::Monthly.period_secs()
        {
            warn!("aggregation watermark inconsistency in environmental history");
        }

        match corrupt {
            Some(tier) => Err(HistoryError::Corruption(tier)),
            None => Ok(()),
        }
    }
}
