//! Utilization measurement and proactive trimming.
//!
//! With ring-buffer overwrite the tiers can never actually overflow, but the
//! persistence blobs and BLE history exports scale with the live entry
//! count. Trimming ahead of saturation keeps save cycles and exports
//! bounded. Trimming is bookkeeping only for the in-memory tiers; a
//! log-structured flash backend rotates itself and needs nothing from this
//! step.

use log::{debug, info};

use crate::storage::HistoryStore;
use crate::storage::bucket::{DAILY_CAPACITY, HOURLY_CAPACITY, MONTHLY_CAPACITY};

/// Utilization at which a cleanup pass is triggered.
pub const CLEANUP_THRESHOLD_PCT: u8 = 90;
/// Per-tier fill level the cleanup pass trims down to.
pub const CLEANUP_TARGET_PCT: u8 = 70;

const TOTAL_CAPACITY: usize = HOURLY_CAPACITY + DAILY_CAPACITY + MONTHLY_CAPACITY;

impl HistoryStore {
    /// Total stored entries across all tiers as a percentage of total
    /// capacity.
    pub fn utilization(&self) -> u8 {
        let used = self.hourly.len() + self.daily.len() + self.monthly.len();
        (used * 100 / TOTAL_CAPACITY) as u8
    }

    /// Trim each tier's oldest entries to the low-water mark once overall
    /// utilization crosses the high-water mark. Returns whether a cleanup
    /// ran.
    pub fn cleanup_if_needed(&mut self) -> bool {
        let utilization = self.utilization();
        if utilization < CLEANUP_THRESHOLD_PCT {
            return false;
        }
        info!("starting environmental history cleanup, utilization: {utilization}%");

        let hourly_target = HOURLY_CAPACITY * CLEANUP_TARGET_PCT as usize / 100;
        let daily_target = DAILY_CAPACITY * CLEANUP_TARGET_PCT as usize / 100;
        let monthly_target = MONTHLY_CAPACITY * CLEANUP_TARGET_PCT as usize / 100;

        for (len, target, trim) in [
            (self.hourly.len(), hourly_target, 0usize),
            (self.daily.len(), daily_target, 1),
            (self.monthly.len(), monthly_target, 2),
        ] {
            if len <= target {
                continue;
            }
            let excess = len - target;
            match trim {
                0 => self.hourly.trim_oldest(excess),
                1 => self.daily.trim_oldest(excess),
                _ => self.monthly.trim_oldest(excess),
            }
            debug!("trimmed {excess} oldest entries from tier {trim}");
        }

        info!(
            "environmental history cleanup completed, utilization now {}%",
            self.utilization()
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Resolution;
    use crate::storage::entry::{DailyEntry, HourlyEntry, MonthlyEntry};

    fn fill(store: &mut HistoryStore, hourly: u32, daily: u32, monthly: u32) {
        for i in 0..hourly {
            store.add_hourly_entry(HourlyEntry {
                timestamp: i * 3_600,
                ..Default::default()
            });
        }
        for i in 0..daily {
            store.daily.insert(DailyEntry {
                day_start: i * 86_400,
                ..Default::default()
            });
        }
        for i in 0..monthly {
            store.monthly.insert(MonthlyEntry {
                month_start: i * 2_592_000,
                ..Default::default()
            });
        }
    }

    #[test]
    fn below_threshold_is_a_no_op() {
        let mut store = HistoryStore::new();
        fill(&mut store, 100, 50, 10);
        assert!(!store.cleanup_if_needed());
        assert_eq!(store.entry_count(Resolution::Hourly), 100);
    }

    #[test]
    fn cleanup_brings_every_saturated_tier_to_target() {
        let mut store = HistoryStore::new();
        // All tiers full: utilization 100%.
        fill(&mut store, 720, 372, 60);
        assert_eq!(store.utilization(), 100);

        assert!(store.cleanup_if_needed());
        assert!(store.utilization() <= CLEANUP_TARGET_PCT);
        assert_eq!(store.entry_count(Resolution::Hourly), 720 * 70 / 100);
        assert_eq!(store.entry_count(Resolution::Daily), 372 * 70 / 100);
        assert_eq!(store.entry_count(Resolution::Monthly), 60 * 70 / 100);
    }

    #[test]
    fn cleanup_drops_oldest_entries_first() {
        let mut store = HistoryStore::new();
        fill(&mut store, 720, 372, 60);
        store.cleanup_if_needed();

        // 720 - 504 = 216 oldest hourly entries gone.
        let oldest = store.oldest_hourly().unwrap();
        assert_eq!(oldest.timestamp, 216 * 3_600);
        let latest = store.latest_hourly().unwrap();
        assert_eq!(latest.timestamp, 719 * 3_600);
    }

    #[test]
    fn tiers_already_below_target_are_untouched() {
        let mut store = HistoryStore::new();
        // Hourly and daily full, monthly nearly empty: utilization 94%.
        fill(&mut store, 720, 372, 2);
        assert!(store.cleanup_if_needed());
        assert_eq!(store.entry_count(Resolution::Monthly), 2);
        assert_eq!(store.entry_count(Resolution::Hourly), 504);
    }
}
