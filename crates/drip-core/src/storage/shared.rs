//! Coarse lock shared by the aggregation driver and the telemetry layer.
//!
//! The controller has exactly one aggregation driver and a handful of
//! readers, all short-lived, so a single blocking mutex around the whole
//! store is plenty. `CriticalSectionRawMutex` keeps the lock sound across
//! tasks and interrupt handlers; closures passed to [`SharedHistory::with`]
//! must stay short because the critical section suppresses preemption.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{info, warn};

use crate::error::HistoryError;
use crate::sources::PersistenceProvider;
use crate::storage::HistoryStore;

/// `static`-friendly wrapper serializing every access to the history store.
///
/// Construct once with [`new`](SharedHistory::new), call
/// [`init`](SharedHistory::init) during boot, then route all reads and
/// writes through [`with`](SharedHistory::with).
pub struct SharedHistory {
    inner: Mutex<CriticalSectionRawMutex, RefCell<HistoryStore>>,
    ready: AtomicBool,
}

impl SharedHistory {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(HistoryStore::new())),
            ready: AtomicBool::new(false),
        }
    }

    /// Restore persisted history and mark the store ready.
    ///
    /// Idempotent; repeated calls after the first are no-ops. Neither a
    /// failed restore nor a corrupted tier is fatal: the affected state is
    /// replaced with an empty equivalent and the store still comes up, so
    /// the controller keeps watering with a truncated history.
    pub fn init(&self, provider: &mut impl PersistenceProvider) -> Result<(), HistoryError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut store = match HistoryStore::load(provider) {
            Ok(store) => store,
            Err(err) => {
                warn!("environmental history restore failed, starting empty: {err}");
                HistoryStore::new()
            }
        };
        if let Err(err) = store.validate(true) {
            warn!("environmental history repaired during init: {err}");
        }

        self.inner.lock(|cell| cell.replace(store));
        self.ready.store(true, Ordering::Release);
        info!("environmental history initialized");
        Ok(())
    }

    /// Run `f` with exclusive access to the store.
    ///
    /// Fails with [`HistoryError::NotInitialized`] before
    /// [`init`](SharedHistory::init) has completed.
    pub fn with<R>(&self, f: impl FnOnce(&mut HistoryStore) -> R) -> Result<R, HistoryError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(HistoryError::NotInitialized);
        }
        Ok(self.inner.lock(|cell| f(&mut cell.borrow_mut())))
    }

    /// Whether [`init`](SharedHistory::init) has completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

impl Default for SharedHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Resolution;
    use crate::storage::entry::HourlyEntry;
    use crate::storage::testutil::MemoryStore;

    #[test]
    fn access_before_init_is_rejected() {
        let shared = SharedHistory::new();
        assert_eq!(
            shared.with(|store| store.entry_count(Resolution::Hourly)),
            Err(HistoryError::NotInitialized)
        );
        assert!(!shared.is_ready());
    }

    #[test]
    fn init_restores_persisted_history() {
        let mut provider = MemoryStore::default();
        let mut store = HistoryStore::new();
        store.add_hourly_entry(HourlyEntry {
            timestamp: 3_600,
            ..Default::default()
        });
        store.save(&mut provider).unwrap();

        let shared = SharedHistory::new();
        shared.init(&mut provider).unwrap();
        assert!(shared.is_ready());
        let count = shared
            .with(|store| store.entry_count(Resolution::Hourly))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn init_is_idempotent() {
        let mut provider = MemoryStore::default();
        let shared = SharedHistory::new();
        shared.init(&mut provider).unwrap();

        shared
            .with(|store| {
                store.add_hourly_entry(HourlyEntry::default());
            })
            .unwrap();

        // A second init must not wipe live state back to the blank blob.
        shared.init(&mut provider).unwrap();
        let count = shared
            .with(|store| store.entry_count(Resolution::Hourly))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn init_survives_a_failing_provider() {
        let mut provider = MemoryStore::failing();
        let shared = SharedHistory::new();
        shared.init(&mut provider).unwrap();
        assert!(shared.is_ready());
        let count = shared
            .with(|store| store.entry_count(Resolution::Hourly))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn mutations_are_visible_to_later_accesses() {
        let mut provider = MemoryStore::default();
        let shared = SharedHistory::new();
        shared.init(&mut provider).unwrap();

        shared
            .with(|store| {
                for i in 0..5 {
                    store.add_hourly_entry(HourlyEntry {
                        timestamp: i * 3_600,
                        ..Default::default()
                    });
                }
            })
            .unwrap();

        let latest = shared.with(|store| store.latest_hourly()).unwrap().unwrap();
        assert_eq!(latest.timestamp, 4 * 3_600);
    }
}
