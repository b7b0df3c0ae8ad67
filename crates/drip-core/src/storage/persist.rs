//! Save and restore through an external persistence provider.
//!
//! The store never talks to flash directly. Each tier serializes to its own
//! postcard blob under a fixed key, with a fourth blob for the aggregation
//! watermarks, and the provider decides where those bytes live. Per-tier
//! blobs keep a single corrupted record from taking the whole history down:
//! a blob that fails to decode surfaces as [`HistoryError::Persistence`] and
//! the caller chooses between aborting the boot and starting that tier
//! fresh.

use alloc::vec::Vec;

use log::{debug, info};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::HistoryError;
use crate::sources::PersistenceProvider;
use crate::storage::HistoryStore;
use crate::storage::ring::RingBuffer;

/// Blob key for the hourly tier.
pub const BLOB_KEY_HOURLY: u16 = 0x6101;
/// Blob key for the daily tier.
pub const BLOB_KEY_DAILY: u16 = 0x6102;
/// Blob key for the monthly tier.
pub const BLOB_KEY_MONTHLY: u16 = 0x6103;
/// Blob key for the aggregation watermarks.
pub const BLOB_KEY_META: u16 = 0x6104;

/// Wire form of one tier: raw ring-buffer parts, live slots only.
#[derive(Serialize, Deserialize)]
struct TierBlob<T> {
    head: u32,
    count: u32,
    slots: Vec<T>,
}

/// Wire form of the aggregation watermarks.
#[derive(Serialize, Deserialize)]
struct MetaBlob {
    last_hourly_update: u32,
    last_daily_update: u32,
    last_monthly_update: u32,
}

fn save_tier<T, const N: usize>(
    provider: &mut impl PersistenceProvider,
    key: u16,
    ring: &RingBuffer<T, N>,
) -> Result<(), HistoryError>
where
    T: Serialize + Copy,
{
    let (slots, head, count) = ring.raw_parts();
    let blob = TierBlob {
        head: head as u32,
        count: count as u32,
        slots: slots.to_vec(),
    };
    let bytes = postcard::to_allocvec(&blob)
        .map_err(|_| HistoryError::Persistence("tier serialization failed"))?;
    debug!("saving history blob {key:#06x}, {} bytes", bytes.len());
    provider
        .save_blob(key, &bytes)
        .map_err(HistoryError::Persistence)
}

fn load_tier<T, const N: usize>(
    provider: &mut impl PersistenceProvider,
    key: u16,
) -> Result<Option<RingBuffer<T, N>>, HistoryError>
where
    T: DeserializeOwned + Copy,
{
    let Some(bytes) = provider.load_blob(key).map_err(HistoryError::Persistence)? else {
        return Ok(None);
    };
    let blob: TierBlob<T> = postcard::from_bytes(&bytes)
        .map_err(|_| HistoryError::Persistence("tier blob failed to decode"))?;
    Ok(Some(RingBuffer::from_raw_parts(
        &blob.slots,
        blob.head as usize,
        blob.count as usize,
    )))
}

impl HistoryStore {
    /// Serialize all tiers and the watermarks through `provider`.
    ///
    /// The first failing blob aborts the save; a partial save is recoverable
    /// because every blob is independently decodable.
    pub fn save(&self, provider: &mut impl PersistenceProvider) -> Result<(), HistoryError> {
        save_tier(provider, BLOB_KEY_HOURLY, &self.hourly)?;
        save_tier(provider, BLOB_KEY_DAILY, &self.daily)?;
        save_tier(provider, BLOB_KEY_MONTHLY, &self.monthly)?;

        let meta = MetaBlob {
            last_hourly_update: self.last_hourly_update,
            last_daily_update: self.last_daily_update,
            last_monthly_update: self.last_monthly_update,
        };
        let bytes = postcard::to_allocvec(&meta)
            .map_err(|_| HistoryError::Persistence("meta serialization failed"))?;
        provider
            .save_blob(BLOB_KEY_META, &bytes)
            .map_err(HistoryError::Persistence)?;

        debug!("environmental history saved to persistent storage");
        Ok(())
    }

    /// Restore a store from `provider`.
    ///
    /// Missing blobs are not an error; a first boot simply yields an empty
    /// store. Restored tiers are taken at face value here, so callers run
    /// [`validate`](HistoryStore::validate) with repair before using the
    /// result.
    pub fn load(provider: &mut impl PersistenceProvider) -> Result<Self, HistoryError> {
        let mut store = Self::new();

        if let Some(ring) = load_tier(provider, BLOB_KEY_HOURLY)? {
            store.hourly = ring;
        }
        if let Some(ring) = load_tier(provider, BLOB_KEY_DAILY)? {
            store.daily = ring;
        }
        if let Some(ring) = load_tier(provider, BLOB_KEY_MONTHLY)? {
            store.monthly = ring;
        }

        match provider.load_blob(BLOB_KEY_META).map_err(HistoryError::Persistence)? {
            Some(bytes) => {
                let meta: MetaBlob = postcard::from_bytes(&bytes)
                    .map_err(|_| HistoryError::Persistence("meta blob failed to decode"))?;
                store.last_hourly_update = meta.last_hourly_update;
                store.last_daily_update = meta.last_daily_update;
                store.last_monthly_update = meta.last_monthly_update;
            }
            None => debug!("no watermark blob found, starting aggregation fresh"),
        }

        info!(
            "environmental history restored: {} hourly, {} daily, {} monthly entries",
            store.hourly.len(),
            store.daily.len(),
            store.monthly.len()
        );
        Ok(store)
    }
}
