//! Time-bucket arithmetic for the three history resolutions.
//!
//! A bucket is a fixed-length time interval identified by a monotonically
//! increasing integer index: `index = timestamp / period`. The mapping is
//! deliberately plain integer division, not calendar-aware — the "month" is
//! a fixed 30-day period and will drift against calendar months over the
//! years. Callers needing calendar semantics must convert separately; the
//! reporting side of the product accepts this approximation.

use serde::{Deserialize, Serialize};

/// One of the three history tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// 720 entries, 30 days of retention.
    Hourly,
    /// 372 entries, ~12 months of retention.
    Daily,
    /// 60 entries, ~5 years of retention.
    Monthly,
}

/// Ring buffer capacity of the hourly tier (30 days x 24 hours).
pub const HOURLY_CAPACITY: usize = 720;
/// Ring buffer capacity of the daily tier (12 months x 31 days).
pub const DAILY_CAPACITY: usize = 372;
/// Ring buffer capacity of the monthly tier (5 years x 12 months).
pub const MONTHLY_CAPACITY: usize = 60;

impl Resolution {
    /// Length of one bucket in seconds.
    pub const fn period_secs(self) -> u32 {
        match self {
            Resolution::Hourly => 3_600,
            Resolution::Daily => 86_400,
            // Fixed 30-day approximation, not a calendar month.
            Resolution::Monthly => 2_592_000,
        }
    }

    /// Ring buffer capacity of this tier.
    pub const fn capacity(self) -> usize {
        match self {
            Resolution::Hourly => HOURLY_CAPACITY,
            Resolution::Daily => DAILY_CAPACITY,
            Resolution::Monthly => MONTHLY_CAPACITY,
        }
    }
}

/// Bucket index containing `timestamp` at the given resolution.
pub const fn to_bucket(timestamp: u32, resolution: Resolution) -> u32 {
    timestamp / resolution.period_secs()
}

/// Timestamp at which `bucket` begins.
pub const fn bucket_start(bucket: u32, resolution: Resolution) -> u32 {
    bucket * resolution.period_secs()
}

/// Last timestamp inside `bucket` (inclusive).
pub const fn bucket_end(bucket: u32, resolution: Resolution) -> u32 {
    bucket_start(bucket, resolution) + resolution.period_secs() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_bucket_round_trip() {
        assert_eq!(to_bucket(0, Resolution::Hourly), 0);
        assert_eq!(to_bucket(3_599, Resolution::Hourly), 0);
        assert_eq!(to_bucket(3_600, Resolution::Hourly), 1);
        assert_eq!(bucket_start(1, Resolution::Hourly), 3_600);
        assert_eq!(bucket_end(1, Resolution::Hourly), 7_199);
    }

    #[test]
    fn day_and_month_periods() {
        assert_eq!(to_bucket(86_400, Resolution::Daily), 1);
        assert_eq!(to_bucket(86_399, Resolution::Daily), 0);
        // 30-day "month" approximation.
        assert_eq!(bucket_start(1, Resolution::Monthly), 2_592_000);
        assert_eq!(to_bucket(2_591_999, Resolution::Monthly), 0);
    }

    #[test]
    fn bucket_indices_are_monotonic() {
        let mut prev = 0;
        for ts in (0..40_000).step_by(600) {
            let b = to_bucket(ts, Resolution::Hourly);
            assert!(b >= prev);
            prev = b;
        }
    }
}
