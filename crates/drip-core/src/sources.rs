//! Collaborator traits consumed by the history engine.
//!
//! The engine never talks to hardware or flash directly. The periodic driver
//! hands it implementations of these traits each cycle: a live environmental
//! sampler, a rainfall accumulator, a per-channel irrigation event log, and a
//! durable blob store. The firmware provides the real implementations; the
//! simulator and the test suite provide synthetic ones.

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

/// Number of irrigation channels the controller drives.
///
/// Channel bitmasks throughout the history entries are `u16`, leaving
/// headroom for hardware revisions with more valves.
pub const CHANNEL_COUNT: u8 = 8;

/// One environmental quantity together with its validity flag.
///
/// Upstream validation (outlier rejection, sensor fault detection) decides
/// validity; the history engine only stores and propagates it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f32,
    pub valid: bool,
}

impl Measurement {
    pub const fn new(value: f32) -> Self {
        Self { value, valid: true }
    }

    pub const INVALID: Self = Self {
        value: 0.0,
        valid: false,
    };
}

/// Point-in-time environmental readings from the live-sample source.
///
/// Temperature in °C, relative humidity in %, barometric pressure in hPa.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalSnapshot {
    /// When the readings were taken (seconds since epoch).
    pub timestamp: u32,
    pub temperature: Measurement,
    pub humidity: Measurement,
    pub pressure: Measurement,
}

impl EnvironmentalSnapshot {
    /// Whether at least one quantity carries a valid reading.
    pub fn any_valid(&self) -> bool {
        self.temperature.valid || self.humidity.valid || self.pressure.valid
    }

    /// A snapshot with every quantity flagged invalid, used when neither a
    /// live reading nor a stored fallback is available.
    pub const fn invalid(timestamp: u32) -> Self {
        Self {
            timestamp,
            temperature: Measurement::INVALID,
            humidity: Measurement::INVALID,
            pressure: Measurement::INVALID,
        }
    }
}

/// How a dispensed irrigation event was metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispenseMode {
    /// Target expressed as a volume; `volume_ml` is flow-meter measured.
    Volume,
    /// Target expressed as a run duration; `volume_ml` is an estimate.
    Duration,
}

/// One completed irrigation event reported by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrrigationEvent {
    /// Dispensed volume in millilitres (measured or estimated per `mode`).
    pub volume_ml: u32,
    pub mode: DispenseMode,
}

impl IrrigationEvent {
    /// Whether this event represents real dispensing activity.
    ///
    /// Zero-volume records (aborted runs, valve test pulses) are excluded
    /// from the hourly statistics.
    pub fn is_activity(&self) -> bool {
        self.volume_ml > 0
    }
}

/// Live environmental sampler (BME280-class sensor behind upstream
/// validation).
pub trait SampleSource {
    /// The most recent snapshot, or `None` if no sample has been taken yet.
    fn current_snapshot(&self) -> Option<EnvironmentalSnapshot>;
}

/// Accumulated rainfall measurements.
pub trait RainfallSource {
    /// Total rainfall in millimetres over `[start_ts, end_ts]`.
    fn rainfall_in_window(&self, start_ts: u32, end_ts: u32) -> f32;

    /// Total rainfall in millimetres over the trailing `lookback_hours`.
    ///
    /// Used by the compensation layer, not by aggregation itself.
    fn recent_total(&self, lookback_hours: u32) -> f32;
}

/// Per-channel log of completed irrigation events.
pub trait IrrigationEventSource {
    /// All events for `channel` that started within `[start_ts, end_ts)`.
    fn events_in_window(&self, channel: u8, start_ts: u32, end_ts: u32) -> Vec<IrrigationEvent>;
}

/// Durable blob store backing the persistence bridge.
///
/// May be an NVS-style key/value store or a log-structured flash layer; the
/// engine is agnostic. Implementations are expected to bound their own I/O
/// time — a slow or failed save surfaces as an error here and the engine
/// treats it as recoverable.
pub trait PersistenceProvider {
    /// Store `bytes` under `key`, replacing any previous blob.
    fn save_blob(&mut self, key: u16, bytes: &[u8]) -> Result<(), &'static str>;

    /// Fetch the blob stored under `key`, or `None` if absent.
    fn load_blob(&mut self, key: u16) -> Result<Option<Vec<u8>>, &'static str>;
}
