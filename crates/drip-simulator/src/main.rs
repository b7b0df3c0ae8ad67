//! Desktop soak harness for the drip-core environmental history engine.
//!
//! Drives [`drip_core::SharedHistory`] through weeks of simulated controller
//! time in seconds of wall time: synthetic diurnal weather, periodic rain
//! fronts and a fixed irrigation schedule feed the hourly aggregation loop,
//! with an in-memory blob store standing in for flash. Halfway through the
//! run the controller is "power cycled" and must come back from its own
//! persisted blobs.
//!
//! Usage: `drip-simulator [WEEKS]` (default 4). Set `RUST_LOG=debug` to
//! watch individual aggregation cycles.

use std::env;
use std::process::ExitCode;

use log::{error, info};

use drip_core::sources::{
    DispenseMode, EnvironmentalSnapshot, IrrigationEvent, IrrigationEventSource, Measurement,
    PersistenceProvider, RainfallSource, SampleSource,
};
use drip_core::storage::Resolution;
use drip_core::SharedHistory;

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

const HOUR: u32 = 3_600;
const DAY: u32 = 86_400;
const WEEK: u32 = 7 * DAY;

/// Simulated weeks when no argument is given.
const DEFAULT_WEEKS: u32 = 4;

/// How often the periodic driver fires, in simulated seconds.
const DRIVER_INTERVAL: u32 = 15 * 60;

// ---------------------------------------------------------------------------
// Synthetic field environment
// ---------------------------------------------------------------------------

/// Deterministic weather and irrigation model evaluated at any timestamp.
///
/// One instance per driver cycle, pinned to the cycle's clock, so the trait
/// implementations never need interior mutability.
struct FieldModel {
    now: u32,
}

impl FieldModel {
    fn at(now: u32) -> Self {
        Self { now }
    }

    /// Diurnal temperature in °C: 14–30 with the peak mid-afternoon.
    fn temperature(ts: u32) -> f32 {
        let day_frac = (ts % DAY) as f32 / DAY as f32;
        22.0 + 8.0 * (core::f32::consts::TAU * (day_frac - 0.375)).sin()
    }

    /// Relative humidity in %, roughly inverse to temperature.
    fn humidity(ts: u32) -> f32 {
        let day_frac = (ts % DAY) as f32 / DAY as f32;
        60.0 - 15.0 * (core::f32::consts::TAU * (day_frac - 0.375)).sin()
    }

    /// Barometric pressure in hPa with a slow multi-day swell.
    fn pressure(ts: u32) -> f32 {
        let swell_frac = (ts % (3 * DAY)) as f32 / (3 * DAY) as f32;
        1_013.0 + 6.0 * (core::f32::consts::TAU * swell_frac).sin()
    }

    /// A rain front passes every fourth day, dropping 2.5 mm per hour for
    /// six hours starting at 02:00.
    fn rain_in_hour(hour_start: u32) -> f32 {
        let day = hour_start / DAY;
        let hour_of_day = (hour_start % DAY) / HOUR;
        if day % 4 == 3 && (2..8).contains(&hour_of_day) {
            2.5
        } else {
            0.0
        }
    }
}

impl SampleSource for FieldModel {
    fn current_snapshot(&self) -> Option<EnvironmentalSnapshot> {
        Some(EnvironmentalSnapshot {
            timestamp: self.now,
            temperature: Measurement::new(Self::temperature(self.now)),
            humidity: Measurement::new(Self::humidity(self.now)),
            pressure: Measurement::new(Self::pressure(self.now)),
        })
    }
}

impl RainfallSource for FieldModel {
    fn rainfall_in_window(&self, start_ts: u32, end_ts: u32) -> f32 {
        // Aggregation always asks with hour-aligned windows.
        let mut total = 0.0;
        let mut hour_start = start_ts / HOUR * HOUR;
        while hour_start <= end_ts {
            total += Self::rain_in_hour(hour_start);
            hour_start += HOUR;
        }
        total
    }

    fn recent_total(&self, lookback_hours: u32) -> f32 {
        let start = self.now.saturating_sub(lookback_hours * HOUR);
        self.rainfall_in_window(start, self.now)
    }
}

impl IrrigationEventSource for FieldModel {
    /// Channels 0..4 run at 06:00 daily; channels 4..8 run at 18:00 on even
    /// days. Channel 7 is duration-metered, everything else has a flow
    /// meter.
    fn events_in_window(&self, channel: u8, start_ts: u32, end_ts: u32) -> Vec<IrrigationEvent> {
        let mut events = Vec::new();
        let mut day = start_ts / DAY;
        while day * DAY < end_ts {
            let scheduled = if channel < 4 {
                Some(day * DAY + 6 * HOUR)
            } else if day % 2 == 0 {
                Some(day * DAY + 18 * HOUR)
            } else {
                None
            };
            if let Some(ts) = scheduled
                && ts >= start_ts
                && ts < end_ts
            {
                events.push(IrrigationEvent {
                    volume_ml: 1_000 + 250 * channel as u32,
                    mode: if channel == 7 {
                        DispenseMode::Duration
                    } else {
                        DispenseMode::Volume
                    },
                });
            }
            day += 1;
        }
        events
    }
}

// ---------------------------------------------------------------------------
// In-memory flash stand-in
// ---------------------------------------------------------------------------

/// Blob store that survives the simulated power cycle but not the process.
#[derive(Default)]
struct SimFlash {
    blobs: std::collections::HashMap<u16, Vec<u8>>,
    writes: usize,
}

impl PersistenceProvider for SimFlash {
    fn save_blob(&mut self, key: u16, bytes: &[u8]) -> Result<(), &'static str> {
        self.blobs.insert(key, bytes.to_vec());
        self.writes += 1;
        Ok(())
    }

    fn load_blob(&mut self, key: u16) -> Result<Option<Vec<u8>>, &'static str> {
        Ok(self.blobs.get(&key).cloned())
    }
}

// ---------------------------------------------------------------------------
// Soak run
// ---------------------------------------------------------------------------

/// Drive the aggregation loop from `start_ts` to `end_ts`.
fn run_span(
    history: &SharedHistory,
    flash: &mut SimFlash,
    start_ts: u32,
    end_ts: u32,
) -> Result<(), drip_core::HistoryError> {
    let mut now = start_ts;
    while now <= end_ts {
        let model = FieldModel::at(now);
        history.with(|store| store.advance(now, &model, &model, &model, flash))??;
        now += DRIVER_INTERVAL;
    }
    Ok(())
}

fn report(history: &SharedHistory, now: u32) -> Result<(), drip_core::HistoryError> {
    let stats = history.with(|store| store.stats())?;
    info!(
        "tiers: {} hourly / {} daily / {} monthly ({} bytes, {}% utilization)",
        stats.hourly_entries,
        stats.daily_entries,
        stats.monthly_entries,
        stats.total_storage_bytes,
        stats.utilization_pct
    );

    let status = history.with(|store| store.aggregation_status(now))?;
    info!(
        "watermarks: hourly={} daily={} monthly={}",
        status.last_hourly_update, status.last_daily_update, status.last_monthly_update
    );

    if let Ok(daily) = history.with(|store| store.latest_daily())? {
        info!(
            "latest day {}: temp {:.1}/{:.1}/{:.1} °C, {:.1} mm rain, {} events, {} mL",
            daily.day_start / DAY,
            daily.temperature.min,
            daily.temperature.avg,
            daily.temperature.max,
            daily.total_rainfall_mm,
            daily.watering_events,
            daily.total_volume_ml
        );
    }
    if let Ok(monthly) = history.with(|store| store.latest_monthly())? {
        info!(
            "latest month {}: temp {:.1}/{:.1}/{:.1} °C, {:.1} mm rain, {} active days",
            monthly.month_start / (30 * DAY),
            monthly.temperature.min,
            monthly.temperature.avg,
            monthly.temperature.max,
            monthly.total_rainfall_mm,
            monthly.days_active
        );
    }
    Ok(())
}

fn run(weeks: u32) -> Result<(), drip_core::HistoryError> {
    let span = weeks * WEEK;
    let restart_at = span / 2;
    let mut flash = SimFlash::default();

    info!("simulating {weeks} week(s) of controller time, power cycle at week {}", weeks / 2);

    // First boot: nothing in flash yet.
    let history = SharedHistory::new();
    history.init(&mut flash)?;
    run_span(&history, &mut flash, DRIVER_INTERVAL, restart_at)?;

    info!("--- power cycle ---");
    report(&history, restart_at)?;
    let entries_before = history.with(|store| store.entry_count(Resolution::Hourly))?;

    // Second boot: a fresh SharedHistory must restore from the blobs the
    // first life wrote.
    let history = SharedHistory::new();
    history.init(&mut flash)?;
    let entries_after = history.with(|store| store.entry_count(Resolution::Hourly))?;
    info!("restored {entries_after} hourly entries from flash (had {entries_before})");
    if entries_after != entries_before {
        return Err(drip_core::HistoryError::Persistence(
            "restore dropped hourly entries",
        ));
    }

    run_span(&history, &mut flash, restart_at, span)?;

    info!("--- soak complete ---");
    report(&history, span)?;

    // A two-week window in the middle of the run, bounded the way the
    // telemetry layer bounds its reads.
    let window = history.with(|store| store.daily_range(span / 4, span / 4 + 2 * WEEK, 64))??;
    info!("mid-run daily window returned {} entries", window.len());

    history.with(|store| store.validate(false))??;
    info!("integrity check passed after {} blob writes", flash.writes);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let weeks = env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_WEEKS)
        .max(1);

    match run(weeks) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("soak run failed: {err}");
            ExitCode::FAILURE
        }
    }
}
