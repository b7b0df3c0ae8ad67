//! Time-bucket aggregation: hourly synthesis and the daily/monthly cascade.
//!
//! [`HistoryStore::advance`] is called by the periodic driver with the
//! current time. Per tier it determines the span of fully elapsed buckets
//! that have not been aggregated yet and processes all of them in one call,
//! so a long power-off is bridged on the next cycle rather than silently
//! skipped (backfill). The current, still-open bucket is never finalized.
//!
//! Hour buckets are synthesized from the collaborators: the most recent
//! valid live snapshot (falling back to the last stored hour's snapshot, or
//! to all-invalid readings when neither exists), plus rainfall and
//! per-channel irrigation events for the bucket's window. Daily and monthly
//! buckets are pure folds over the already-stored finer tier.
//!
//! Idempotence: each tier's schedule is derived from its newest stored entry
//! (or its watermark while the tier is empty), so re-running `advance` with
//! an unchanged clock adds nothing and moves nothing.

use log::{debug, warn};

use crate::error::HistoryError;
use crate::sources::{
    CHANNEL_COUNT, DispenseMode, EnvironmentalSnapshot, IrrigationEventSource, PersistenceProvider,
    RainfallSource, SampleSource,
};
use crate::storage::HistoryStore;
use crate::storage::bucket::{Resolution, bucket_end, bucket_start, to_bucket};
use crate::storage::entry::{DailyEntry, HourlyEntry, MonthlyEntry, StatAccumulator};

/// Elapsed buckets due for aggregation at one resolution: the inclusive
/// index span `[start, target]`, or `None` when nothing is due.
///
/// `target` is always the last fully elapsed bucket. `start` follows the
/// newest stored entry, or the watermark while the tier is empty. A tier
/// with neither starts at `fallback`.
///
/// A zero watermark reads as "never aggregated", so the epoch bucket 0 is
/// ambiguous: an empty tier whose only processed bucket was bucket 0 falls
/// through to `fallback` and may scan that bucket again. The rescan is
/// idempotent (a zero-source bucket folds to nothing) and ends as soon as
/// the tier holds an entry; real clocks start decades past the epoch.
fn due_span(
    now: u32,
    resolution: Resolution,
    newest_entry_ts: Option<u32>,
    watermark: u32,
    fallback: impl FnOnce(u32) -> u32,
) -> Option<(u32, u32)> {
    let current = to_bucket(now, resolution);
    if current == 0 {
        // Not enough elapsed time for a single full bucket.
        return None;
    }
    let target = current - 1;

    let last_done = newest_entry_ts
        .map(|ts| to_bucket(ts, resolution))
        .or_else(|| (watermark != 0).then(|| to_bucket(watermark, resolution)));

    let start = match last_done {
        Some(done) if done >= target => return None,
        Some(done) => done + 1,
        None => fallback(target),
    };
    if start > target {
        return None;
    }
    Some((start, target))
}

impl HistoryStore {
    /// Run hourly, daily and monthly aggregation for `current_ts`, then
    /// persist if anything changed.
    ///
    /// A persistence failure is surfaced as
    /// [`HistoryError::Persistence`] but is recoverable: the in-memory
    /// tiers were already updated, stay authoritative, and are saved again
    /// on the next cycle. Callers must not treat it as fatal.
    pub fn advance<S, R, E, P>(
        &mut self,
        current_ts: u32,
        samples: &S,
        rain: &R,
        events: &E,
        provider: &mut P,
    ) -> Result<(), HistoryError>
    where
        S: SampleSource,
        R: RainfallSource,
        E: IrrigationEventSource,
        P: PersistenceProvider,
    {
        let mut added = self.aggregate_hourly(current_ts, samples, rain, events);
        added += self.aggregate_daily(current_ts);
        added += self.aggregate_monthly(current_ts);

        self.cleanup_if_needed();

        if added > 0 {
            if let Err(e) = self.save(provider) {
                warn!("failed to persist environmental history: {e}; retrying next cycle");
                return Err(e);
            }
            debug!("aggregation cycle persisted {added} new entries");
        }
        Ok(())
    }

    /// Synthesize one [`HourlyEntry`] per elapsed, unprocessed hour bucket.
    ///
    /// Returns the number of entries added. The hourly watermark advances
    /// once, after the whole span has been inserted.
    pub fn aggregate_hourly<S, R, E>(
        &mut self,
        current_ts: u32,
        samples: &S,
        rain: &R,
        events: &E,
    ) -> usize
    where
        S: SampleSource,
        R: RainfallSource,
        E: IrrigationEventSource,
    {
        let Some((start, target)) = due_span(
            current_ts,
            Resolution::Hourly,
            self.hourly.latest().map(|e| e.timestamp),
            self.last_hourly_update,
            // Empty tier, no watermark: begin with the most recent elapsed
            // hour only, not the whole epoch.
            |target| target,
        ) else {
            return 0;
        };

        let live = samples.current_snapshot().filter(|s| s.any_valid());
        let mut fallback = self.hourly.latest().map(|e| e.snapshot);
        let mut added = 0;

        for hour in start..=target {
            let hour_start = bucket_start(hour, Resolution::Hourly);
            let hour_end = hour_start + Resolution::Hourly.period_secs();

            // Best-effort snapshot: live reading, else the previous hour's
            // (repeated across a gap, validity flags carried along), else
            // explicitly invalid.
            let mut snapshot = live
                .or(fallback.filter(EnvironmentalSnapshot::any_valid))
                .unwrap_or(EnvironmentalSnapshot::invalid(hour_start));
            snapshot.timestamp = hour_start;

            let rainfall_mm = rain.rainfall_in_window(hour_start, hour_end - 1);

            let mut watering_events: u8 = 0;
            let mut total_volume_ml: u32 = 0;
            let mut active_channels: u16 = 0;
            for channel in 0..CHANNEL_COUNT {
                for event in events.events_in_window(channel, hour_start, hour_end) {
                    if !event.is_activity() {
                        continue;
                    }
                    watering_events = watering_events.saturating_add(1);
                    if event.mode == DispenseMode::Volume {
                        total_volume_ml = total_volume_ml.saturating_add(event.volume_ml);
                    }
                    active_channels |= 1 << channel;
                }
            }

            let entry = HourlyEntry {
                timestamp: hour_start,
                snapshot,
                rainfall_mm,
                watering_events,
                total_volume_ml,
                active_channels,
            };
            fallback = Some(entry.snapshot);
            self.hourly.insert(entry);
            added += 1;
        }

        self.last_hourly_update = bucket_start(target, Resolution::Hourly);
        debug!("hourly aggregation processed buckets {start}..={target} ({added} entries)");
        added
    }

    /// Fold elapsed day buckets from the hourly tier.
    ///
    /// Every elapsed, unprocessed day is handled in one call. Days with no
    /// hourly coverage produce no entry, but the watermark still advances so
    /// an empty period is never rescanned (except the epoch bucket, see
    /// [`due_span`]).
    pub fn aggregate_daily(&mut self, current_ts: u32) -> usize {
        let oldest_source = self.hourly.oldest().map(|e| e.timestamp);
        let Some((start, target)) = due_span(
            current_ts,
            Resolution::Daily,
            self.daily.latest().map(|e| e.day_start),
            self.last_daily_update,
            // Fresh tier: begin where the stored hourly data begins.
            |target| oldest_source.map_or(target, |ts| to_bucket(ts, Resolution::Daily)),
        ) else {
            return 0;
        };

        let mut added = 0;
        for day in start..=target {
            if let Some(entry) = self.fold_day(day) {
                self.daily.insert(entry);
                added += 1;
            }
        }

        self.last_daily_update = bucket_start(target, Resolution::Daily);
        if added > 0 {
            debug!("daily aggregation processed buckets {start}..={target} ({added} entries)");
        }
        added
    }

    /// Fold elapsed 30-day month buckets from the daily tier.
    pub fn aggregate_monthly(&mut self, current_ts: u32) -> usize {
        let oldest_source = self.daily.oldest().map(|e| e.day_start);
        let Some((start, target)) = due_span(
            current_ts,
            Resolution::Monthly,
            self.monthly.latest().map(|e| e.month_start),
            self.last_monthly_update,
            |target| oldest_source.map_or(target, |ts| to_bucket(ts, Resolution::Monthly)),
        ) else {
            return 0;
        };

        let mut added = 0;
        for month in start..=target {
            if let Some(entry) = self.fold_month(month) {
                self.monthly.insert(entry);
                added += 1;
            }
        }

        self.last_monthly_update = bucket_start(target, Resolution::Monthly);
        if added > 0 {
            debug!("monthly aggregation processed buckets {start}..={target} ({added} entries)");
        }
        added
    }

    /// Summarize the hourly entries falling inside day bucket `day`, or
    /// `None` if the day has no coverage.
    fn fold_day(&self, day: u32) -> Option<DailyEntry> {
        let day_start = bucket_start(day, Resolution::Daily);
        let day_end = bucket_end(day, Resolution::Daily);

        let mut temperature = StatAccumulator::default();
        let mut humidity = StatAccumulator::default();
        let mut pressure = StatAccumulator::default();
        let mut total_rainfall_mm = 0.0f32;
        let mut watering_events: u16 = 0;
        let mut total_volume_ml: u32 = 0;
        let mut active_channels: u16 = 0;
        let mut sample_count: u16 = 0;

        for hourly in self
            .hourly
            .iter()
            .filter(|e| e.timestamp >= day_start && e.timestamp <= day_end)
        {
            if hourly.snapshot.temperature.valid {
                temperature.fold(hourly.snapshot.temperature.value);
            }
            if hourly.snapshot.humidity.valid {
                humidity.fold(hourly.snapshot.humidity.value);
            }
            if hourly.snapshot.pressure.valid {
                pressure.fold(hourly.snapshot.pressure.value);
            }
            total_rainfall_mm += hourly.rainfall_mm;
            watering_events = watering_events.saturating_add(hourly.watering_events.into());
            total_volume_ml = total_volume_ml.saturating_add(hourly.total_volume_ml);
            active_channels |= hourly.active_channels;
            sample_count = sample_count.saturating_add(1);
        }

        if sample_count == 0 {
            return None;
        }

        Some(DailyEntry {
            day_start,
            temperature: temperature.finish(),
            humidity: humidity.finish(),
            pressure: pressure.finish(),
            total_rainfall_mm,
            watering_events,
            total_volume_ml,
            sample_count,
            active_channels,
        })
    }

    /// Summarize the daily entries falling inside month bucket `month`, or
    /// `None` if the month has no coverage.
    fn fold_month(&self, month: u32) -> Option<MonthlyEntry> {
        let month_start = bucket_start(month, Resolution::Monthly);
        let month_end = bucket_end(month, Resolution::Monthly);

        let mut temperature = StatAccumulator::default();
        let mut humidity = StatAccumulator::default();
        let mut pressure = StatAccumulator::default();
        let mut total_rainfall_mm = 0.0f32;
        let mut watering_events: u32 = 0;
        let mut total_volume_ml: u64 = 0;
        let mut days_active: u8 = 0;
        let mut folded = 0u32;

        for daily in self
            .daily
            .iter()
            .filter(|e| e.day_start >= month_start && e.day_start <= month_end)
        {
            temperature.fold_triple(&daily.temperature);
            humidity.fold_triple(&daily.humidity);
            pressure.fold_triple(&daily.pressure);
            total_rainfall_mm += daily.total_rainfall_mm;
            watering_events = watering_events.saturating_add(daily.watering_events.into());
            total_volume_ml = total_volume_ml.saturating_add(daily.total_volume_ml.into());
            if daily.had_activity() {
                days_active = days_active.saturating_add(1);
            }
            folded += 1;
        }

        if folded == 0 {
            return None;
        }

        Some(MonthlyEntry {
            month_start,
            temperature: temperature.finish(),
            humidity: humidity.finish(),
            pressure: pressure.finish(),
            total_rainfall_mm,
            watering_events,
            total_volume_ml,
            days_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{IrrigationEvent, Measurement};
    use crate::storage::testutil::{
        ConstRain, MemoryStore, NoIrrigation, NoRain, Sampler, ScriptedIrrigation,
    };

    const HOUR: u32 = 3_600;
    const DAY: u32 = 86_400;

    fn snapshot(ts: u32, temp: f32) -> EnvironmentalSnapshot {
        EnvironmentalSnapshot {
            timestamp: ts,
            temperature: Measurement::new(temp),
            humidity: Measurement::new(55.0),
            pressure: Measurement::new(1013.2),
        }
    }

    fn hourly_with_temp(ts: u32, temp: f32) -> HourlyEntry {
        HourlyEntry {
            timestamp: ts,
            snapshot: snapshot(ts, temp),
            ..Default::default()
        }
    }

    #[test]
    fn nothing_due_before_first_full_hour() {
        let mut store = HistoryStore::new();
        let added = store.aggregate_hourly(HOUR - 1, &Sampler::none(), &NoRain, &NoIrrigation);
        assert_eq!(added, 0);
        assert_eq!(store.hourly.len(), 0);
    }

    #[test]
    fn first_hour_synthesized_from_live_snapshot() {
        let mut store = HistoryStore::new();
        let sampler = Sampler::with(snapshot(HOUR + 30, 21.5));
        let added = store.aggregate_hourly(HOUR + 60, &sampler, &NoRain, &NoIrrigation);
        assert_eq!(added, 1);

        let entry = store.hourly.latest().unwrap();
        assert_eq!(entry.timestamp, 0);
        assert_eq!(entry.snapshot.temperature.value, 21.5);
        assert!(entry.snapshot.temperature.valid);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let mut store = HistoryStore::new();
        let sampler = Sampler::with(snapshot(2 * HOUR, 18.0));
        let now = 3 * HOUR + 10;

        // A fresh tier starts at the most recent elapsed bucket only.
        assert_eq!(
            store.aggregate_hourly(now, &sampler, &NoRain, &NoIrrigation),
            1
        );
        let watermark = store.last_hourly_update;
        assert_eq!(watermark, 2 * HOUR);

        // Second run with the same clock: no entries, no watermark change.
        assert_eq!(
            store.aggregate_hourly(now, &sampler, &NoRain, &NoIrrigation),
            0
        );
        assert_eq!(store.hourly.len(), 1);
        assert_eq!(store.last_hourly_update, watermark);
    }

    #[test]
    fn backfill_covers_all_missed_hours_contiguously() {
        let mut store = HistoryStore::new();
        let sampler = Sampler::with(snapshot(HOUR, 20.0));
        store.aggregate_hourly(HOUR + 1, &sampler, &NoRain, &NoIrrigation);
        assert_eq!(store.hourly.len(), 1);

        // Power-off for 11 hours; next cycle must bridge every gap bucket.
        let sampler = Sampler::with(snapshot(12 * HOUR, 26.0));
        let added = store.aggregate_hourly(12 * HOUR + 5, &sampler, &NoRain, &NoIrrigation);
        assert_eq!(added, 11);
        assert_eq!(store.hourly.len(), 12);
        for (i, entry) in store.hourly.iter().enumerate() {
            assert_eq!(entry.timestamp, i as u32 * HOUR);
        }
    }

    #[test]
    fn gap_hours_reuse_stale_snapshot_when_no_live_sample() {
        let mut store = HistoryStore::new();
        let sampler = Sampler::with(snapshot(HOUR, 19.0));
        store.aggregate_hourly(HOUR + 1, &sampler, &NoRain, &NoIrrigation);

        // No live sample at catch-up time: the stored snapshot is repeated.
        let added = store.aggregate_hourly(4 * HOUR, &Sampler::none(), &NoRain, &NoIrrigation);
        assert_eq!(added, 3);
        for entry in store.hourly.iter() {
            assert_eq!(entry.snapshot.temperature.value, 19.0);
            assert!(entry.snapshot.temperature.valid);
        }
    }

    #[test]
    fn no_snapshot_at_all_marks_readings_invalid() {
        let mut store = HistoryStore::new();
        let added = store.aggregate_hourly(2 * HOUR, &Sampler::none(), &NoRain, &NoIrrigation);
        assert_eq!(added, 1);
        let entry = store.hourly.latest().unwrap();
        assert!(!entry.snapshot.temperature.valid);
        assert!(!entry.snapshot.humidity.valid);
        assert!(!entry.snapshot.pressure.valid);
    }

    #[test]
    fn irrigation_events_accumulate_into_the_hour() {
        let mut store = HistoryStore::new();
        let irrigation = ScriptedIrrigation::new(&[
            // (channel, start_ts, event)
            (
                2,
                30 * 60,
                IrrigationEvent {
                    volume_ml: 500,
                    mode: DispenseMode::Volume,
                },
            ),
            (
                5,
                40 * 60,
                IrrigationEvent {
                    volume_ml: 750,
                    mode: DispenseMode::Duration,
                },
            ),
            // Zero-volume records are not activity.
            (
                6,
                45 * 60,
                IrrigationEvent {
                    volume_ml: 0,
                    mode: DispenseMode::Volume,
                },
            ),
        ]);

        let sampler = Sampler::with(snapshot(HOUR, 20.0));
        store.aggregate_hourly(HOUR + 1, &sampler, &NoRain, &irrigation);

        let entry = store.hourly.latest().unwrap();
        assert_eq!(entry.watering_events, 2);
        // Duration-mode volume is an estimate and not metered into the total.
        assert_eq!(entry.total_volume_ml, 500);
        assert_eq!(entry.active_channels, (1 << 2) | (1 << 5));
    }

    #[test]
    fn rainfall_accumulates_through_the_daily_fold() {
        let mut store = HistoryStore::new();
        let sampler = Sampler::with(snapshot(HOUR, 18.0));

        // Three elapsed hours at a steady 1.5 mm each.
        store.aggregate_hourly(2 * HOUR, &sampler, &ConstRain(1.5), &NoIrrigation);
        store.aggregate_hourly(4 * HOUR + 1, &sampler, &ConstRain(1.5), &NoIrrigation);
        assert_eq!(store.hourly.len(), 3);
        for entry in store.hourly.iter() {
            assert_eq!(entry.rainfall_mm, 1.5);
        }

        store.aggregate_daily(DAY + 1);
        let daily = store.daily.latest().unwrap();
        assert_eq!(daily.total_rainfall_mm, 4.5);
    }

    #[test]
    fn daily_fold_matches_arithmetic_min_max_mean() {
        // Hours at 3600/7200/10800 with 10/20/30 degrees.
        let mut store = HistoryStore::new();
        store.add_hourly_entry(hourly_with_temp(HOUR, 10.0));
        store.add_hourly_entry(hourly_with_temp(2 * HOUR, 20.0));
        store.add_hourly_entry(hourly_with_temp(3 * HOUR, 30.0));

        let added = store.aggregate_daily(DAY + 1);
        assert_eq!(added, 1);

        let daily = store.daily.latest().unwrap();
        assert_eq!(daily.day_start, 0);
        assert_eq!(daily.temperature.min, 10.0);
        assert_eq!(daily.temperature.max, 30.0);
        assert_eq!(daily.temperature.avg, 20.0);
        assert_eq!(daily.sample_count, 3);
    }

    #[test]
    fn daily_fold_skips_invalid_readings() {
        let mut store = HistoryStore::new();
        store.add_hourly_entry(hourly_with_temp(HOUR, 15.0));
        let mut broken = hourly_with_temp(2 * HOUR, -273.0);
        broken.snapshot.temperature.valid = false;
        store.add_hourly_entry(broken);

        store.aggregate_daily(DAY + 1);
        let daily = store.daily.latest().unwrap();
        assert_eq!(daily.temperature.min, 15.0);
        assert_eq!(daily.temperature.avg, 15.0);
        // The invalid hour still counts toward coverage.
        assert_eq!(daily.sample_count, 2);
    }

    #[test]
    fn empty_day_advances_watermark_without_entry() {
        let mut store = HistoryStore::new();
        store.last_daily_update = DAY; // day 1 already aggregated
        let added = store.aggregate_daily(3 * DAY + 1);
        assert_eq!(added, 0);
        assert_eq!(store.daily.len(), 0);
        // Day 2 is not rescanned forever.
        assert_eq!(store.last_daily_update, 2 * DAY);
        assert_eq!(store.aggregate_daily(3 * DAY + 1), 0);
    }

    #[test]
    fn daily_backfill_processes_every_elapsed_day() {
        let mut store = HistoryStore::new();
        for day in 0..3u32 {
            for h in 0..24u32 {
                store.add_hourly_entry(hourly_with_temp(day * DAY + h * HOUR, 20.0 + day as f32));
            }
        }

        let added = store.aggregate_daily(3 * DAY + 1);
        assert_eq!(added, 3);
        let temps: std::vec::Vec<f32> = store.daily.iter().map(|d| d.temperature.avg).collect();
        assert_eq!(temps, [20.0, 21.0, 22.0]);
        assert_eq!(store.last_daily_update, 2 * DAY);
    }

    #[test]
    fn monthly_fold_spans_daily_extremes() {
        const MONTH: u32 = 2_592_000;
        let mut store = HistoryStore::new();
        for day in 0..30u32 {
            store.daily.insert(DailyEntry {
                day_start: day * DAY,
                temperature: crate::storage::StatTriple {
                    min: 5.0 + day as f32,
                    max: 15.0 + day as f32,
                    avg: 10.0 + day as f32,
                },
                watering_events: u16::from(day % 3 == 0),
                total_volume_ml: if day % 3 == 0 { 1_000 } else { 0 },
                sample_count: 24,
                ..Default::default()
            });
        }

        let added = store.aggregate_monthly(MONTH + 1);
        assert_eq!(added, 1);
        let monthly = store.monthly.latest().unwrap();
        assert_eq!(monthly.month_start, 0);
        assert_eq!(monthly.temperature.min, 5.0);
        assert_eq!(monthly.temperature.max, 44.0);
        // Mean of 10..=39
        assert_eq!(monthly.temperature.avg, 24.5);
        assert_eq!(monthly.days_active, 10);
        assert_eq!(monthly.total_volume_ml, 10_000);
    }

    #[test]
    fn advance_runs_the_full_cascade() {
        let mut store = HistoryStore::new();
        let mut persistence = MemoryStore::default();

        // Periodic driver firing once per hour across a full day.
        for h in 1..=24u32 {
            let now = h * HOUR + 1;
            let sampler = Sampler::with(snapshot(now, 20.0));
            store
                .advance(now, &sampler, &NoRain, &NoIrrigation, &mut persistence)
                .unwrap();
        }

        // 24 elapsed hours plus the folded day 0.
        assert_eq!(store.hourly.len(), 24);
        assert_eq!(store.daily.len(), 1);
        assert_eq!(store.daily.latest().unwrap().sample_count, 24);
        assert!(persistence.saves > 0);
    }

    #[test]
    fn advance_survives_persistence_failure() {
        let mut store = HistoryStore::new();
        let mut persistence = MemoryStore::failing();
        let sampler = Sampler::with(snapshot(2 * HOUR, 20.0));

        let result = store.advance(2 * HOUR, &sampler, &NoRain, &NoIrrigation, &mut persistence);
        assert_eq!(result, Err(HistoryError::Persistence("save failed")));
        // In-memory state is still authoritative.
        assert_eq!(store.hourly.len(), 1);
        assert_eq!(store.last_hourly_update, HOUR);
    }
}
