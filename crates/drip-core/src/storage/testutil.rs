//! Mock collaborator implementations shared by the unit tests.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::sources::{
    EnvironmentalSnapshot, IrrigationEvent, IrrigationEventSource, PersistenceProvider,
    RainfallSource, SampleSource,
};

/// Live-sample source returning a fixed snapshot (or nothing).
pub(crate) struct Sampler {
    snapshot: Option<EnvironmentalSnapshot>,
}

impl Sampler {
    pub(crate) fn with(snapshot: EnvironmentalSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    pub(crate) fn none() -> Self {
        Self { snapshot: None }
    }
}

impl SampleSource for Sampler {
    fn current_snapshot(&self) -> Option<EnvironmentalSnapshot> {
        self.snapshot
    }
}

/// Rainfall source reporting a dry spell.
pub(crate) struct NoRain;

impl RainfallSource for NoRain {
    fn rainfall_in_window(&self, _start_ts: u32, _end_ts: u32) -> f32 {
        0.0
    }

    fn recent_total(&self, _lookback_hours: u32) -> f32 {
        0.0
    }
}

/// Rainfall source reporting a constant amount per queried window.
pub(crate) struct ConstRain(pub(crate) f32);

impl RainfallSource for ConstRain {
    fn rainfall_in_window(&self, _start_ts: u32, _end_ts: u32) -> f32 {
        self.0
    }

    fn recent_total(&self, lookback_hours: u32) -> f32 {
        self.0 * lookback_hours as f32
    }
}

/// Event source with no irrigation activity.
pub(crate) struct NoIrrigation;

impl IrrigationEventSource for NoIrrigation {
    fn events_in_window(&self, _channel: u8, _start_ts: u32, _end_ts: u32) -> Vec<IrrigationEvent> {
        Vec::new()
    }
}

/// Event source replaying a fixed script of `(channel, start_ts, event)`.
pub(crate) struct ScriptedIrrigation {
    script: Vec<(u8, u32, IrrigationEvent)>,
}

impl ScriptedIrrigation {
    pub(crate) fn new(script: &[(u8, u32, IrrigationEvent)]) -> Self {
        Self {
            script: script.to_vec(),
        }
    }
}

impl IrrigationEventSource for ScriptedIrrigation {
    fn events_in_window(&self, channel: u8, start_ts: u32, end_ts: u32) -> Vec<IrrigationEvent> {
        self.script
            .iter()
            .filter(|(c, ts, _)| *c == channel && *ts >= start_ts && *ts < end_ts)
            .map(|(_, _, event)| *event)
            .collect()
    }
}

/// In-memory persistence provider with an optional forced-failure mode.
#[derive(Default)]
pub(crate) struct MemoryStore {
    blobs: BTreeMap<u16, Vec<u8>>,
    pub(crate) saves: usize,
    fail: bool,
}

impl MemoryStore {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

impl PersistenceProvider for MemoryStore {
    fn save_blob(&mut self, key: u16, bytes: &[u8]) -> Result<(), &'static str> {
        if self.fail {
            return Err("save failed");
        }
        self.blobs.insert(key, bytes.to_vec());
        self.saves += 1;
        Ok(())
    }

    fn load_blob(&mut self, key: u16) -> Result<Option<Vec<u8>>, &'static str> {
        if self.fail {
            return Err("load failed");
        }
        Ok(self.blobs.get(&key).cloned())
    }
}
