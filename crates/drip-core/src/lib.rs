//! Hardware-independent core library for drip-rs
//!
//! This crate contains all platform-agnostic logic for the drip multi-channel
//! irrigation controller: the multi-resolution environmental history engine
//! (ring-buffer storage, time-bucket aggregation, range queries, integrity
//! validation and capacity management), the collaborator traits it consumes
//! (live samples, rainfall, irrigation events, durable persistence), and the
//! shared-store lock used by the periodic driver and the telemetry layer.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod error;
pub mod sources;
pub mod storage;

pub use error::HistoryError;
pub use storage::{HistoryStore, Resolution, SharedHistory};
