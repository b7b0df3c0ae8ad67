//! Error taxonomy for the history engine.
//!
//! Every fallible operation in this crate returns [`HistoryError`]. The
//! variants split into two propagation classes:
//!
//! * **Recoverable** — [`HistoryError::Persistence`] and
//!   [`HistoryError::Corruption`]. The in-memory ring buffers remain the
//!   source of truth; callers log these and retry on the next cycle.
//! * **Caller bugs** — [`HistoryError::InvalidParameter`],
//!   [`HistoryError::OutOfRange`] and [`HistoryError::Empty`]. These are
//!   never retried and propagate immediately.
//!
//! No error from this engine should ever halt the periodic driver.

use thiserror_no_std::Error;

use crate::storage::Resolution;

/// Errors produced by the environmental history engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// An operation was attempted before the store was set up.
    #[error("history store not initialized")]
    NotInitialized,

    /// A caller supplied an argument outside the accepted domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// A logical index past the end of a ring buffer was requested.
    #[error("index {index} out of range for {len} stored entries")]
    OutOfRange { index: usize, len: usize },

    /// A latest/oldest lookup hit a tier with zero entries.
    #[error("no entries stored in the {0:?} tier")]
    Empty(Resolution),

    /// A structural invariant of a ring buffer was violated.
    #[error("ring buffer corruption detected in the {0:?} tier")]
    Corruption(Resolution),

    /// The external persistence provider failed a save or load.
    ///
    /// Warning-level: the in-memory state stays authoritative and the save is
    /// retried on the next aggregation cycle.
    #[error("persistence provider failure: {0}")]
    Persistence(&'static str),
}
