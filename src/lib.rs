//! Busy/abort indicator controller.
//!
//! Tracks one long-running operation at a time: a periodic tick advances an
//! `HH:MM:SS` elapsed display, callers push step labels and progress, and an abort
//! request is relayed to the caller's [`CancellationToken`] before the indicator
//! returns to idle.

pub mod cancel;
pub mod config;
pub mod indicator;
pub mod model;

pub use cancel::CancellationToken;
pub use config::IndicatorConfig;
pub use indicator::IndicatorHandle;
pub use model::{format_elapsed, IndicatorState};
