//! Busy/abort indicator.
//!
//! [`IndicatorHandle`] is what presentation layers and callers hold; the controller
//! task behind it owns the tick, the elapsed time and the borrowed cancellation
//! token, and publishes [`crate::IndicatorState`] snapshots over a watch channel.

mod controller;
mod handle;

pub use handle::IndicatorHandle;
