use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Observable snapshot published by the indicator controller.
///
/// Presentation layers read it through [`crate::IndicatorHandle::subscribe`];
/// only the controller task writes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorState {
    pub elapsed: Duration,
    /// `HH:MM:SS` rendering of `elapsed`.
    pub times: String,
    pub current_step: String,
    pub progress: i32,
    pub is_busy: bool,
    pub can_abort: bool,
    pub show_step: bool,
    /// An abort was requested and its grace period is still running.
    pub aborting: bool,
}

impl Default for IndicatorState {
    fn default() -> Self {
        Self {
            elapsed: Duration::ZERO,
            times: format_elapsed(Duration::ZERO),
            current_step: String::new(),
            progress: 0,
            is_busy: false,
            can_abort: true,
            show_step: true,
            aborting: false,
        }
    }
}

/// Format a duration as `HH:MM:SS`. Hours keep counting past 24; sub-second
/// remainders are truncated.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// How a tracked run ended, as seen by the demo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Aborted,
    Failed,
    /// The user interrupted again while the run was still winding down.
    Interrupted,
}

/// Summary of one demo run, printed as text or JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default)]
    pub timestamp_utc: String,
    pub outcome: RunOutcome,
    #[serde(with = "humantime_serde")]
    pub requested_duration: Duration,
    /// Wall time the tracked operation actually ran, which can outlast the
    /// indicator when the operation ignores cancellation.
    #[serde(with = "humantime_serde")]
    pub operation_time: Duration,
    /// Elapsed time shown by the indicator just before it went idle.
    pub last_times: String,
    pub ticks: u64,
    pub last_progress: i32,
    pub cancel_requested: bool,
    #[serde(default)]
    pub error: Option<String>,
}
