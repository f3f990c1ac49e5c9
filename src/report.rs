//! Text summary builder for the demo's final report.

use busy_indicator::format_elapsed;
use busy_indicator::model::{RunOutcome, RunReport};
use std::time::Duration;

/// What an observer saw of the indicator during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ObservedRun {
    pub ticks: u64,
    pub last_times: String,
    pub last_progress: i32,
}

impl Default for ObservedRun {
    fn default() -> Self {
        Self {
            ticks: 0,
            last_times: format_elapsed(Duration::ZERO),
            last_progress: 0,
        }
    }
}

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_text_summary(report: &RunReport) -> TextSummary {
    let mut lines = Vec::new();

    let outcome = match report.outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::Aborted => "aborted",
        RunOutcome::Failed => "failed",
        RunOutcome::Interrupted => "interrupted",
    };
    // Millisecond precision is plenty for a human-facing line.
    let ran_for = Duration::from_millis(report.operation_time.as_millis() as u64);
    lines.push(format!(
        "Operation {outcome} after {}, requested {}",
        humantime::format_duration(ran_for),
        humantime::format_duration(report.requested_duration)
    ));
    lines.push(format!(
        "Indicator showed {} ({} tick{})",
        report.last_times,
        report.ticks,
        if report.ticks == 1 { "" } else { "s" },
    ));
    lines.push(format!("Progress: {}%", report.last_progress));
    if report.cancel_requested && report.outcome != RunOutcome::Aborted {
        lines.push("Cancellation was requested but the operation did not stop".into());
    }
    if let Some(err) = report.error.as_deref() {
        lines.push(format!("Error: {err}"));
    }

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: RunOutcome) -> RunReport {
        RunReport {
            timestamp_utc: "2024-01-01T00:00:00Z".into(),
            outcome,
            requested_duration: Duration::from_secs(15),
            operation_time: Duration::from_millis(7_250),
            last_times: "00:00:07".into(),
            ticks: 7,
            last_progress: 46,
            cancel_requested: false,
            error: None,
        }
    }

    #[test]
    fn completed_run_summary() {
        let summary = build_text_summary(&report(RunOutcome::Completed));
        assert_eq!(
            summary.lines,
            vec![
                "Operation completed after 7s 250ms, requested 15s",
                "Indicator showed 00:00:07 (7 ticks)",
                "Progress: 46%",
            ]
        );
    }

    #[test]
    fn failed_run_includes_error() {
        let mut r = report(RunOutcome::Failed);
        r.ticks = 1;
        r.error = Some("simulated failure after 1s".into());
        r.cancel_requested = true;
        let lines = build_text_summary(&r).lines;
        assert_eq!(lines[1], "Indicator showed 00:00:07 (1 tick)");
        assert_eq!(lines[3], "Cancellation was requested but the operation did not stop");
        assert_eq!(lines[4], "Error: simulated failure after 1s");
    }

    #[test]
    fn operation_time_outlasting_the_indicator_is_reported() {
        let mut r = report(RunOutcome::Completed);
        r.operation_time = Duration::from_nanos(4_000_123_456);
        r.last_times = "00:00:01".into();
        r.ticks = 1;
        r.cancel_requested = true;
        let lines = build_text_summary(&r).lines;
        assert_eq!(lines[0], "Operation completed after 4s, requested 15s");
        assert_eq!(lines[1], "Indicator showed 00:00:01 (1 tick)");
        assert_eq!(lines[3], "Cancellation was requested but the operation did not stop");
    }

    #[test]
    fn interrupted_run_is_named() {
        let lines = build_text_summary(&report(RunOutcome::Interrupted)).lines;
        assert!(lines[0].starts_with("Operation interrupted after"));
    }

    #[test]
    fn report_json_uses_humantime_and_snake_case() {
        let json = serde_json::to_value(report(RunOutcome::Aborted)).unwrap();
        assert_eq!(json["outcome"], "aborted");
        assert_eq!(json["requested_duration"], "15s");
        assert_eq!(json["operation_time"], "7s 250ms");
        assert_eq!(json["ticks"], 7);
    }
}
