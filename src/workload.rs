//! Simulated long-running operation driven by the demo binary.

use anyhow::{bail, Result};
use busy_indicator::{CancellationToken, IndicatorHandle};
use std::time::Duration;
use tokio::time::Instant;

/// Parameters for one simulated run.
pub(crate) struct WorkloadParams {
    pub total_duration: Duration,
    pub step_interval: Duration,
    pub cancel: CancellationToken,
    pub indicator: IndicatorHandle,
    /// Keep working after cancellation has been requested.
    pub ignore_cancel: bool,
    /// Fail with an error once this much time has passed.
    pub fail_after: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkloadSummary {
    pub steps: u64,
    /// Stopped early because cancellation was observed.
    pub cancelled: bool,
}

fn percent_done(elapsed: Duration, total: Duration) -> i32 {
    if total.is_zero() {
        return 100;
    }
    let pct = elapsed.as_secs_f64() / total.as_secs_f64() * 100.0;
    pct.clamp(0.0, 100.0) as i32
}

/// Sleep in steps until `total_duration` has passed, reporting progress after
/// each step and checking the token between steps.
pub(crate) async fn run_simulated_work(params: WorkloadParams) -> Result<WorkloadSummary> {
    let WorkloadParams {
        total_duration,
        step_interval,
        cancel,
        indicator,
        ignore_cancel,
        fail_after,
    } = params;
    let start = Instant::now();
    let mut steps = 0u64;

    indicator.set_step("Preparing…");
    indicator.set_progress(0);

    while start.elapsed() < total_duration {
        if cancel.is_cancelled() && !ignore_cancel {
            tracing::debug!(steps, "simulated work observed cancellation");
            return Ok(WorkloadSummary {
                steps,
                cancelled: true,
            });
        }
        if let Some(limit) = fail_after {
            if start.elapsed() >= limit {
                bail!("simulated failure after {}", humantime::format_duration(limit));
            }
        }

        let remaining = total_duration.saturating_sub(start.elapsed());
        let nap = step_interval.min(remaining);
        if ignore_cancel {
            tokio::time::sleep(nap).await;
        } else {
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = cancel.cancelled() => continue,
            }
        }

        steps += 1;
        indicator.set_progress(percent_done(start.elapsed(), total_duration));
    }

    indicator.set_progress(100);
    Ok(WorkloadSummary {
        steps,
        cancelled: false,
    })
}
