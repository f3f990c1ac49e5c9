use crate::report::{build_text_summary, ObservedRun};
use crate::workload::{run_simulated_work, WorkloadParams};
use anyhow::{anyhow, Context, Result};
use busy_indicator::config::{self, FileConfig};
use busy_indicator::model::{RunOutcome, RunReport};
use busy_indicator::{CancellationToken, IndicatorConfig, IndicatorHandle, IndicatorState};
use clap::Parser;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// One line of demo output. The report goes to stdout, live status to stderr.
enum Line {
    Report(String),
    Status(String),
}

/// Drain demo output on the blocking pool so slow terminals never stall the
/// indicator tasks.
fn spawn_line_writer() -> (mpsc::UnboundedSender<Line>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Line>();
    let handle = tokio::task::spawn_blocking(move || {
        let mut report = std::io::stdout().lock();
        let mut status = std::io::LineWriter::new(std::io::stderr().lock());

        while let Some(line) = rx.blocking_recv() {
            let _ = match line {
                Line::Report(text) => writeln!(report, "{text}"),
                Line::Status(text) => writeln!(status, "{text}"),
            };
        }

        let _ = report.flush();
        let _ = status.flush();
    });
    (tx, handle)
}

/// Where status lines go while a run is in flight. Muting silences progress
/// lines only; notices from the abort relay still get through.
#[derive(Clone)]
struct StatusSink {
    tx: Option<mpsc::UnboundedSender<Line>>,
    muted: Arc<AtomicBool>,
}

impl StatusSink {
    fn new(tx: Option<mpsc::UnboundedSender<Line>>) -> Self {
        Self {
            tx,
            muted: Arc::new(AtomicBool::new(false)),
        }
    }

    fn progress(&self, text: String) {
        if !self.muted.load(Ordering::Relaxed) {
            self.send(text);
        }
    }

    fn notice(&self, text: &str) {
        self.send(text.to_string());
    }

    fn mute(&self) {
        self.muted.store(true, Ordering::Relaxed);
    }

    fn send(&self, text: String) {
        if let Some(tx) = self.tx.as_ref() {
            let _ = tx.send(Line::Status(text));
        }
    }
}

/// Returned by [`run`] when a second Ctrl-C cut the run short.
#[derive(Debug)]
pub struct Interrupted;

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("interrupted")
    }
}

impl std::error::Error for Interrupted {}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "busy-indicator",
    version,
    about = "Run a simulated operation behind a busy/abort indicator"
)]
pub struct Cli {
    /// Length of the simulated operation (default 15s, or the config file value)
    #[arg(long)]
    pub duration: Option<humantime::Duration>,

    /// Abort the operation after this long
    #[arg(long)]
    pub abort_after: Option<humantime::Duration>,

    /// Make the simulated operation fail after this long
    #[arg(long)]
    pub fail_after: Option<humantime::Duration>,

    /// Disable the abort affordance; Ctrl-C then only stops progress output
    #[arg(long)]
    pub no_abort: bool,

    /// Hide the step label while busy
    #[arg(long)]
    pub hide_step: bool,

    /// Simulated operation keeps running after cancellation is requested
    #[arg(long)]
    pub ignore_cancel: bool,

    /// Period of the elapsed-time tick
    #[arg(long)]
    pub tick_interval: Option<humantime::Duration>,

    /// Wait between signalling cancellation and forcing the indicator idle
    #[arg(long)]
    pub abort_grace: Option<humantime::Duration>,

    /// How often the simulated operation reports progress
    #[arg(long, default_value = "250ms")]
    pub step_interval: humantime::Duration,

    /// JSON config file (defaults to <config dir>/busy-indicator/config.json when present)
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Run silently: suppress progress lines (only with --json)
    #[arg(long)]
    pub silent: bool,
}

/// Effective settings after merging the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct DemoSettings {
    pub indicator: IndicatorConfig,
    pub duration: Duration,
    pub step_interval: Duration,
    pub can_abort: bool,
    pub show_step: bool,
    pub abort_after: Option<Duration>,
    pub fail_after: Option<Duration>,
    pub ignore_cancel: bool,
}

/// Build settings from a loaded config file, letting CLI flags win.
pub fn build_settings(args: &Cli, file: FileConfig) -> Result<DemoSettings> {
    let mut indicator = file.indicator;
    if let Some(d) = args.tick_interval {
        indicator.tick_interval = d.into();
    }
    if let Some(d) = args.abort_grace {
        indicator.abort_grace = d.into();
    }
    indicator.validate()?;

    let step_interval: Duration = args.step_interval.into();
    if step_interval.is_zero() {
        return Err(anyhow!("--step-interval must be greater than zero"));
    }

    Ok(DemoSettings {
        indicator,
        duration: args.duration.map(Duration::from).unwrap_or(file.duration),
        step_interval,
        can_abort: file.can_abort && !args.no_abort,
        show_step: file.show_step && !args.hide_step,
        abort_after: args.abort_after.map(Duration::from),
        fail_after: args.fail_after.map(Duration::from),
        ignore_cancel: args.ignore_cancel,
    })
}

pub async fn run(args: Cli) -> Result<()> {
    if args.silent && !args.json {
        return Err(anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    let file = config::load(args.config.as_deref()).context("failed to load config")?;
    let settings = build_settings(&args, file)?;
    tracing::debug!(?settings, "demo settings");

    let (out_tx, out_handle) = spawn_line_writer();
    let status = StatusSink::new((!args.silent).then(|| out_tx.clone()));
    let report = run_demo(&settings, forward_ctrl_c(), status).await?;

    if args.json {
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(Line::Report(out));
    } else {
        for line in build_text_summary(&report).lines {
            let _ = out_tx.send(Line::Report(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;

    match report.outcome {
        RunOutcome::Interrupted => Err(Interrupted.into()),
        RunOutcome::Failed => {
            Err(anyhow!(report.error.unwrap_or_default()).context("tracked operation failed"))
        }
        RunOutcome::Completed | RunOutcome::Aborted => Ok(()),
    }
}

/// Relay every Ctrl-C as one message. The stream closes if the handler cannot
/// be installed.
fn forward_ctrl_c() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                break;
            }
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run the simulated operation behind a fresh indicator and build its report.
///
/// `interrupts` carries one message per user interrupt. The first one aborts
/// (or mutes progress when abort is disabled); the next one abandons the run.
async fn run_demo(
    settings: &DemoSettings,
    interrupts: mpsc::UnboundedReceiver<()>,
    status: StatusSink,
) -> Result<RunReport> {
    let indicator = IndicatorHandle::spawn(settings.indicator.clone())?;
    let observer = tokio::spawn(observe_indicator(
        indicator.subscribe(),
        settings.indicator.tick_interval,
        status.clone(),
    ));

    let token = CancellationToken::new();
    let force_exit = CancellationToken::new();
    let triggers = tokio::spawn(watch_abort_triggers(
        indicator.clone(),
        settings.clone(),
        interrupts,
        status,
        force_exit.clone(),
    ));

    let params = WorkloadParams {
        total_duration: settings.duration,
        step_interval: settings.step_interval,
        cancel: token.clone(),
        indicator: indicator.clone(),
        ignore_cancel: settings.ignore_cancel,
        fail_after: settings.fail_after,
    };
    let started = Instant::now();
    let finished = tokio::select! {
        biased;
        res = indicator.show_and_run(
            move || run_simulated_work(params),
            Some(token.clone()),
            settings.can_abort,
            settings.show_step,
        ) => Some(res),
        _ = force_exit.cancelled() => None,
    };
    let operation_time = started.elapsed();

    match &finished {
        Some(Ok(summary)) => tracing::debug!(
            steps = summary.steps,
            cancelled = summary.cancelled,
            "tracked operation returned"
        ),
        Some(Err(_)) => {}
        None => tracing::info!("run abandoned after a second interrupt"),
    }
    triggers.abort();
    indicator.shutdown().await;
    let observed = observer.await.context("indicator observer task failed")?;

    let (outcome, error) = match &finished {
        None => (RunOutcome::Interrupted, None),
        Some(Ok(summary)) if summary.cancelled => (RunOutcome::Aborted, None),
        Some(Ok(_)) => (RunOutcome::Completed, None),
        Some(Err(e)) => (RunOutcome::Failed, Some(format!("{e:#}"))),
    };
    Ok(RunReport {
        timestamp_utc: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into()),
        outcome,
        requested_duration: settings.duration,
        operation_time,
        last_times: observed.last_times,
        ticks: observed.ticks,
        last_progress: observed.last_progress,
        cancel_requested: token.is_cancelled(),
        error,
    })
}

/// Follow the published state until the controller exits, reporting one
/// status line per visible change.
async fn observe_indicator(
    mut rx: watch::Receiver<IndicatorState>,
    tick_interval: Duration,
    status: StatusSink,
) -> ObservedRun {
    let mut observed = ObservedRun::default();
    let mut prev = rx.borrow_and_update().clone();

    while rx.changed().await.is_ok() {
        let cur = rx.borrow_and_update().clone();
        if cur.is_busy {
            // Updates may coalesce, so count ticks from the elapsed time.
            observed.ticks = (cur.elapsed.as_nanos() / tick_interval.as_nanos().max(1)) as u64;
            observed.last_times = cur.times.clone();
        }
        observed.last_progress = cur.progress;

        for line in describe_change(&prev, &cur) {
            status.progress(line);
        }
        prev = cur;
    }

    observed
}

/// Human-readable lines for one state transition.
fn describe_change(prev: &IndicatorState, cur: &IndicatorState) -> Vec<String> {
    let mut out = Vec::new();
    if cur.is_busy && !prev.is_busy {
        out.push(format!(
            "Busy (abort {}, step {})",
            if cur.can_abort { "enabled" } else { "disabled" },
            if cur.show_step { "shown" } else { "hidden" }
        ));
    }
    if cur.aborting && !prev.aborting {
        out.push("Cancelling…".into());
    }
    if cur.is_busy && cur.elapsed > prev.elapsed {
        if cur.show_step && cur.current_step != cur.times {
            out.push(format!("[{}] {} {}%", cur.times, cur.current_step, cur.progress));
        } else {
            out.push(format!("[{}] {}%", cur.times, cur.progress));
        }
    }
    if !cur.is_busy && prev.is_busy {
        out.push("Idle".into());
    }
    out
}

/// Relay interrupts and the scheduled `--abort-after` to the indicator.
///
/// The first interrupt aborts, or mutes progress output when abort is
/// disabled. Any interrupt after that, or after the scheduled abort, cancels
/// `force_exit`.
async fn watch_abort_triggers(
    indicator: IndicatorHandle,
    settings: DemoSettings,
    mut interrupts: mpsc::UnboundedReceiver<()>,
    status: StatusSink,
    force_exit: CancellationToken,
) {
    let scheduled = tokio::time::sleep(settings.abort_after.unwrap_or_default());
    tokio::pin!(scheduled);
    let mut scheduled_pending = settings.abort_after.is_some();
    let mut listening = true;
    let mut escalated = false;

    loop {
        tokio::select! {
            _ = &mut scheduled, if scheduled_pending => {
                scheduled_pending = false;
                if !escalated {
                    escalated = true;
                    status.notice("Scheduled abort");
                    abort_indicator(&indicator, &settings, &status).await;
                }
            }
            sig = interrupts.recv(), if listening => match sig {
                None => listening = false,
                Some(()) if escalated => {
                    status.notice("Interrupted again; exiting");
                    force_exit.cancel();
                    break;
                }
                Some(()) if settings.can_abort => {
                    escalated = true;
                    status.notice("Abort requested");
                    abort_indicator(&indicator, &settings, &status).await;
                }
                Some(()) => {
                    escalated = true;
                    status.notice(
                        "Abort is disabled for this operation; progress output stopped (Ctrl-C again to exit)",
                    );
                    status.mute();
                }
            },
            else => break,
        }
    }
}

async fn abort_indicator(indicator: &IndicatorHandle, settings: &DemoSettings, status: &StatusSink) {
    indicator.abort().await;
    if settings.ignore_cancel {
        status.notice("Indicator stopped; operation is still finishing… (Ctrl-C again to exit)");
    }
}
