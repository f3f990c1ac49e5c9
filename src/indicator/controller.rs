//! Indicator lifecycle controller.
//!
//! Owns the tick source, elapsed-time accumulation and the borrowed cancellation
//! token. All mutation happens on this task; callers only enqueue commands.

use crate::cancel::CancellationToken;
use crate::config::IndicatorConfig;
use crate::model::{format_elapsed, IndicatorState};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Commands emitted by indicator handles.
pub(crate) enum IndicatorCommand {
    SetStep(String),
    SetProgress(i32),
    Show {
        handle: Option<CancellationToken>,
        can_abort: bool,
        show_step: bool,
    },
    Stop,
    Abort {
        done: oneshot::Sender<()>,
    },
    /// Barrier: acknowledged once every earlier command has been applied.
    Settled {
        done: oneshot::Sender<()>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// An abort whose grace period is still running.
struct PendingAbort {
    deadline: Instant,
    waiters: Vec<oneshot::Sender<()>>,
}

impl PendingAbort {
    fn release(self) {
        for w in self.waiters {
            let _ = w.send(());
        }
    }
}

struct Controller {
    cfg: IndicatorConfig,
    state_tx: watch::Sender<IndicatorState>,
    ticker: Option<Interval>,
    cancel: Option<CancellationToken>,
    pending_abort: Option<PendingAbort>,
}

impl Controller {
    fn apply(&mut self, cmd: IndicatorCommand) {
        match cmd {
            IndicatorCommand::SetStep(label) => {
                self.state_tx.send_if_modified(|s| {
                    if s.current_step == label {
                        return false;
                    }
                    s.current_step = label;
                    true
                });
            }
            IndicatorCommand::SetProgress(value) => {
                self.state_tx.send_if_modified(|s| {
                    let changed = s.progress != value;
                    s.progress = value;
                    changed
                });
            }
            IndicatorCommand::Show {
                handle,
                can_abort,
                show_step,
            } => self.show(handle, can_abort, show_step),
            IndicatorCommand::Stop => self.stop(),
            IndicatorCommand::Abort { done } => self.abort(done),
            IndicatorCommand::Settled { done } => {
                let _ = done.send(());
            }
            // Handled by the loop.
            IndicatorCommand::Shutdown { .. } => {}
        }
    }

    fn show(&mut self, handle: Option<CancellationToken>, can_abort: bool, show_step: bool) {
        if let Some(pending) = self.pending_abort.take() {
            tracing::debug!("show superseded a pending abort");
            pending.release();
        }
        self.release_handle();
        self.cancel = handle;

        if self.ticker.is_none() {
            let period = self.cfg.tick_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.ticker = Some(ticker);
            tracing::debug!(can_abort, show_step, "indicator busy");
        }

        self.state_tx.send_modify(|s| {
            s.is_busy = true;
            s.aborting = false;
            s.can_abort = can_abort;
            s.show_step = show_step;
        });
    }

    fn on_tick(&mut self) {
        let step = self.cfg.tick_interval;
        self.state_tx.send_modify(|s| {
            s.elapsed += step;
            s.times = format_elapsed(s.elapsed);
            s.current_step = s.times.clone();
        });
    }

    /// Halt the tick source and return to idle. Safe to repeat.
    fn stop(&mut self) {
        if let Some(pending) = self.pending_abort.take() {
            pending.release();
        }
        self.release_handle();
        if self.ticker.take().is_some() {
            tracing::debug!("indicator idle");
        }

        self.state_tx.send_if_modified(|s| {
            let changed = s.is_busy || s.aborting || !s.elapsed.is_zero();
            s.is_busy = false;
            s.aborting = false;
            s.elapsed = Duration::ZERO;
            s.times = format_elapsed(Duration::ZERO);
            changed
        });
    }

    fn abort(&mut self, done: oneshot::Sender<()>) {
        if let Some(pending) = self.pending_abort.as_mut() {
            pending.waiters.push(done);
            return;
        }
        let Some(token) = self.cancel.as_ref() else {
            self.stop();
            let _ = done.send(());
            return;
        };

        tracing::debug!(grace = ?self.cfg.abort_grace, "abort requested, signalling cancellation");
        token.cancel();
        self.pending_abort = Some(PendingAbort {
            deadline: Instant::now() + self.cfg.abort_grace,
            waiters: vec![done],
        });
        self.state_tx.send_modify(|s| s.aborting = true);
    }

    fn finish_abort(&mut self) {
        tracing::debug!("abort grace period elapsed");
        // stop() releases the token and acknowledges the waiters.
        self.stop();
    }

    /// Drop our clone of the caller's token. No-op when nothing is held.
    fn release_handle(&mut self) {
        self.cancel.take();
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker.as_mut() {
        Some(t) => {
            t.tick().await;
        }
        None => futures::future::pending().await,
    }
}

async fn abort_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => futures::future::pending().await,
    }
}

/// Drive one indicator until every handle is gone or a shutdown is requested.
pub(crate) async fn run_controller(
    cfg: IndicatorConfig,
    state_tx: watch::Sender<IndicatorState>,
    mut cmd_rx: UnboundedReceiver<IndicatorCommand>,
) {
    let mut ctl = Controller {
        cfg,
        state_tx,
        ticker: None,
        cancel: None,
        pending_abort: None,
    };

    let shutdown_ack = loop {
        // Commands go first so a queued stop always beats a tick that became ready at
        // the same time; once the ticker is dropped no further tick can be observed.
        tokio::select! {
            biased;
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(IndicatorCommand::Shutdown { done }) => break Some(done),
                    Some(cmd) => ctl.apply(cmd),
                    None => break None,
                }
            }
            _ = abort_deadline(ctl.pending_abort.as_ref().map(|p| p.deadline)) => {
                ctl.finish_abort();
            }
            _ = next_tick(&mut ctl.ticker) => {
                ctl.on_tick();
            }
        }
    };

    // Commands still queued behind a shutdown are dropped; their waiters see a closed channel.
    cmd_rx.close();
    ctl.stop();
    tracing::debug!("indicator controller exited");
    if let Some(done) = shutdown_ack {
        let _ = done.send(());
    }
}
