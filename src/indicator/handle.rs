use super::controller::{run_controller, IndicatorCommand};
use crate::cancel::CancellationToken;
use crate::config::IndicatorConfig;
use crate::model::IndicatorState;
use anyhow::{anyhow, Result};
use std::future::Future;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::{oneshot, watch};

/// Cloneable front door to one indicator controller.
///
/// Every mutating call is queued and applied, in order, by the controller task. Use
/// [`IndicatorHandle::settled`] when a caller needs to observe its own writes.
#[derive(Clone)]
pub struct IndicatorHandle {
    cmd_tx: UnboundedSender<IndicatorCommand>,
    state_rx: watch::Receiver<IndicatorState>,
}

impl IndicatorHandle {
    /// Spawn the controller task on the current tokio runtime.
    pub fn spawn(cfg: IndicatorConfig) -> Result<Self> {
        cfg.validate()?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<IndicatorCommand>();
        let (state_tx, state_rx) = watch::channel(IndicatorState::default());
        tokio::spawn(run_controller(cfg, state_tx, cmd_rx));
        Ok(Self { cmd_tx, state_rx })
    }

    fn send(&self, cmd: IndicatorCommand) {
        // A closed controller has nothing left to update.
        let _ = self.cmd_tx.send(cmd);
    }

    async fn request(&self, make: impl FnOnce(oneshot::Sender<()>) -> IndicatorCommand) {
        let (done, rx) = oneshot::channel();
        if self.cmd_tx.send(make(done)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn set_step(&self, label: impl Into<String>) {
        self.send(IndicatorCommand::SetStep(label.into()));
    }

    pub fn set_progress(&self, value: i32) {
        self.send(IndicatorCommand::SetProgress(value));
    }

    /// Enter the busy state. While already busy this only swaps the token and flags;
    /// the tick and elapsed time carry on.
    pub fn show(&self, handle: Option<CancellationToken>, can_abort: bool, show_step: bool) {
        self.send(IndicatorCommand::Show {
            handle,
            can_abort,
            show_step,
        });
    }

    /// [`IndicatorHandle::show`] with abort and step display enabled.
    pub fn show_default(&self, handle: Option<CancellationToken>) {
        self.show(handle, true, true);
    }

    pub fn stop(&self) {
        self.send(IndicatorCommand::Stop);
    }

    /// Signal the held token, wait out the grace period, then stop. Resolves once the
    /// indicator is idle. Without a token this is a plain stop.
    pub async fn abort(&self) {
        self.request(|done| IndicatorCommand::Abort { done }).await;
    }

    /// Resolves once every command sent before this call has been applied.
    pub async fn settled(&self) {
        self.request(|done| IndicatorCommand::Settled { done }).await;
    }

    /// Stop the controller task. Later calls on any clone are ignored.
    pub async fn shutdown(&self) {
        self.request(|done| IndicatorCommand::Shutdown { done }).await;
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    pub fn snapshot(&self) -> IndicatorState {
        self.state_rx.borrow().clone()
    }

    /// New observer of the published state. The current value counts as already seen.
    pub fn subscribe(&self) -> watch::Receiver<IndicatorState> {
        let mut rx = self.state_rx.clone();
        rx.mark_unchanged();
        rx
    }

    /// Show the indicator, run `operation` on its own task and stop the indicator
    /// however the operation ends. The result is returned once the indicator is idle.
    ///
    /// Dropping the returned future still stops the indicator, but the spawned
    /// operation keeps running until it observes `handle` or finishes.
    pub async fn show_and_run<F, Fut, T>(
        &self,
        operation: F,
        handle: Option<CancellationToken>,
        can_abort: bool,
        show_step: bool,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.show(handle, can_abort, show_step);
        let guard = StopGuard(self);
        let joined = tokio::spawn(operation()).await;
        self.finish_run(guard, joined).await
    }

    /// [`IndicatorHandle::show_and_run`] for synchronous work, run on the blocking pool.
    pub async fn show_and_run_blocking<F, T>(
        &self,
        operation: F,
        handle: Option<CancellationToken>,
        can_abort: bool,
        show_step: bool,
    ) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.show(handle, can_abort, show_step);
        let guard = StopGuard(self);
        let joined = tokio::task::spawn_blocking(operation).await;
        self.finish_run(guard, joined).await
    }

    async fn finish_run<T>(
        &self,
        guard: StopGuard<'_>,
        joined: std::result::Result<Result<T>, tokio::task::JoinError>,
    ) -> Result<T> {
        drop(guard);
        self.settled().await;
        match joined {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => {
                tracing::warn!("tracked operation failed: {e:#}");
                Err(e)
            }
            Err(e) if e.is_panic() => {
                tracing::warn!("tracked operation panicked");
                Err(anyhow!("tracked operation panicked"))
            }
            Err(e) => Err(anyhow!("tracked operation did not complete: {e}")),
        }
    }
}

/// Sends `stop` when dropped, so every exit from a tracked run leaves the indicator idle.
struct StopGuard<'a>(&'a IndicatorHandle);

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.0.stop();
    }
}
