/*!
 * Periodic Task
 *
 * Background loop running one job on a reconfigurable interval. Used by the
 * resource sampler and the cleanup sweeper. An interval of `None` parks the
 * loop until it is re-armed or shut down.
 */

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Control messages for a periodic task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCommand {
    /// Replace the interval; `None` disables ticking
    UpdateInterval(Option<Duration>),
    Shutdown,
}

/// Handle to a periodic background task
pub struct PeriodicTask {
    name: &'static str,
    command_tx: mpsc::UnboundedSender<TaskCommand>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn onto the current Tokio runtime
    pub fn spawn<F, Fut>(name: &'static str, period: Option<Duration>, job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_loop(name, period, job, command_rx));

        debug!(task = name, ?period, "Periodic task spawned");

        Self {
            name,
            command_tx,
            handle: Some(handle),
        }
    }

    pub fn update_interval(&self, period: Option<Duration>) {
        let _ = self.command_tx.send(TaskCommand::UpdateInterval(period));
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(&mut self) {
        let _ = self.command_tx.send(TaskCommand::Shutdown);

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(task = self.name, error = %e, "Periodic task shutdown error");
            } else {
                debug!(task = self.name, "Periodic task shutdown complete");
            }
        }
    }
}

fn make_interval(period: Option<Duration>) -> Option<Interval> {
    period.map(|period| {
        // First tick one period from now, not immediately
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    })
}

/// Next tick, or never when disabled
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn run_loop<F, Fut>(
    name: &'static str,
    period: Option<Duration>,
    mut job: F,
    mut command_rx: mpsc::UnboundedReceiver<TaskCommand>,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut interval = make_interval(period);

    loop {
        tokio::select! {
            _ = next_tick(&mut interval) => job().await,

            cmd = command_rx.recv() => match cmd {
                Some(TaskCommand::UpdateInterval(period)) => {
                    info!(task = name, ?period, "Interval updated");
                    interval = make_interval(period);
                }
                Some(TaskCommand::Shutdown) | None => {
                    debug!(task = name, "Periodic task shutting down");
                    break;
                }
            },
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.command_tx.send(TaskCommand::Shutdown);
        }
    }
}
