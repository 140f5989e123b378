use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::scheduler::{Scheduler, TickOutcome};
use crate::{config::WorkerConfig, QueueResult};

/// Worker lifecycle states, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Timing knobs of the run loop
#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    pub tick_interval: Duration,
    pub error_backoff: Duration,
    pub drain_poll_interval: Duration,
    pub shutdown_timeout: Option<Duration>,
}

impl From<&WorkerConfig> for LoopTiming {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            error_backoff: config.error_backoff,
            drain_poll_interval: config.drain_poll_interval,
            shutdown_timeout: config.shutdown_timeout,
        }
    }
}

/// Drives a scheduler from start to a drained stop
pub struct Lifecycle {
    scheduler: Arc<Scheduler>,
    timing: LoopTiming,
    cancel: CancellationToken,
    state_tx: watch::Sender<WorkerState>,
}

impl Lifecycle {
    /// Create an idle lifecycle and the receiver its state is published on
    pub fn new(scheduler: Arc<Scheduler>, timing: LoopTiming) -> (Self, watch::Receiver<WorkerState>) {
        let (state_tx, state_rx) = watch::channel(WorkerState::Idle);
        let cancel = scheduler.cancel_token().clone();
        (
            Self {
                scheduler,
                timing,
                cancel,
                state_tx,
            },
            state_rx,
        )
    }

    fn set_state(&self, state: WorkerState) {
        self.state_tx.send_replace(state);
    }

    /// Run the worker loop until the cancellation token fires, then drain
    pub async fn run(self) -> QueueResult<()> {
        info!(
            "Worker started for queue {} (max concurrency: {})",
            self.scheduler.queue(),
            self.scheduler.max_concurrency()
        );
        self.set_state(WorkerState::Running);

        let mut ticker = interval(self.timing.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Worker shutdown requested");
                    break;
                }

                _ = ticker.tick() => {
                    if self.scheduler.tick().await == TickOutcome::StoreError {
                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                info!("Worker shutdown requested");
                                break;
                            }
                            _ = sleep(self.timing.error_backoff) => {}
                        }
                    }
                }
            }
        }

        self.set_state(WorkerState::Stopping);
        self.drain().await;
        self.set_state(WorkerState::Stopped);

        info!("Bye");
        Ok(())
    }

    async fn drain(&self) {
        let running = self.scheduler.in_flight_len();
        if running > 0 {
            info!("Waiting for {} running jobs to finish", running);
        }

        let wait = self.scheduler.wait_idle(self.timing.drain_poll_interval);
        match self.timing.shutdown_timeout {
            Some(limit) => {
                if timeout(limit, wait).await.is_err() {
                    let ids: Vec<String> = self
                        .scheduler
                        .in_flight()
                        .ids()
                        .iter()
                        .map(|id| id.to_string())
                        .collect();
                    error!(
                        "Shutdown timed out after {:?}, jobs still running: {}",
                        limit,
                        ids.join(", ")
                    );

                    let settled = self.scheduler.settle_unfinished().await;
                    info!("Routed {} cut off jobs as failures", settled);

                    // Runs that were already routing their result get one more window
                    let wait = self.scheduler.wait_idle(self.timing.drain_poll_interval);
                    if timeout(limit, wait).await.is_err() {
                        error!(
                            "{} jobs still routing at exit",
                            self.scheduler.in_flight_len()
                        );
                    }
                }
            }
            None => wait.await,
        }
    }
}
