use std::time::Duration;

use crate::{QueueError, QueueResult};

/// Queue used when neither the job nor the caller names one
pub const DEFAULT_QUEUE: &str = "default";

/// Number of jobs a worker runs at once unless configured otherwise
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Configuration for a worker process
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue to consume
    pub queue: String,
    /// Maximum number of jobs executing at the same time
    pub max_concurrency: usize,
    /// Keep completed records in the success collection
    pub save_success: bool,
    /// Heartbeat period of the scheduler
    pub tick_interval: Duration,
    /// How often in-flight jobs are checked while draining on shutdown
    pub drain_poll_interval: Duration,
    /// Pause after the store failed during a claim
    pub error_backoff: Duration,
    /// Give up waiting for in-flight jobs after this long
    pub shutdown_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            save_success: false,
            tick_interval: Duration::from_secs(1),
            drain_poll_interval: Duration::from_millis(100),
            error_backoff: Duration::from_secs(10),
            shutdown_timeout: None,
        }
    }
}

impl WorkerConfig {
    /// Default configuration for `queue`
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Self::default()
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_save_success(mut self, save_success: bool) -> Self {
        self.save_success = save_success;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval = interval;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Reject settings the worker cannot run with
    pub fn validate(&self) -> QueueResult<()> {
        if self.queue.trim().is_empty() {
            return Err(QueueError::InvalidConfig("queue name can't be blank".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(QueueError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(QueueError::InvalidConfig("tick_interval must be positive".to_string()));
        }
        if self.drain_poll_interval.is_zero() {
            return Err(QueueError::InvalidConfig(
                "drain_poll_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
