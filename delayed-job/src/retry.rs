use chrono::DateTime;
use std::time::Duration;

use crate::types::JobRecord;

const RETRY_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Delay before the retry numbered `attempt`: `ceil(attempt^1.5)` seconds
///
/// Computed on integers as the smallest `d` with `d * d >= attempt^3`.
pub fn backoff(attempt: u32) -> Duration {
    let cube = (attempt as u128).pow(3);
    let mut secs = (cube as f64).sqrt() as u128;
    while secs * secs > cube {
        secs -= 1;
    }
    while secs * secs < cube {
        secs += 1;
    }
    Duration::from_secs(secs as u64)
}

/// Render a unix timestamp the way retry messages show it (UTC)
pub fn format_timestamp(ts: i64) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(at) => at.format(RETRY_TIME_FORMAT).to_string(),
        None => ts.to_string(),
    }
}

/// Where a failed record goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Back into the queue, due at `run_at`
    Requeue { run_at: i64 },
    /// Into the failed collection
    DeadLetter,
}

/// Failed record after the policy was applied
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub record: JobRecord,
    pub route: Route,
}

/// Retry limit of one job type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 0 retries forever
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn unlimited() -> Self {
        Self { max_attempts: 0 }
    }

    /// Whether a job that reached `attempt` may run again
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }

    /// Consume one attempt and decide between requeue and dead-letter
    pub fn apply(&self, record: JobRecord, message: &str, now: i64) -> RetryOutcome {
        let record = record.next_attempt();

        if self.allows(record.attempt) {
            let run_at = now.saturating_add(backoff(record.attempt).as_secs() as i64);
            let record = record.with_error(format!(
                "{}, retry run at {}",
                message,
                format_timestamp(run_at)
            ));
            RetryOutcome {
                record,
                route: Route::Requeue { run_at },
            }
        } else {
            let record = record.with_error(format!("{}, attempts have ended", message));
            RetryOutcome {
                record,
                route: Route::DeadLetter,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unlimited()
    }
}
