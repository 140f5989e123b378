use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio::task::AbortHandle;
use tracing::{debug, error, warn};

use super::executor::{Executor, Settlement};
use super::launcher::TaskLauncher;
use crate::{
    backend::QueueBackend,
    types::{JobId, JobRecord},
};

struct Entry {
    record: JobRecord,
    settlement: Arc<Settlement>,
    abort: Option<AbortHandle>,
}

/// Records currently executing on this worker, one entry per claim
#[derive(Default)]
pub struct InFlight {
    entries: Mutex<HashMap<u64, Entry>>,
    next_key: AtomicU64,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a claimed `record` until the returned guard is dropped
    pub fn register(self: &Arc<Self>, record: JobRecord) -> InFlightGuard {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let settlement = Arc::new(Settlement::new());
        self.entries.lock().insert(
            key,
            Entry {
                record,
                settlement: settlement.clone(),
                abort: None,
            },
        );
        InFlightGuard {
            in_flight: self.clone(),
            key,
            settlement,
        }
    }

    /// Remember how to stop the task running entry `key`
    pub fn attach(&self, key: u64, abort: AbortHandle) {
        if let Some(entry) = self.entries.lock().get_mut(&key) {
            entry.abort = Some(abort);
        }
    }

    /// Take over every run whose result is not routed yet: its task is aborted
    /// and its record returned for the caller to route
    pub fn take_unsettled(&self) -> Vec<JobRecord> {
        let mut entries = self.entries.lock();
        let keys: Vec<u64> = entries
            .iter()
            .filter(|(_, entry)| entry.settlement.take())
            .map(|(key, _)| *key)
            .collect();

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = entries.remove(&key) {
                if let Some(abort) = entry.abort {
                    abort.abort();
                }
                records.push(entry.record);
            }
        }
        records
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.entries.lock().values().any(|entry| &entry.record.id == id)
    }

    /// Snapshot of the tracked ids, sorted
    pub fn ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .entries
            .lock()
            .values()
            .map(|entry| entry.record.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// Removes its entry from the in-flight set on drop
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
    key: u64,
    settlement: Arc<Settlement>,
}

impl InFlightGuard {
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn settlement(&self) -> Arc<Settlement> {
        self.settlement.clone()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.entries.lock().remove(&self.key);
    }
}

/// Held while a tick is claiming; released on drop
struct ClaimLock<'a>(&'a AtomicBool);

impl<'a> ClaimLock<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ClaimLock<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result of one scheduler heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The worker is stopping; nothing was claimed
    Stopped,
    /// Another tick was still claiming
    Suppressed,
    /// This many jobs were claimed and launched
    Claimed(usize),
    /// The store failed while claiming
    StoreError,
}

/// Claims due work up to the concurrency ceiling and launches it
pub struct Scheduler {
    queue: String,
    max_concurrency: usize,
    backend: Arc<dyn QueueBackend>,
    executor: Arc<Executor>,
    launcher: TaskLauncher,
    in_flight: Arc<InFlight>,
    claiming: AtomicBool,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        max_concurrency: usize,
        backend: Arc<dyn QueueBackend>,
        executor: Arc<Executor>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue: executor.queue().to_string(),
            max_concurrency,
            backend,
            executor,
            launcher: TaskLauncher::new(max_concurrency),
            in_flight: Arc::new(InFlight::new()),
            claiming: AtomicBool::new(false),
            cancel,
        }
    }

    /// One heartbeat: claim until the ceiling is reached or nothing is due
    pub async fn tick(&self) -> TickOutcome {
        if self.cancel.is_cancelled() {
            return TickOutcome::Stopped;
        }

        let Some(_lock) = ClaimLock::acquire(&self.claiming) else {
            warn!("Previous tick on queue {} is still claiming, skipping", self.queue);
            return TickOutcome::Suppressed;
        };

        let mut claimed = 0;
        while self.in_flight.len() < self.max_concurrency && !self.cancel.is_cancelled() {
            // A finished job leaves the in-flight set just before its permit is returned
            let slot = match self.launcher.try_reserve() {
                Some(slot) => slot,
                None => match self.launcher.reserve().await {
                    Ok(slot) => slot,
                    Err(_) => break,
                },
            };

            match self.backend.claim_due(&self.queue).await {
                Ok(Some(record)) => {
                    debug!("Claimed job {} from queue {}", record.id, self.queue);
                    let guard = self.in_flight.register(record.clone());
                    let key = guard.key();
                    let settlement = guard.settlement();
                    let executor = self.executor.clone();
                    let task = self.launcher.spawn(slot, async move {
                        let _guard = guard;
                        executor.execute_settled(record, &settlement).await;
                    });
                    self.in_flight.attach(key, task.abort_handle());
                    claimed += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to claim job from queue {}: {}", self.queue, e);
                    return TickOutcome::StoreError;
                }
            }
        }

        TickOutcome::Claimed(claimed)
    }

    /// Wait until no job is executing
    pub async fn wait_idle(&self, poll: Duration) {
        while !self.in_flight.is_empty() {
            tokio::time::sleep(poll).await;
        }
    }

    /// Stop every run that hasn't routed its result yet and route it as a fatal failure.
    /// Returns how many records were settled this way.
    pub async fn settle_unfinished(&self) -> usize {
        let records = self.in_flight.take_unsettled();
        for record in &records {
            warn!("Job {} on queue {} cut off by shutdown", record.id, self.queue);
            let outcome = self.executor.abandon(record.clone()).await;
            debug!("Job {} settled as {:?}", record.id, outcome);
        }
        records.len()
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn record(id: &str) -> JobRecord {
        JobRecord::new("test_job", Value::Null).with_id(JobId::from(id))
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let in_flight = Arc::new(InFlight::new());

        let first = in_flight.register(record("a"));
        let second = in_flight.register(record("a"));
        assert_eq!(in_flight.len(), 2);

        drop(first);
        assert!(in_flight.contains(&JobId::from("a")));
        drop(second);
        assert!(in_flight.is_empty());
    }

    #[test]
    fn test_claim_lock_is_exclusive() {
        let flag = AtomicBool::new(false);
        let lock = ClaimLock::acquire(&flag).unwrap();
        assert!(ClaimLock::acquire(&flag).is_none());
        drop(lock);
        assert!(ClaimLock::acquire(&flag).is_some());
    }

    #[test]
    fn test_ids_are_sorted() {
        let in_flight = Arc::new(InFlight::new());
        let _b = in_flight.register(record("b"));
        let _a = in_flight.register(record("a"));
        assert_eq!(in_flight.ids(), vec![JobId::from("a"), JobId::from("b")]);
    }

    #[test]
    fn test_take_unsettled_skips_runs_already_routing() {
        let in_flight = Arc::new(InFlight::new());
        let routing = in_flight.register(record("routing"));
        let _stuck = in_flight.register(record("stuck"));
        assert!(routing.settlement().take());

        let taken = in_flight.take_unsettled();
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].id.as_str(), "stuck");
        assert_eq!(in_flight.ids(), vec![JobId::from("routing")]);
        assert!(in_flight.take_unsettled().is_empty());
    }

    #[tokio::test]
    async fn test_take_unsettled_aborts_the_task() {
        let in_flight = Arc::new(InFlight::new());
        let guard = in_flight.register(record("hung"));
        let key = guard.key();
        let task = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        in_flight.attach(key, task.abort_handle());

        assert_eq!(in_flight.take_unsettled().len(), 1);
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(in_flight.is_empty());
    }
}
