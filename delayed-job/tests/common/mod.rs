#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use delayed_job::{
    CollectionKind, JobId, JobRecord, MemoryBackend, QueueBackend, QueueError, QueueResult,
};

/// Memory store whose claims can be slowed down or made to fail
#[derive(Clone, Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    fail_claims: Arc<AtomicBool>,
    claim_delay: Arc<Mutex<Option<Duration>>>,
    claim_calls: Arc<AtomicUsize>,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    pub fn set_fail_claims(&self, fail: bool) {
        self.fail_claims.store(fail, Ordering::SeqCst);
    }

    pub fn set_claim_delay(&self, delay: Duration) {
        *self.claim_delay.lock() = Some(delay);
    }

    pub fn claim_calls(&self) -> usize {
        self.claim_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueBackend for FlakyBackend {
    async fn enqueue(
        &self,
        queue: &str,
        record: JobRecord,
        kind: CollectionKind,
        due_time: Option<i64>,
    ) -> QueueResult<JobRecord> {
        self.inner.enqueue(queue, record, kind, due_time).await
    }

    async fn claim_due_at(&self, queue: &str, now: i64) -> QueueResult<Option<JobRecord>> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.claim_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(QueueError::Backend("connection refused".to_string()));
        }
        self.inner.claim_due_at(queue, now).await
    }

    async fn mark_processing(&self, queue: &str, record: JobRecord) -> QueueResult<JobRecord> {
        self.inner.mark_processing(queue, record).await
    }

    async fn unmark_processing(&self, queue: &str, id: &JobId) -> QueueResult<bool> {
        self.inner.unmark_processing(queue, id).await
    }

    async fn list(
        &self,
        queue: &str,
        kind: CollectionKind,
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<JobRecord>> {
        self.inner.list(queue, kind, offset, limit).await
    }

    async fn count(&self, queue: &str, kind: CollectionKind) -> QueueResult<u64> {
        self.inner.count(queue, kind).await
    }

    async fn clear(&self, queue: &str, kind: CollectionKind) -> QueueResult<()> {
        self.inner.clear(queue, kind).await
    }
}

/// Poll `check` until it holds, panicking after `limit`
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) {
    tokio::time::timeout(limit, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Async flavour of [`wait_until`]
pub async fn wait_until_async<F, Fut>(limit: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(limit, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
