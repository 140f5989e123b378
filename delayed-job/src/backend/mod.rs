#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::{
    types::{timestamp_now, CollectionKind, JobId, JobRecord},
    QueueError, QueueResult,
};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Page size used by listings when the caller doesn't pick one
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Sizes of the four collections of one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: u64,
    pub processing: u64,
    pub failed: u64,
    pub success: u64,
}

/// Backend trait for queue storage primitives
///
/// Every call is scoped to a queue name and one of its collections. Ordered
/// collections are scored by unix seconds; `processing` is keyed by job id.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Insert `record` into an ordered collection with score `due_time` (default now)
    ///
    /// Assigns an id when blank and stamps `planning_at` or `moved_at` with the
    /// score. Returns the stored record.
    async fn enqueue(
        &self,
        queue: &str,
        record: JobRecord,
        kind: CollectionKind,
        due_time: Option<i64>,
    ) -> QueueResult<JobRecord>;

    /// Atomically remove and return the earliest entry with score <= `now`
    async fn claim_due_at(&self, queue: &str, now: i64) -> QueueResult<Option<JobRecord>>;

    /// Claim against the current clock
    async fn claim_due(&self, queue: &str) -> QueueResult<Option<JobRecord>> {
        self.claim_due_at(queue, timestamp_now()).await
    }

    /// Stamp `running_at` and store the record under its id in `processing`
    async fn mark_processing(&self, queue: &str, record: JobRecord) -> QueueResult<JobRecord>;

    /// Drop the processing entry of `id`, returning whether one existed
    async fn unmark_processing(&self, queue: &str, id: &JobId) -> QueueResult<bool>;

    /// Page through a collection, highest score first (`processing` returns everything)
    async fn list(
        &self,
        queue: &str,
        kind: CollectionKind,
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<JobRecord>>;

    /// Number of entries in a collection
    async fn count(&self, queue: &str, kind: CollectionKind) -> QueueResult<u64>;

    /// Remove every entry of a collection
    async fn clear(&self, queue: &str, kind: CollectionKind) -> QueueResult<()>;

    /// Counts of all four collections
    async fn stats(&self, queue: &str) -> QueueResult<QueueStats> {
        Ok(QueueStats {
            queued: self.count(queue, CollectionKind::Queue).await?,
            processing: self.count(queue, CollectionKind::Processing).await?,
            failed: self.count(queue, CollectionKind::Failed).await?,
            success: self.count(queue, CollectionKind::Success).await?,
        })
    }
}

/// Shared enqueue preparation: returns the stamped record and its score
pub(crate) fn prepare_enqueue(
    record: JobRecord,
    kind: CollectionKind,
    due_time: Option<i64>,
) -> QueueResult<(JobRecord, i64)> {
    if !kind.is_ordered() {
        return Err(QueueError::InvalidCollection(kind));
    }
    let score = due_time.unwrap_or_else(timestamp_now);
    Ok((record.ensure_id().stamped(kind, score), score))
}

/// Shared processing preparation: rejects blank ids and stamps `running_at`
pub(crate) fn prepare_processing(record: JobRecord) -> QueueResult<JobRecord> {
    if record.id.is_blank() {
        return Err(QueueError::MissingJobId);
    }
    Ok(record.stamped(CollectionKind::Processing, timestamp_now()))
}
