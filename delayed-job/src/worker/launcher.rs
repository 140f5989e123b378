use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::{QueueError, QueueResult};

/// A reserved execution slot, released when dropped
#[derive(Debug)]
pub struct Slot(OwnedSemaphorePermit);

/// Bounded task launcher: at most `capacity` spawned jobs are alive at once
#[derive(Debug, Clone)]
pub struct TaskLauncher {
    /// Execution semaphore for concurrency control
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl TaskLauncher {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Reserve a slot without waiting
    pub fn try_reserve(&self) -> Option<Slot> {
        self.permits.clone().try_acquire_owned().ok().map(Slot)
    }

    /// Wait until a slot frees up
    pub async fn reserve(&self) -> QueueResult<Slot> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map(Slot)
            .map_err(|_| QueueError::Internal("Failed to acquire execution permit".to_string()))
    }

    /// Spawn `fut` holding `slot` until it finishes
    pub fn spawn<F>(&self, slot: Slot, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let _slot = slot;
            fut.await;
        })
    }

    /// Spawn `fut` if a slot is free; hands the future back otherwise
    pub fn try_submit<F>(&self, fut: F) -> Result<JoinHandle<()>, F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.try_reserve() {
            Some(slot) => Ok(self.spawn(slot, fut)),
            None => Err(fut),
        }
    }

    /// Get available execution slots
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Number of slots currently held
    pub fn active(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
