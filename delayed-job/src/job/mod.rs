pub mod registry;

pub use registry::{JobHandler, JobRegistry};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    backend::QueueBackend,
    config::DEFAULT_QUEUE,
    types::{CollectionKind, JobRecord},
    JobError, QueueResult,
};

/// Trait for defining jobs that can be processed by the queue
///
/// A fresh value is built for every run (see [`JobRegistry::register`]), so the
/// hooks may keep per-run state on `self`.
#[async_trait]
pub trait Job: Send + 'static {
    /// Payload stored in the record's `data` field
    type Args: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Job type identifier, stored as the record's `class`
    const JOB_TYPE: &'static str;

    /// Queue the job is put into by [`later`]
    const QUEUE: &'static str = DEFAULT_QUEUE;

    /// Attempt limit, 0 retries forever
    const MAX_ATTEMPTS: u32 = 0;

    /// Runs before `perform`
    async fn setup(&mut self) -> Result<(), JobError> {
        Ok(())
    }

    /// The job body
    async fn perform(&mut self, args: Self::Args) -> Result<(), JobError>;

    /// Runs after a successful `perform`
    async fn completed(&mut self) -> Result<(), JobError> {
        Ok(())
    }

    /// Run the job inline: setup, perform, completed
    async fn now(mut self, args: Self::Args) -> Result<(), JobError>
    where
        Self: Sized,
    {
        self.setup().await?;
        self.perform(args).await?;
        self.completed().await
    }
}

/// Enqueue a `J` into `J::QUEUE`, due at `run_at` (default now)
pub async fn later<J: Job>(
    backend: &dyn QueueBackend,
    args: &J::Args,
    run_at: Option<DateTime<Utc>>,
) -> QueueResult<JobRecord> {
    later_on::<J>(backend, J::QUEUE, args, run_at).await
}

/// Enqueue a `J` into an explicit queue
pub async fn later_on<J: Job>(
    backend: &dyn QueueBackend,
    queue: &str,
    args: &J::Args,
    run_at: Option<DateTime<Utc>>,
) -> QueueResult<JobRecord> {
    let record = JobRecord::new(J::JOB_TYPE, serde_json::to_value(args)?);
    backend
        .enqueue(queue, record, CollectionKind::Queue, run_at.map(|at| at.timestamp()))
        .await
}
