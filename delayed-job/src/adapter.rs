use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::{
    backend::{QueueBackend, QueueStats},
    config::WorkerConfig,
    job::{self, JobRegistry},
    observability::ObservabilityLayer,
    types::{CollectionKind, JobRecord},
    worker::{Executor, Lifecycle, LoopTiming, Scheduler, WorkerState},
    Job, JobError, QueueError, QueueResult,
};

/// Handle for managing worker lifecycle
pub struct WorkerHandle {
    cancel: CancellationToken,
    join_handle: JoinHandle<QueueResult<()>>,
    state: watch::Receiver<WorkerState>,
    scheduler: Arc<Scheduler>,
}

impl WorkerHandle {
    /// Stop claiming, wait for running jobs, and join the worker task
    pub async fn shutdown(self) -> QueueResult<()> {
        self.cancel.cancel();
        self.join_handle
            .await
            .map_err(|e| QueueError::Internal(format!("Worker join error: {}", e)))?
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn state_changes(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    /// Token that stops the worker when cancelled, e.g. from a signal handler
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of jobs executing right now
    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight_len()
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }
}

/// Queue façade: owns the store, the job registry and the worker settings
pub struct QueueAdapter<B: QueueBackend + 'static> {
    backend: Arc<B>,
    job_registry: Arc<RwLock<JobRegistry>>,
    observability: Arc<ObservabilityLayer>,
    config: WorkerConfig,
}

impl<B: QueueBackend + 'static> QueueAdapter<B> {
    /// Create a new queue adapter
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, WorkerConfig::default())
    }

    /// Create adapter with custom configuration
    pub fn with_config(backend: B, config: WorkerConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            job_registry: Arc::new(RwLock::new(JobRegistry::new())),
            observability: Arc::new(ObservabilityLayer::new()),
            config,
        }
    }

    /// Create adapter with observability layer
    pub fn with_observability(mut self, observability: ObservabilityLayer) -> Self {
        self.observability = Arc::new(observability);
        self
    }

    /// Register a job type built with `Default` for every run
    pub async fn register_job<J: Job + Default>(&self) -> QueueResult<()> {
        let mut registry = self.job_registry.write().await;
        registry.register_default::<J>()?;
        info!("Registered job type: {}", J::JOB_TYPE);
        Ok(())
    }

    /// Register a job type built by `factory` for every run
    pub async fn register_job_with<J, F>(&self, factory: F) -> QueueResult<()>
    where
        J: Job,
        F: Fn() -> J + Send + Sync + 'static,
    {
        let mut registry = self.job_registry.write().await;
        registry.register::<J, F>(factory)?;
        info!("Registered job type: {}", J::JOB_TYPE);
        Ok(())
    }

    /// Enqueue a job into `J::QUEUE`, due at `run_at` (default now)
    #[instrument(skip(self, args), fields(job_type = J::JOB_TYPE, queue = J::QUEUE))]
    pub async fn later<J: Job>(&self, args: &J::Args, run_at: Option<DateTime<Utc>>) -> QueueResult<JobRecord> {
        self.later_on::<J>(J::QUEUE, args, run_at).await
    }

    /// Enqueue a job into an explicit queue
    #[instrument(skip(self, args), fields(job_type = J::JOB_TYPE))]
    pub async fn later_on<J: Job>(
        &self,
        queue: &str,
        args: &J::Args,
        run_at: Option<DateTime<Utc>>,
    ) -> QueueResult<JobRecord> {
        let record = job::later_on::<J>(self.backend.as_ref(), queue, args, run_at).await?;
        self.observability.record_job_enqueued(queue, &record);
        info!("Enqueued job {} of type {}", record.id, J::JOB_TYPE);
        Ok(record)
    }

    /// Enqueue a raw record for `class`; the class doesn't need to be registered here
    #[instrument(skip(self, data))]
    pub async fn enqueue_class(
        &self,
        queue: &str,
        class: &str,
        data: Value,
        run_at: Option<i64>,
    ) -> QueueResult<JobRecord> {
        let record = self
            .backend
            .enqueue(queue, JobRecord::new(class, data), CollectionKind::Queue, run_at)
            .await?;
        self.observability.record_job_enqueued(queue, &record);
        info!("Enqueued job {} of type {}", record.id, class);
        Ok(record)
    }

    /// Execute job immediately (bypasses durable storage)
    #[instrument(skip(self, job, args), fields(job_type = J::JOB_TYPE))]
    pub async fn execute_now<J: Job>(&self, job: J, args: J::Args) -> Result<(), JobError> {
        info!("Executing job immediately: {}", J::JOB_TYPE);
        job.now(args).await
    }

    /// Page through a collection of `queue`, newest first
    pub async fn list(
        &self,
        queue: &str,
        kind: CollectionKind,
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<JobRecord>> {
        self.backend.list(queue, kind, offset, limit).await
    }

    pub async fn count(&self, queue: &str, kind: CollectionKind) -> QueueResult<u64> {
        self.backend.count(queue, kind).await
    }

    pub async fn clear(&self, queue: &str, kind: CollectionKind) -> QueueResult<()> {
        self.backend.clear(queue, kind).await?;
        info!("Cleared {} collection of queue {}", kind, queue);
        Ok(())
    }

    pub async fn stats(&self, queue: &str) -> QueueResult<QueueStats> {
        self.backend.stats(queue).await
    }

    /// Executor bound to the configured queue
    pub fn executor(&self) -> Arc<Executor> {
        Arc::new(Executor::new(
            self.config.queue.clone(),
            self.backend.clone() as Arc<dyn QueueBackend>,
            self.job_registry.clone(),
            self.observability.clone(),
            self.config.save_success,
        ))
    }

    /// Scheduler for the configured queue, driven by the caller instead of a worker task
    pub fn scheduler(&self) -> QueueResult<Scheduler> {
        self.config.validate()?;
        Ok(Scheduler::new(
            self.config.max_concurrency,
            self.backend.clone() as Arc<dyn QueueBackend>,
            self.executor(),
            CancellationToken::new(),
        ))
    }

    /// Start a worker consuming the configured queue
    #[instrument(skip(self), fields(queue = %self.config.queue))]
    pub fn start_worker(&self) -> QueueResult<WorkerHandle> {
        let scheduler = Arc::new(self.scheduler()?);
        let cancel = scheduler.cancel_token().clone();
        let (lifecycle, state) = Lifecycle::new(scheduler.clone(), LoopTiming::from(&self.config));

        let join_handle = tokio::spawn(lifecycle.run());

        info!("Started worker for queue: {}", self.config.queue);

        Ok(WorkerHandle {
            cancel,
            join_handle,
            state,
            scheduler,
        })
    }

    /// Get backend reference
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get observability layer
    pub fn observability(&self) -> &ObservabilityLayer {
        &self.observability
    }

    /// Get configuration
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Get all registered job types, sorted
    pub async fn registered_types(&self) -> Vec<String> {
        self.job_registry.read().await.registered_types()
    }
}

impl<B: QueueBackend + 'static> Clone for QueueAdapter<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            job_registry: self.job_registry.clone(),
            observability: self.observability.clone(),
            config: self.config.clone(),
        }
    }
}
