use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, error, info, warn};

use crate::{
    backend::QueueBackend,
    job::{JobHandler, JobRegistry},
    observability::ObservabilityLayer,
    retry::{RetryPolicy, Route},
    types::{timestamp_now, CollectionKind, JobRecord},
    JobError,
};

/// What happened to a claimed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The job succeeded
    Completed,
    /// The job failed and was put back, due at `run_at`
    Retrying { run_at: i64 },
    /// The job failed for the last time and went to `failed`
    DeadLettered,
    /// No job type is registered for the record's class
    Rejected,
    /// The result was routed by someone else, i.e. a shutdown that stopped waiting
    Abandoned,
}

/// Error text for jobs still running when a shutdown gives up on them
pub const SHUTDOWN_ABANDON_MESSAGE: &str = "worker shut down while job was running";

/// Decides once who routes the result of a run: the executor or a shutdown
#[derive(Debug, Default)]
pub struct Settlement(AtomicBool);

impl Settlement {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for the first caller only
    pub fn take(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_taken(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Runs one claimed record and routes the result back into the store
pub struct Executor {
    queue: String,
    backend: Arc<dyn QueueBackend>,
    registry: Arc<RwLock<JobRegistry>>,
    observability: Arc<ObservabilityLayer>,
    save_success: bool,
}

impl Executor {
    pub fn new(
        queue: impl Into<String>,
        backend: Arc<dyn QueueBackend>,
        registry: Arc<RwLock<JobRegistry>>,
        observability: Arc<ObservabilityLayer>,
        save_success: bool,
    ) -> Self {
        Self {
            queue: queue.into(),
            backend,
            registry,
            observability,
            save_success,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Execute `record` to completion. Store failures are logged, never returned.
    pub async fn execute(&self, record: JobRecord) -> ExecutionOutcome {
        self.execute_settled(record, &Settlement::new()).await
    }

    /// Like [`Executor::execute`], but routes nothing once `settlement` was taken elsewhere
    pub async fn execute_settled(&self, record: JobRecord, settlement: &Settlement) -> ExecutionOutcome {
        info!(
            "Starting work on ({} | {} | {}, attempt: {} | {})",
            self.queue, record.id, record.class, record.attempt, record.data
        );
        self.observability.record_job_started(&self.queue, &record);

        let handler = self.registry.read().await.get(&record.class);
        let Some(handler) = handler else {
            if !settlement.take() {
                return ExecutionOutcome::Abandoned;
            }
            return self.reject(record).await;
        };

        let id = record.id.clone();
        let running = match self.backend.mark_processing(&self.queue, record.clone()).await {
            Ok(running) => running,
            Err(e) => {
                error!("Job {} could not be marked as processing: {}", id, e);
                record
            }
        };

        let outcome = if settlement.is_taken() {
            ExecutionOutcome::Abandoned
        } else {
            let result = run_contained(handler.clone(), running.data.clone()).await;
            if !settlement.take() {
                ExecutionOutcome::Abandoned
            } else {
                match result {
                    Ok(()) => self.complete(running).await,
                    Err(err) => self.retry_or_fail(running, &err, handler.max_attempts()).await,
                }
            }
        };

        if outcome == ExecutionOutcome::Abandoned {
            debug!("Job {} was settled by the worker shutdown", id);
        }
        if let Err(e) = self.backend.unmark_processing(&self.queue, &id).await {
            error!("Job {} could not be removed from processing: {}", id, e);
        }

        outcome
    }

    /// Route a record whose run was cut off by shutdown, as a fatal failure
    pub async fn abandon(&self, record: JobRecord) -> ExecutionOutcome {
        let max_attempts = self
            .registry
            .read()
            .await
            .get(&record.class)
            .map(|handler| handler.max_attempts())
            .unwrap_or(1);

        let id = record.id.clone();
        let err = JobError::Panicked(SHUTDOWN_ABANDON_MESSAGE.to_string());
        let outcome = self.retry_or_fail(record, &err, max_attempts).await;

        if let Err(e) = self.backend.unmark_processing(&self.queue, &id).await {
            error!("Job {} could not be removed from processing: {}", id, e);
        }
        outcome
    }

    async fn reject(&self, record: JobRecord) -> ExecutionOutcome {
        let message = format!("Job class \"{}\" is not registered", record.class);
        let record = record.with_error(message);
        error!(
            "Job {} error: {} ({} | attempt: {} | {})",
            record.id,
            record.error_message.as_deref().unwrap_or_default(),
            self.queue,
            record.attempt,
            record.data
        );

        match self
            .backend
            .enqueue(&self.queue, record, CollectionKind::Failed, None)
            .await
        {
            Ok(stored) => self.observability.record_job_failed(&self.queue, &stored),
            Err(e) => error!("Failed to move job to failed: {}", e),
        }
        ExecutionOutcome::Rejected
    }

    async fn complete(&self, record: JobRecord) -> ExecutionOutcome {
        info!("Job {} completed successfully", record.id);

        if self.save_success {
            let id = record.id.clone();
            if let Err(e) = self
                .backend
                .enqueue(&self.queue, record.clone(), CollectionKind::Success, None)
                .await
            {
                error!("Job {} could not be saved to success: {}", id, e);
            }
        }

        self.observability.record_job_completed(&self.queue, &record);
        ExecutionOutcome::Completed
    }

    async fn retry_or_fail(&self, record: JobRecord, err: &JobError, max_attempts: u32) -> ExecutionOutcome {
        let outcome = RetryPolicy::new(max_attempts).apply(record, &err.to_string(), timestamp_now());
        let record = outcome.record;

        error!(
            "Job {} error: {} ({} | {} | attempt: {} | {})",
            record.id,
            record.error_message.as_deref().unwrap_or_default(),
            self.queue,
            record.class,
            record.attempt,
            record.data
        );

        match outcome.route {
            Route::Requeue { run_at } => {
                match self
                    .backend
                    .enqueue(&self.queue, record.clone(), CollectionKind::Queue, Some(run_at))
                    .await
                {
                    Ok(stored) => self.observability.record_job_retrying(&self.queue, &stored, run_at),
                    Err(e) => error!("Job {} could not be requeued: {}", record.id, e),
                }
                ExecutionOutcome::Retrying { run_at }
            }
            Route::DeadLetter => {
                match self
                    .backend
                    .enqueue(&self.queue, record.clone(), CollectionKind::Failed, None)
                    .await
                {
                    Ok(stored) => self.observability.record_job_failed(&self.queue, &stored),
                    Err(e) => error!("Job {} could not be moved to failed: {}", record.id, e),
                }
                ExecutionOutcome::DeadLettered
            }
        }
    }
}

/// Aborts the handler task when the executing future is dropped
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run the handler on its own task so a panic ends up as a job error
async fn run_contained(handler: Arc<dyn JobHandler>, data: Value) -> Result<(), JobError> {
    let task = tokio::spawn(async move { handler.run(data).await });
    let _abort = AbortOnDrop(task.abort_handle());
    match task.await {
        Ok(result) => result,
        Err(join_err) => {
            warn!("Job task crashed: {}", join_err);
            Err(JobError::Panicked(panic_message(join_err)))
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "job task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::{backend::memory::MemoryBackend, Job};
    use async_trait::async_trait;
    use serde_json::json;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct OkJob;

    #[async_trait]
    impl Job for OkJob {
        type Args = Value;
        const JOB_TYPE: &'static str = "ok_job";

        async fn perform(&mut self, _args: Value) -> Result<(), JobError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FailingJob;

    #[async_trait]
    impl Job for FailingJob {
        type Args = Value;
        const JOB_TYPE: &'static str = "failing_job";
        const MAX_ATTEMPTS: u32 = 2;

        async fn perform(&mut self, _args: Value) -> Result<(), JobError> {
            Err(JobError::failed("Job failed to execute"))
        }
    }

    #[derive(Default)]
    struct PanickingJob;

    #[async_trait]
    impl Job for PanickingJob {
        type Args = Value;
        const JOB_TYPE: &'static str = "panicking_job";
        const MAX_ATTEMPTS: u32 = 1;

        async fn perform(&mut self, _args: Value) -> Result<(), JobError> {
            panic!("boom");
        }
    }

    fn create_test_executor(save_success: bool) -> (MemoryBackend, Executor) {
        let backend = MemoryBackend::new();
        let mut registry = JobRegistry::new();
        registry.register_default::<OkJob>().unwrap();
        registry.register_default::<FailingJob>().unwrap();
        registry.register_default::<PanickingJob>().unwrap();

        let executor = Executor::new(
            "default",
            Arc::new(backend.clone()),
            Arc::new(RwLock::new(registry)),
            Arc::new(ObservabilityLayer::new()),
            save_success,
        );
        (backend, executor)
    }

    async fn count(backend: &MemoryBackend, kind: CollectionKind) -> u64 {
        backend.count("default", kind).await.unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn test_success_clears_processing() {
        let (backend, executor) = create_test_executor(false);
        let outcome = executor.execute(JobRecord::new("ok_job", json!({"n": 1}))).await;

        assert_eq!(outcome, ExecutionOutcome::Completed);
        assert_eq!(count(&backend, CollectionKind::Processing).await, 0);
        assert_eq!(count(&backend, CollectionKind::Success).await, 0);
        assert!(logs_contain("Starting work on (default |"));
        assert!(logs_contain("completed successfully"));
    }

    #[tokio::test]
    async fn test_success_is_saved_when_enabled() {
        let (backend, executor) = create_test_executor(true);
        let record = JobRecord::new("ok_job", json!({}));
        executor.execute(record.clone()).await;

        let saved = backend.list("default", CollectionKind::Success, 0, 20).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, record.id);
        assert!(saved[0].running_at.is_some());
        assert!(saved[0].moved_at.is_some());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failure_within_limit_is_requeued() {
        let (backend, executor) = create_test_executor(false);
        let before = timestamp_now();
        let outcome = executor.execute(JobRecord::new("failing_job", json!({}))).await;

        let ExecutionOutcome::Retrying { run_at } = outcome else {
            panic!("expected retry, got {:?}", outcome);
        };
        assert!(run_at >= before + 1);

        let queued = backend.list("default", CollectionKind::Queue, 0, 20).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].attempt, 1);
        assert_eq!(queued[0].planning_at, Some(run_at));
        let message = queued[0].error_message.as_deref().unwrap();
        assert!(message.starts_with("Job failed to execute, retry run at "));
        assert_eq!(count(&backend, CollectionKind::Processing).await, 0);
        assert!(logs_contain("retry run at"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failure_at_limit_is_dead_lettered() {
        let (backend, executor) = create_test_executor(false);
        let record = JobRecord::new("failing_job", json!({})).next_attempt();
        let outcome = executor.execute(record).await;

        assert_eq!(outcome, ExecutionOutcome::DeadLettered);
        let failed = backend.list("default", CollectionKind::Failed, 0, 20).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempt, 2);
        assert_eq!(
            failed[0].error_message.as_deref(),
            Some("Job failed to execute, attempts have ended")
        );
        assert_eq!(count(&backend, CollectionKind::Queue).await, 0);
        assert!(logs_contain("attempts have ended"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_class_is_rejected() {
        let (backend, executor) = create_test_executor(false);
        let outcome = executor.execute(JobRecord::new("missing_job", json!({}))).await;

        assert_eq!(outcome, ExecutionOutcome::Rejected);
        let failed = backend.list("default", CollectionKind::Failed, 0, 20).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempt, 0);
        assert_eq!(
            failed[0].error_message.as_deref(),
            Some("Job class \"missing_job\" is not registered")
        );
        assert_eq!(count(&backend, CollectionKind::Queue).await, 0);
        assert!(logs_contain("is not registered"));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let (backend, executor) = create_test_executor(false);
        let outcome = executor.execute(JobRecord::new("panicking_job", json!({}))).await;

        assert_eq!(outcome, ExecutionOutcome::DeadLettered);
        let failed = backend.list("default", CollectionKind::Failed, 0, 20).await.unwrap();
        assert_eq!(
            failed[0].error_message.as_deref(),
            Some("Fatal error: boom, attempts have ended")
        );
        assert_eq!(count(&backend, CollectionKind::Processing).await, 0);
    }

    #[tokio::test]
    async fn test_taken_settlement_routes_nothing() {
        let (backend, executor) = create_test_executor(true);
        let settlement = Settlement::new();
        assert!(settlement.take());

        let outcome = executor
            .execute_settled(JobRecord::new("failing_job", json!({})), &settlement)
            .await;

        assert_eq!(outcome, ExecutionOutcome::Abandoned);
        for kind in CollectionKind::ALL {
            assert_eq!(count(&backend, kind).await, 0);
        }
    }

    #[tokio::test]
    async fn test_abandoned_job_follows_retry_policy() {
        let (backend, executor) = create_test_executor(false);
        let record = JobRecord::new("failing_job", json!({}));
        backend.mark_processing("default", record.clone()).await.unwrap();

        let outcome = executor.abandon(record).await;
        assert!(matches!(outcome, ExecutionOutcome::Retrying { .. }));
        let queued = backend.list("default", CollectionKind::Queue, 0, 20).await.unwrap();
        assert_eq!(queued[0].attempt, 1);
        assert!(queued[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Fatal error: worker shut down while job was running, retry run at "));
        assert_eq!(count(&backend, CollectionKind::Processing).await, 0);

        let last_try = JobRecord::new("panicking_job", json!({}));
        assert_eq!(executor.abandon(last_try).await, ExecutionOutcome::DeadLettered);
        let failed = backend.list("default", CollectionKind::Failed, 0, 20).await.unwrap();
        assert_eq!(
            failed[0].error_message.as_deref(),
            Some("Fatal error: worker shut down while job was running, attempts have ended")
        );
    }

    #[test]
    fn test_settlement_is_taken_once() {
        let settlement = Settlement::new();
        assert!(!settlement.is_taken());
        assert!(settlement.take());
        assert!(!settlement.take());
        assert!(settlement.is_taken());
    }

    #[derive(serde::Deserialize, serde::Serialize)]
    struct TypedArgs {
        count: u32,
    }

    #[derive(Default)]
    struct TypedJob;

    #[async_trait]
    impl Job for TypedJob {
        type Args = TypedArgs;
        const JOB_TYPE: &'static str = "typed_job";

        async fn perform(&mut self, _args: TypedArgs) -> Result<(), JobError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_invalid_payload_is_retried() {
        let (backend, executor) = create_test_executor(false);
        executor.registry.write().await.register_default::<TypedJob>().unwrap();

        let outcome = executor.execute(JobRecord::new("typed_job", json!("not an object"))).await;
        assert!(matches!(outcome, ExecutionOutcome::Retrying { .. }));
        let queued = backend.list("default", CollectionKind::Queue, 0, 20).await.unwrap();
        assert!(queued[0].error_message.as_deref().unwrap().starts_with("Invalid payload: "));
    }
}
