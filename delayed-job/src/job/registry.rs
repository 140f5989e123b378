use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use async_trait::async_trait;
use serde_json::Value;

use crate::{Job, JobError, QueueError, QueueResult};

/// Type-erased job handler for runtime dispatch
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Get the job type this handler processes
    fn job_type(&self) -> &'static str;

    /// Attempt limit of the job type, 0 retries forever
    fn max_attempts(&self) -> u32;

    /// Decode `data` and run a fresh job instance inline
    async fn run(&self, data: Value) -> Result<(), JobError>;
}

/// Handler that builds each job with a constructor closure
struct FactoryHandler<J, F> {
    factory: F,
    _phantom: PhantomData<fn() -> J>,
}

impl<J, F> FactoryHandler<J, F> {
    fn new(factory: F) -> Self {
        Self {
            factory,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<J, F> JobHandler for FactoryHandler<J, F>
where
    J: Job,
    F: Fn() -> J + Send + Sync + 'static,
{
    fn job_type(&self) -> &'static str {
        J::JOB_TYPE
    }

    fn max_attempts(&self) -> u32 {
        J::MAX_ATTEMPTS
    }

    async fn run(&self, data: Value) -> Result<(), JobError> {
        let args: J::Args = serde_json::from_value(data)
            .map_err(|e| JobError::InvalidPayload(e.to_string()))?;

        let job = (self.factory)();
        job.now(args).await
    }
}

/// Registry for managing job types and their handlers
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    /// Create a new job registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job type built by `factory` for every run
    pub fn register<J, F>(&mut self, factory: F) -> QueueResult<()>
    where
        J: Job,
        F: Fn() -> J + Send + Sync + 'static,
    {
        if self.handlers.contains_key(J::JOB_TYPE) {
            return Err(QueueError::DuplicateJobType(J::JOB_TYPE.to_string()));
        }

        self.handlers
            .insert(J::JOB_TYPE.to_string(), Arc::new(FactoryHandler::new(factory)));
        Ok(())
    }

    /// Register a job type constructed with `Default`
    pub fn register_default<J: Job + Default>(&mut self) -> QueueResult<()> {
        self.register::<J, _>(J::default)
    }

    /// Look up the handler for a record's class
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// Check if a job type is registered
    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Get all registered job types, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
