use thiserror::Error;

use crate::types::CollectionKind;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Job id can't be blank")]
    MissingJobId,

    #[error("Operation is not supported on the {0} collection")]
    InvalidCollection(CollectionKind),

    #[error("Job type already registered: {0}")]
    DuplicateJobType(String),

    #[error("Job type not registered: {0}")]
    JobTypeNotRegistered(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Job execution failed: {0}")]
    JobFailed(#[from] JobError),

    #[error("Worker shutdown")]
    WorkerShutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Job execution outcome. Every variant is routed through the retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The job reported a failure from `setup`, `perform` or `completed`
    #[error("{0}")]
    Failed(String),

    /// The stored payload could not be decoded into the job's arguments
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The job task panicked or was torn down before finishing
    #[error("Fatal error: {0}")]
    Panicked(String),
}

impl JobError {
    /// Create a plain failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Get the error message without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Failed(msg) | Self::InvalidPayload(msg) | Self::Panicked(msg) => msg,
        }
    }

    /// Check if this error came from a crashed job task
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}
