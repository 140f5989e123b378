//! # delayed-job: persistent delayed job queue
//!
//! Producers put jobs into a named queue with a due time; workers claim due
//! jobs, run them under a concurrency ceiling, and route the outcome.
//!
//! - **Time-ordered storage**: every queue owns `queue`, `processing`, `failed`
//!   and `success` collections (`job:<queue>:<collection>` in Redis)
//! - **Atomic claims**: the earliest due job is removed in one step, so two
//!   workers never run the same record
//! - **Retry with backoff**: a failed job comes back after `ceil(attempt^1.5)`
//!   seconds until `MAX_ATTEMPTS` is reached, then lands in `failed`
//! - **Graceful shutdown**: cancelling the worker stops claiming and waits for
//!   running jobs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use delayed_job::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Welcome {
//!     email: String,
//! }
//!
//! #[derive(Default)]
//! struct WelcomeMail;
//!
//! #[async_trait]
//! impl Job for WelcomeMail {
//!     type Args = Welcome;
//!     const JOB_TYPE: &'static str = "welcome_mail";
//!     const MAX_ATTEMPTS: u32 = 5;
//!
//!     async fn perform(&mut self, args: Welcome) -> Result<(), JobError> {
//!         println!("sending to {}", args.email);
//!         Ok(())
//!     }
//! }
//!
//! # #[cfg(feature = "memory")]
//! # async fn run() -> QueueResult<()> {
//! let adapter = QueueAdapter::new(MemoryBackend::new());
//! adapter.register_job::<WelcomeMail>().await?;
//! adapter.later::<WelcomeMail>(&Welcome { email: "a@b.c".into() }, None).await?;
//!
//! let worker = adapter.start_worker()?;
//! worker.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backend;
pub mod config;
pub mod error;
pub mod job;
pub mod observability;
pub mod retry;
pub mod types;
pub mod worker;

pub use adapter::{QueueAdapter, WorkerHandle};
pub use backend::{QueueBackend, QueueStats};
#[cfg(feature = "memory")]
pub use backend::memory::MemoryBackend;
pub use config::{WorkerConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_QUEUE};
pub use error::{JobError, QueueError, QueueResult};
pub use job::{later, later_on, Job, JobHandler, JobRegistry};
pub use observability::{Counts, LiveMetrics, MetricsSnapshot, ObservabilityLayer, Transition};
pub use retry::RetryPolicy;
pub use types::{timestamp_now, CollectionKind, EventKind, JobEvent, JobId, JobRecord};
pub use worker::{ExecutionOutcome, TickOutcome, WorkerState};

#[cfg(feature = "redis")]
pub use backend::redis::RedisBackend;

/// Everything a producer or job author usually needs
pub mod prelude {
    pub use crate::{
        CollectionKind, Job, JobError, JobId, JobRecord, QueueAdapter, QueueBackend, QueueError,
        QueueResult, WorkerConfig, WorkerHandle,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryBackend;

    #[cfg(feature = "redis")]
    pub use crate::RedisBackend;

    pub use async_trait::async_trait;
}
