//! Jobs bundled with the worker binary, handy for trying a deployment out

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use delayed_job::{Job, JobError, QueueAdapter, QueueBackend, QueueResult};

/// Logs its payload
#[derive(Default)]
pub struct EchoJob;

#[async_trait]
impl Job for EchoJob {
    type Args = Value;
    const JOB_TYPE: &'static str = "echo";

    async fn perform(&mut self, args: Value) -> Result<(), JobError> {
        info!("echo: {}", args);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SleepArgs {
    /// How long to sleep
    #[serde(default)]
    pub ms: u64,

    /// Fail after sleeping
    #[serde(default)]
    pub fail: bool,
}

/// Sleeps, then optionally fails
#[derive(Default)]
pub struct SleepJob;

#[async_trait]
impl Job for SleepJob {
    type Args = SleepArgs;
    const JOB_TYPE: &'static str = "sleep";
    const MAX_ATTEMPTS: u32 = 3;

    async fn perform(&mut self, args: SleepArgs) -> Result<(), JobError> {
        tokio::time::sleep(Duration::from_millis(args.ms)).await;
        if args.fail {
            return Err(JobError::failed(format!("sleep job asked to fail after {}ms", args.ms)));
        }
        Ok(())
    }
}

pub async fn register_demo_jobs<B: QueueBackend + 'static>(adapter: &QueueAdapter<B>) -> QueueResult<()> {
    adapter.register_job::<EchoJob>().await?;
    adapter.register_job::<SleepJob>().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use delayed_job::MemoryBackend;
    use serde_json::json;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn echo_logs_payload() {
        EchoJob.now(json!({"hello": "world"})).await.unwrap();
        assert!(logs_contain("echo: {\"hello\":\"world\"}"));
    }

    #[tokio::test]
    async fn sleep_job_fails_on_request() {
        let err = SleepJob.now(SleepArgs { ms: 1, fail: true }).await.unwrap_err();
        assert_eq!(err.message(), "sleep job asked to fail after 1ms");
        SleepJob.now(SleepArgs { ms: 1, fail: false }).await.unwrap();
    }

    #[tokio::test]
    async fn demo_jobs_register_once() {
        let adapter = QueueAdapter::new(MemoryBackend::new());
        register_demo_jobs(&adapter).await.unwrap();
        assert_eq!(adapter.registered_types().await, vec!["echo", "sleep"]);
        assert!(register_demo_jobs(&adapter).await.is_err());
    }
}
