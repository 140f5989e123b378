use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobRecord};

/// What happened to the job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// Put into the queue collection, due at `run_at`
    Enqueued { run_at: i64 },
    /// Claimed and handed to the executor
    Started { attempt: u32 },
    /// Failed and put back with a later due time
    Retrying { attempt: u32, retry_at: i64, error: String },
    Completed,
    /// Moved to the failed collection for good
    DeadLettered { error: String },
}

/// One lifecycle event of one job, as broadcast by the observability layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub queue: String,
    pub class: String,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl JobEvent {
    pub fn new(queue: &str, record: &JobRecord, kind: EventKind) -> Self {
        Self {
            job_id: record.id.clone(),
            queue: queue.to_string(),
            class: record.class.clone(),
            at: Utc::now(),
            kind,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self.kind {
            EventKind::Enqueued { .. } => "enqueued",
            EventKind::Started { .. } => "started",
            EventKind::Retrying { .. } => "retrying",
            EventKind::Completed => "completed",
            EventKind::DeadLettered { .. } => "dead_lettered",
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// True once the run is over, whatever the result
    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, EventKind::Enqueued { .. } | EventKind::Started { .. })
    }
}
