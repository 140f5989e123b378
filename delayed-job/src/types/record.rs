use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CollectionKind, JobId};
use crate::QueueResult;

/// Current unix time in whole seconds, the unit every score and stamp uses
pub fn timestamp_now() -> i64 {
    Utc::now().timestamp()
}

/// Job record - the serialized unit of work stored in every collection
///
/// Records are values: each transition goes through one of the `self`-consuming
/// builders below and the result is written to the store as a new member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier, generated when missing
    #[serde(default)]
    pub id: JobId,

    /// Registry key of the job implementation
    #[serde(default)]
    pub class: String,

    /// Retries already consumed (starts at 0)
    #[serde(default)]
    pub attempt: u32,

    /// When the job was first enqueued
    #[serde(default)]
    pub created_at: i64,

    /// When the job was last put into the queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_at: Option<i64>,

    /// When the job was moved to processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_at: Option<i64>,

    /// When the job was moved to success or failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_at: Option<i64>,

    /// Opaque payload handed to the job
    #[serde(default)]
    pub data: Value,

    /// Last failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobRecord {
    /// Create a fresh record for `class` carrying `data`
    pub fn new(class: impl Into<String>, data: Value) -> Self {
        Self {
            id: JobId::new(),
            class: class.into(),
            attempt: 0,
            created_at: timestamp_now(),
            planning_at: None,
            running_at: None,
            moved_at: None,
            data,
            error_message: None,
        }
    }

    /// Replace the id
    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    /// Assign a generated id if the current one is blank
    pub fn ensure_id(mut self) -> Self {
        if self.id.is_blank() {
            self.id = JobId::new();
        }
        self
    }

    /// Consume one retry
    pub fn next_attempt(mut self) -> Self {
        self.attempt = self.attempt.saturating_add(1);
        self
    }

    /// Record a failure description
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Stamp the timestamp field that belongs to `kind`
    pub fn stamped(mut self, kind: CollectionKind, at: i64) -> Self {
        match kind {
            CollectionKind::Queue => self.planning_at = Some(at),
            CollectionKind::Processing => self.running_at = Some(at),
            CollectionKind::Failed | CollectionKind::Success => self.moved_at = Some(at),
        }
        self
    }

    /// Encode as the JSON member stored in the backend
    pub fn to_json(&self) -> QueueResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored member
    pub fn from_json(raw: &str) -> QueueResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
