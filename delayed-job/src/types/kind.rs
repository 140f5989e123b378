use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four collections every queue owns in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Time-ordered set of pending jobs scored by due time
    Queue,

    /// Map of job id to the record currently executing
    Processing,

    /// Time-ordered set of dead-lettered jobs scored by moved-at
    Failed,

    /// Time-ordered set of completed jobs scored by moved-at
    Success,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 4] = [
        CollectionKind::Queue,
        CollectionKind::Processing,
        CollectionKind::Failed,
        CollectionKind::Success,
    ];

    /// Get the collection name as used in store keys
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Processing => "processing",
            Self::Failed => "failed",
            Self::Success => "success",
        }
    }

    /// Store key for this collection of `queue`, e.g. `job:default:queue`
    pub fn key(&self, queue: &str) -> String {
        format!("job:{}:{}", queue, self.name())
    }

    /// Everything except `processing` is a score-ordered set
    pub fn is_ordered(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" | "queued" => Ok(Self::Queue),
            "processing" => Ok(Self::Processing),
            "failed" => Ok(Self::Failed),
            "success" => Ok(Self::Success),
            other => Err(format!(
                "unknown collection '{other}', expected one of: queue, processing, failed, success"
            )),
        }
    }
}
