use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::debug;

use super::{LiveMetrics, Transition};
use crate::{
    backend::BoxStream,
    types::{EventKind, JobEvent, JobRecord},
};

const EVENT_CAPACITY: usize = 10_000;

/// Event broadcaster plus live counters, shared by producers and workers
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<JobEvent>,
    metrics: Arc<LiveMetrics>,
}

impl ObservabilityLayer {
    /// Create new observability layer
    pub fn new() -> Self {
        let (event_broadcaster, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            event_broadcaster,
            metrics: Arc::new(LiveMetrics::new()),
        }
    }

    fn publish(&self, queue: &str, record: &JobRecord, kind: EventKind, transition: Transition) {
        self.metrics.record(transition, &record.class);
        let event = JobEvent::new(queue, record, kind);
        debug!("Job {} ({}) {}", record.id, record.class, event.event_name());
        // No subscribers is fine
        let _ = self.event_broadcaster.send(event);
    }

    pub fn record_job_enqueued(&self, queue: &str, record: &JobRecord) {
        let run_at = record.planning_at.unwrap_or(record.created_at);
        self.publish(queue, record, EventKind::Enqueued { run_at }, Transition::Enqueued);
    }

    pub fn record_job_started(&self, queue: &str, record: &JobRecord) {
        let kind = EventKind::Started { attempt: record.attempt };
        self.publish(queue, record, kind, Transition::Started);
    }

    pub fn record_job_completed(&self, queue: &str, record: &JobRecord) {
        self.publish(queue, record, EventKind::Completed, Transition::Completed);
    }

    /// `record` is the requeued value, already carrying the new attempt and message
    pub fn record_job_retrying(&self, queue: &str, record: &JobRecord, retry_at: i64) {
        let kind = EventKind::Retrying {
            attempt: record.attempt,
            retry_at,
            error: record.error_message.clone().unwrap_or_default(),
        };
        self.publish(queue, record, kind, Transition::Retried);
    }

    pub fn record_job_failed(&self, queue: &str, record: &JobRecord) {
        let kind = EventKind::DeadLettered {
            error: record.error_message.clone().unwrap_or_default(),
        };
        self.publish(queue, record, kind, Transition::DeadLettered);
    }

    /// Raw receiver, for callers that want to handle lag themselves
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_broadcaster.subscribe()
    }

    /// Event stream; events missed by a lagging subscriber are skipped
    pub fn events(&self) -> BoxStream<JobEvent> {
        let stream = BroadcastStream::new(self.event_broadcaster.subscribe())
            .filter_map(|event| event.ok());
        Box::pin(stream)
    }

    /// Get live metrics
    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new()
    }
}
