use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    backend::{prepare_enqueue, prepare_processing, QueueBackend},
    types::{CollectionKind, JobId, JobRecord},
    QueueError, QueueResult,
};

/// Score-ordered set of JSON members, mirroring a Redis sorted set
#[derive(Debug, Default, Clone)]
pub(crate) struct SortedSet {
    by_member: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    /// Insert or re-score `member`
    fn insert(&mut self, member: String, score: i64) {
        if let Some(old) = self.by_member.insert(member.clone(), score) {
            self.ordered.remove(&(old, member.clone()));
        }
        self.ordered.insert((score, member));
    }

    /// Remove and return the lowest-scored member with score <= `max`
    fn pop_due(&mut self, max: i64) -> Option<String> {
        let first = self.ordered.first()?;
        if first.0 > max {
            return None;
        }
        let (_, member) = self.ordered.pop_first()?;
        self.by_member.remove(&member);
        Some(member)
    }

    /// Members from highest to lowest score
    fn rev_range(&self, offset: usize, limit: usize) -> Vec<String> {
        self.ordered
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .map(|(_, member)| member.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.ordered.len()
    }
}

type SortedSets = HashMap<String, SortedSet>;
type ProcessingMaps = HashMap<String, HashMap<JobId, String>>;

/// In-memory backend for testing and development
///
/// Collections are keyed with `CollectionKind::key`, exactly like the Redis store.
pub struct MemoryBackend {
    /// Ordered collections: queue, failed and success
    pub(crate) sets: Arc<RwLock<SortedSets>>,

    /// Processing maps: job id -> JSON record
    pub(crate) processing: Arc<RwLock<ProcessingMaps>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            sets: Arc::new(RwLock::new(HashMap::new())),
            processing: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a raw member, bypassing record encoding
    pub fn insert_raw(&self, queue: &str, kind: CollectionKind, member: String, score: i64) -> QueueResult<()> {
        if !kind.is_ordered() {
            return Err(QueueError::InvalidCollection(kind));
        }
        self.sets
            .write()
            .entry(kind.key(queue))
            .or_default()
            .insert(member, score);
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryBackend {
    fn clone(&self) -> Self {
        Self {
            sets: self.sets.clone(),
            processing: self.processing.clone(),
        }
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn enqueue(
        &self,
        queue: &str,
        record: JobRecord,
        kind: CollectionKind,
        due_time: Option<i64>,
    ) -> QueueResult<JobRecord> {
        let (record, score) = prepare_enqueue(record, kind, due_time)?;
        let member = record.to_json()?;

        self.sets
            .write()
            .entry(kind.key(queue))
            .or_default()
            .insert(member, score);

        Ok(record)
    }

    async fn claim_due_at(&self, queue: &str, now: i64) -> QueueResult<Option<JobRecord>> {
        // Read and remove under one write lock so two claimers never get the same member
        let member = {
            let mut sets = self.sets.write();
            match sets.get_mut(&CollectionKind::Queue.key(queue)) {
                Some(set) => set.pop_due(now),
                None => None,
            }
        };

        match member {
            Some(raw) => JobRecord::from_json(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn mark_processing(&self, queue: &str, record: JobRecord) -> QueueResult<JobRecord> {
        let record = prepare_processing(record)?;
        let value = record.to_json()?;

        self.processing
            .write()
            .entry(CollectionKind::Processing.key(queue))
            .or_default()
            .insert(record.id.clone(), value);

        Ok(record)
    }

    async fn unmark_processing(&self, queue: &str, id: &JobId) -> QueueResult<bool> {
        let mut processing = self.processing.write();
        let removed = processing
            .get_mut(&CollectionKind::Processing.key(queue))
            .map(|entries| entries.remove(id).is_some())
            .unwrap_or(false);
        Ok(removed)
    }

    async fn list(
        &self,
        queue: &str,
        kind: CollectionKind,
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<JobRecord>> {
        let raw: Vec<String> = match kind {
            CollectionKind::Processing => self
                .processing
                .read()
                .get(&kind.key(queue))
                .map(|entries| entries.values().cloned().collect())
                .unwrap_or_default(),
            _ => self
                .sets
                .read()
                .get(&kind.key(queue))
                .map(|set| set.rev_range(offset, limit))
                .unwrap_or_default(),
        };

        raw.iter().map(|member| JobRecord::from_json(member)).collect()
    }

    async fn count(&self, queue: &str, kind: CollectionKind) -> QueueResult<u64> {
        let len = match kind {
            CollectionKind::Processing => self
                .processing
                .read()
                .get(&kind.key(queue))
                .map(|entries| entries.len())
                .unwrap_or(0),
            _ => self
                .sets
                .read()
                .get(&kind.key(queue))
                .map(|set| set.len())
                .unwrap_or(0),
        };
        Ok(len as u64)
    }

    async fn clear(&self, queue: &str, kind: CollectionKind) -> QueueResult<()> {
        match kind {
            CollectionKind::Processing => {
                self.processing.write().remove(&kind.key(queue));
            }
            _ => {
                self.sets.write().remove(&kind.key(queue));
            }
        }
        Ok(())
    }
}
