use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::debug;

use crate::{
    backend::{prepare_enqueue, prepare_processing, QueueBackend},
    types::{CollectionKind, JobId, JobRecord},
    QueueError, QueueResult,
};

/// Pop the lowest-scored member with score <= ARGV[1], server-side
const CLAIM_DUE_LUA: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #due == 0 then
    return false
end
redis.call('ZREM', KEYS[1], due[1])
return due[1]
"#;

/// Inclusive `ZREVRANGE` bounds of a page, `None` when the page is empty
fn page_bounds(offset: usize, limit: usize) -> Option<(isize, isize)> {
    let max = isize::MAX as usize;
    if limit == 0 || offset > max {
        return None;
    }
    let stop = offset.saturating_add(limit - 1).min(max);
    Some((offset as isize, stop as isize))
}

/// Redis backend using the `job:<queue>:<collection>` key layout
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    claim_due_script: Script,
}

impl RedisBackend {
    /// Open a managed connection to `url`
    pub async fn connect(url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| QueueError::Backend(format!("invalid redis url {url}: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Backend(format!("failed to connect to {url}: {e}")))?;
        debug!("Connected to redis at {}", url);
        Ok(Self::with_connection(conn))
    }

    /// Wrap an existing connection manager
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            claim_due_script: Script::new(CLAIM_DUE_LUA),
        }
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    async fn enqueue(
        &self,
        queue: &str,
        record: JobRecord,
        kind: CollectionKind,
        due_time: Option<i64>,
    ) -> QueueResult<JobRecord> {
        let (record, score) = prepare_enqueue(record, kind, due_time)?;
        let member = record.to_json()?;

        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(kind.key(queue), member, score).await?;
        Ok(record)
    }

    async fn claim_due_at(&self, queue: &str, now: i64) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.conn.clone();
        let member: Option<String> = self
            .claim_due_script
            .key(CollectionKind::Queue.key(queue))
            .arg(now)
            .invoke_async(&mut conn)
            .await?;

        match member {
            Some(raw) => JobRecord::from_json(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn mark_processing(&self, queue: &str, record: JobRecord) -> QueueResult<JobRecord> {
        let record = prepare_processing(record)?;
        let value = record.to_json()?;

        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(CollectionKind::Processing.key(queue), record.id.as_str(), value)
            .await?;
        Ok(record)
    }

    async fn unmark_processing(&self, queue: &str, id: &JobId) -> QueueResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .hdel(CollectionKind::Processing.key(queue), id.as_str())
            .await?;
        Ok(removed > 0)
    }

    async fn list(
        &self,
        queue: &str,
        kind: CollectionKind,
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<JobRecord>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = match kind {
            CollectionKind::Processing => conn.hvals(kind.key(queue)).await?,
            _ => {
                let Some((start, stop)) = page_bounds(offset, limit) else {
                    return Ok(Vec::new());
                };
                conn.zrevrange(kind.key(queue), start, stop).await?
            }
        };

        raw.iter().map(|member| JobRecord::from_json(member)).collect()
    }

    async fn count(&self, queue: &str, kind: CollectionKind) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = match kind {
            CollectionKind::Processing => conn.hlen(kind.key(queue)).await?,
            _ => conn.zcard(kind.key(queue)).await?,
        };
        Ok(len)
    }

    async fn clear(&self, queue: &str, kind: CollectionKind) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        match kind {
            CollectionKind::Processing => conn.del::<_, ()>(kind.key(queue)).await?,
            _ => {
                conn.zrembyscore::<_, _, _, ()>(kind.key(queue), "-inf", "+inf")
                    .await?
            }
        }
        Ok(())
    }
}
