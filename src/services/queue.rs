use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Sorted set of pending jobs, scored by ready-at epoch milliseconds.
const SCHEDULED_KEY: &str = "campaign_dispatch:scheduled";
const PROCESSING_KEY: &str = "campaign_dispatch:processing";

/// Queue-level retry policy: bounded attempts, exponential backoff.
pub const MAX_ATTEMPTS: u32 = 3;
pub const BACKOFF_BASE_MS: u64 = 2000;

/// Job payload serialized into Redis. References one campaign record; the
/// eligibility delay was already resolved at enqueue time by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendJob {
    pub record_id: Uuid,
    pub campaign_name: String,
    pub attempt: u32,
}

/// Redis-backed delayed job queue.
///
/// Unlike a plain list, jobs become visible only once their ready-at score
/// has passed, which is how the scheduler's staggered per-contact delays
/// are honored.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    /// Enqueue a job, eligible after `delay`.
    pub async fn enqueue(&self, job: &SendJob, delay: Duration) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        let ready_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        conn.zadd::<_, _, _, ()>(SCHEDULED_KEY, &payload, ready_at)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Claim the next due job, if any. Claiming races are settled by ZREM:
    /// whoever removes the member owns the job.
    pub async fn dequeue_due(&self) -> Result<Option<SendJob>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let now = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore_limit(SCHEDULED_KEY, "-inf", now, 0, 1)
            .await
            .map_err(QueueError::Redis)?;

        let Some(payload) = due.into_iter().next() else {
            return Ok(None);
        };

        let removed: i64 = conn.zrem(SCHEDULED_KEY, &payload).await.map_err(QueueError::Redis)?;
        if removed == 0 {
            // Another worker claimed it between the range read and the remove.
            return Ok(None);
        }

        conn.lpush::<_, _, ()>(PROCESSING_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;

        let job: SendJob = serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
        Ok(Some(job))
    }

    /// Mark a claimed job as done (remove from the processing list).
    pub async fn complete(&self, job: &SendJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Re-enqueue a claimed job with the next attempt number and an
    /// exponential backoff delay. Returns the applied backoff.
    pub async fn requeue_with_backoff(&self, job: &SendJob) -> Result<Duration, QueueError> {
        let next = SendJob {
            attempt: job.attempt + 1,
            ..job.clone()
        };
        let backoff = Duration::from_millis(BACKOFF_BASE_MS * 2u64.pow(job.attempt));
        self.enqueue(&next, backoff).await?;
        self.complete(job).await?;
        Ok(backoff)
    }

    /// Remove every not-yet-claimed job belonging to a campaign. Jobs
    /// already claimed (or claimed mid-scan) fall back to the worker's
    /// validate step, which no-ops on deleted records.
    pub async fn cancel_campaign(&self, campaign_name: &str) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let members: Vec<String> = conn
            .zrange(SCHEDULED_KEY, 0, -1)
            .await
            .map_err(QueueError::Redis)?;

        let mut cancelled = 0u64;
        for payload in members {
            let Ok(job) = serde_json::from_str::<SendJob>(&payload) else {
                continue;
            };
            if job.campaign_name != campaign_name {
                continue;
            }
            let removed: i64 = conn.zrem(SCHEDULED_KEY, &payload).await.map_err(QueueError::Redis)?;
            cancelled += removed as u64;
        }
        Ok(cancelled)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Current number of pending (not yet claimed) jobs.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let depth: u64 = conn.zcard(SCHEDULED_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule_is_exponential() {
        // 2s, 4s, 8s for attempts 0, 1, 2
        assert_eq!(BACKOFF_BASE_MS * 2u64.pow(0), 2000);
        assert_eq!(BACKOFF_BASE_MS * 2u64.pow(1), 4000);
        assert_eq!(BACKOFF_BASE_MS * 2u64.pow(2), 8000);
    }

    #[test]
    fn test_job_payload_round_trip() {
        let job = SendJob {
            record_id: Uuid::new_v4(),
            campaign_name: "friday-promo".to_string(),
            attempt: 1,
        };
        let payload = serde_json::to_string(&job).unwrap();
        let back: SendJob = serde_json::from_str(&payload).unwrap();
        assert_eq!(back.record_id, job.record_id);
        assert_eq!(back.campaign_name, job.campaign_name);
        assert_eq!(back.attempt, 1);
    }
}
