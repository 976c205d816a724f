//! Job queue using Redis Streams.
//!
//! Redis keeps a per-entry delivery counter in the consumer group's pending
//! entries list. Fresh reads start it at 1 and every `XCLAIM` of an expired
//! entry increments it, so it survives worker restarts and is the counter the
//! delivery policy trusts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use tracing::{debug, info, warn};
use vproc_models::{DeliveryAttempt, JobDescriptor};

use crate::delivery::{Acknowledger, Delivery};
use crate::error::{QueueError, QueueResult};
use crate::policy::{ClaimDecision, DeliveryPolicy};

/// Stream entry field holding the JSON payload.
const PAYLOAD_FIELD: &str = "job";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream the upload service publishes to
    pub stream_name: String,
    /// Consumer group shared by all workers
    pub consumer_group: String,
    /// Consumer name of this worker within the group
    pub consumer_name: String,
    /// Dead letter stream name
    pub dlq_stream_name: String,
    /// Redeliveries allowed after the first delivery
    pub max_retries: u32,
    /// Processing deadline before an unacknowledged entry is redelivered
    pub ack_wait: Duration,
    /// How long a nacked entry waits before it is redelivered
    pub nack_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "video.upload.created".to_string(),
            consumer_group: "video-worker-group".to_string(),
            consumer_name: "worker-1".to_string(),
            dlq_stream_name: "video.upload.dlq".to_string(),
            max_retries: 3,
            ack_wait: Duration::from_secs(600), // 10 minutes
            nack_delay: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "video.upload.created".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "video-worker-group".to_string()),
            consumer_name: std::env::var("WORKER_ID").unwrap_or_else(|_| "worker-1".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| "video.upload.dlq".to_string()),
            max_retries: std::env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            ack_wait: Duration::from_secs(
                std::env::var("QUEUE_ACK_WAIT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            nack_delay: Duration::from_secs(
                std::env::var("QUEUE_NACK_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }

    /// Redelivery policy implied by `max_retries`.
    pub fn policy(&self) -> DeliveryPolicy {
        DeliveryPolicy::new(self.max_retries)
    }

    /// Idle time given to a nacked entry so it becomes claimable after `nack_delay`.
    fn nack_idle_ms(&self) -> u64 {
        duration_ms(self.ack_wait.saturating_sub(self.nack_delay))
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
    policy: DeliveryPolicy,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let policy = config.policy();
        Ok(Self {
            client,
            config,
            policy,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Ensure the stream and consumer group exist.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => info!(
                stream = %self.config.stream_name,
                group = %self.config.consumer_group,
                "Created stream consumer group"
            ),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Publish a job.
    pub async fn enqueue(&self, job: &JobDescriptor) -> QueueResult<String> {
        let payload = job.encode()?;
        let message_id = self.enqueue_payload(&payload).await?;
        info!(job_id = %job.job_id, message_id = %message_id, "Enqueued job");
        Ok(message_id)
    }

    /// Publish a raw payload without validating it.
    pub async fn enqueue_payload(&self, payload: &[u8]) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        Ok(message_id)
    }

    /// Read new entries for this consumer.
    ///
    /// Blocks up to `block_ms` when the stream is empty. Every returned
    /// delivery is a first delivery.
    pub async fn consume(
        self: &Arc<Self>,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let deliveries: Vec<Delivery> = reply
            .map(|r| r.keys)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|key| key.ids)
            .map(|entry| self.delivery(entry, DeliveryAttempt::FIRST))
            .collect();

        if !deliveries.is_empty() {
            debug!(count = deliveries.len(), "Consumed entries from stream");
        }

        Ok(deliveries)
    }

    /// Claim entries whose processing deadline expired.
    ///
    /// Claimed entries come back with their delivery counter incremented.
    /// Entries that already used up every allowed delivery are terminated
    /// here instead of being handed out again.
    pub async fn claim_expired(self: &Arc<Self>, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;
        let min_idle_ms = duration_ms(self.config.ack_wait);

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let previous: HashMap<String, u32> = pending
            .ids
            .iter()
            .map(|p| {
                let times = u32::try_from(p.times_delivered).unwrap_or(u32::MAX);
                (p.id.clone(), times)
            })
            .collect();

        let mut claim = redis::cmd("XCLAIM");
        claim
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(min_idle_ms);
        for id in previous.keys() {
            claim.arg(id);
        }
        let claimed: StreamClaimReply = claim.query_async(&mut conn).await?;

        let mut deliveries = Vec::with_capacity(claimed.ids.len());
        for entry in claimed.ids {
            let prior = previous.get(&entry.id).copied().unwrap_or(0);
            let attempt = match self.policy.for_expired(prior) {
                ClaimDecision::Redeliver(attempt) => attempt,
                ClaimDecision::Exhausted(last) => {
                    let delivery = self.delivery(entry, last);
                    warn!(
                        message_id = %delivery.message_id(),
                        deliveries = prior,
                        max_deliver = self.policy.max_deliver(),
                        "Delivery limit reached for expired entry, terminating"
                    );
                    if let Err(e) = delivery.into_handle().term("delivery limit reached").await {
                        warn!("Failed to terminate exhausted entry: {}", e);
                    }
                    continue;
                }
            };

            info!(message_id = %entry.id, attempt = %attempt, "Claimed expired entry");
            deliveries.push(self.delivery(entry, attempt));
        }

        Ok(deliveries)
    }

    /// Wrap a stream entry. A missing payload field yields an empty payload,
    /// which fails decoding and is terminated like any malformed message.
    fn delivery(self: &Arc<Self>, entry: StreamId, attempt: DeliveryAttempt) -> Delivery {
        let payload = match entry.map.get(PAYLOAD_FIELD) {
            Some(redis::Value::BulkString(bytes)) => bytes.clone(),
            Some(redis::Value::SimpleString(s)) => s.clone().into_bytes(),
            _ => {
                warn!(message_id = %entry.id, "Stream entry has no payload field");
                Vec::new()
            }
        };
        let acker: Arc<dyn Acknowledger> = self.clone();
        Delivery::new(entry.id, payload, attempt, acker)
    }
}

#[async_trait]
impl Acknowledger for JobQueue {
    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(message_id, "Acknowledged entry");
        Ok(())
    }

    async fn nack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // JUSTID leaves the delivery counter untouched.
        redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(0)
            .arg(message_id)
            .arg("IDLE")
            .arg(self.config.nack_idle_ms())
            .arg("JUSTID")
            .query_async::<()>(&mut conn)
            .await?;

        debug!(message_id, delay = ?self.config.nack_delay, "Negatively acknowledged entry");
        Ok(())
    }

    async fn term(
        &self,
        message_id: &str,
        payload: &[u8],
        reason: &str,
        attempt: DeliveryAttempt,
    ) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .arg("reason")
            .arg(reason)
            .arg("original_id")
            .arg(message_id)
            .arg("deliveries")
            .arg(attempt.get())
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!(message_id, reason, "Moved entry to dead letter stream");
        Ok(())
    }

    async fn in_progress(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(0)
            .arg(message_id)
            .arg("JUSTID")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| QueueError::ack_failed(message_id, e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.policy().max_deliver(), 4);
        assert_eq!(config.ack_wait, Duration::from_secs(600));
    }

    #[test]
    fn test_nack_idle_leaves_nack_delay() {
        let config = QueueConfig {
            ack_wait: Duration::from_secs(600),
            nack_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(config.nack_idle_ms(), 595_000);
    }

    #[test]
    fn test_nack_idle_saturates() {
        let config = QueueConfig {
            ack_wait: Duration::from_secs(1),
            nack_delay: Duration::from_secs(30),
            ..Default::default()
        };
        assert_eq!(config.nack_idle_ms(), 0);
    }
}
