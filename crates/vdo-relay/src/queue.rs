//! Storage event queue on Redis Streams.
//!
//! Producers `publish` events; the relay reads them through a consumer
//! group. A retried message simply stays pending until `claim_pending`
//! redelivers it; after `max_retries` it is moved to the dead-letter stream.

use std::collections::HashMap;
use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};
use vdo_models::StorageEvent;

use crate::consumer::QueueMessage;
use crate::error::{RelayError, RelayResult};
use crate::metrics;

const EVENT_FIELD: &str = "event";
const RETRY_COUNTER_TTL_SECS: i64 = 86400;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream the storage events are published to
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter stream name
    pub dlq_stream_name: String,
    /// Deliveries before a message is dead-lettered
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vdo:storage-events".to_string(),
            consumer_group: "vdo:relay".to_string(),
            dlq_stream_name: "vdo:storage-events:dlq".to_string(),
            max_retries: 3,
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
                .unwrap_or_else(|_| "vdo:storage-events".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "vdo:relay".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| "vdo:storage-events:dlq".to_string()),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        }
    }
}

/// Storage event queue client.
pub struct EventQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl EventQueue {
    /// Create a new queue client.
    pub fn new(config: QueueConfig) -> RelayResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> RelayResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Create the consumer group if it does not exist yet.
    pub async fn init(&self) -> RelayResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(RelayError::Redis(e)),
        }

        Ok(())
    }

    /// Publish a storage event.
    pub async fn publish(&self, event: &StorageEvent) -> RelayResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(event)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(EVENT_FIELD)
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        debug!(message_id = %message_id, key = %event.key(), "Published storage event");
        Ok(message_id)
    }

    /// Read up to `count` new messages for this consumer.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> RelayResult<Vec<QueueMessage>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let Some(result) = result else {
            return Ok(Vec::new());
        };

        Ok(result
            .keys
            .into_iter()
            .flat_map(|stream| stream.ids)
            .map(|entry| to_message(entry.id, &entry.map))
            .collect())
    }

    /// Acknowledge and delete a message.
    pub async fn ack(&self, message_id: &str) -> RelayResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

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

        let _: () = conn.del(retry_key(message_id)).await?;

        debug!("Acknowledged message: {}", message_id);
        Ok(())
    }

    /// Leave a message pending for redelivery, or dead-letter it once it
    /// has used up its retries. Returns true when it was dead-lettered.
    pub async fn retry(&self, message: &QueueMessage, reason: &str) -> RelayResult<bool> {
        let attempts = self.increment_retry(&message.id).await?;
        if attempts < self.config.max_retries {
            debug!(message_id = %message.id, attempts, "Message left pending for redelivery");
            return Ok(false);
        }

        self.dlq(message, reason).await?;
        Ok(true)
    }

    /// Move a message to the dead letter stream.
    pub async fn dlq(&self, message: &QueueMessage, reason: &str) -> RelayResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg(EVENT_FIELD)
            .arg(message.body.as_slice())
            .arg("error")
            .arg(reason)
            .arg("original_id")
            .arg(&message.id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(&message.id).await?;
        metrics::record_dead_lettered();

        warn!(message_id = %message.id, reason, "Moved message to DLQ");
        Ok(())
    }

    /// Claim messages other deliveries left pending for at least `min_idle`.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> RelayResult<Vec<QueueMessage>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let min_idle_ms = min_idle.as_millis() as usize;

        let pending: redis::streams::StreamPendingCountReply = pending_idle_cmd(
            &self.config.stream_name,
            &self.config.consumer_group,
            min_idle_ms,
            count,
        )
        .query_async(&mut conn)
        .await?;

        let idle: Vec<String> = pending.ids.into_iter().map(|p| p.id).collect();

        if idle.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg(&idle)
            .query_async(&mut conn)
            .await?;

        let messages: Vec<QueueMessage> = claimed
            .ids
            .into_iter()
            .map(|entry| to_message(entry.id, &entry.map))
            .collect();

        if !messages.is_empty() {
            info!("Claimed {} pending messages", messages.len());
        }
        Ok(messages)
    }

    /// Get queue length.
    pub async fn len(&self) -> RelayResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> RelayResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    async fn increment_retry(&self, message_id: &str) -> RelayResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, RETRY_COUNTER_TTL_SECS).await?;
        Ok(count)
    }
}

fn retry_key(message_id: &str) -> String {
    format!("vdo:retry:{}", message_id)
}

/// A stream entry without an event field becomes an empty body, which the
/// consumer reports as undecodable.
/// `XPENDING` restricted to entries idle for at least `min_idle_ms`, so busy
/// entries at the head of the list do not hide idle ones behind them.
fn pending_idle_cmd(stream: &str, group: &str, min_idle_ms: usize, count: usize) -> redis::Cmd {
    let mut cmd = redis::cmd("XPENDING");
    cmd.arg(stream)
        .arg(group)
        .arg("IDLE")
        .arg(min_idle_ms)
        .arg("-")
        .arg("+")
        .arg(count);
    cmd
}

fn to_message(id: String, fields: &HashMap<String, redis::Value>) -> QueueMessage {
    let body = match fields.get(EVENT_FIELD) {
        Some(redis::Value::BulkString(bytes)) => bytes.clone(),
        Some(redis::Value::SimpleString(s)) => s.clone().into_bytes(),
        _ => Vec::new(),
    };
    QueueMessage { id, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_message_reads_event_field() {
        let mut fields = HashMap::new();
        fields.insert(
            EVENT_FIELD.to_string(),
            redis::Value::BulkString(br#"{"object":{"key":"videos/abc123"}}"#.to_vec()),
        );

        let message = to_message("1-0".to_string(), &fields);
        assert_eq!(message.id, "1-0");
        let event: StorageEvent = serde_json::from_slice(&message.body).unwrap();
        assert_eq!(event.key(), "videos/abc123");

        let empty = to_message("2-0".to_string(), &HashMap::new());
        assert!(empty.body.is_empty());
    }

    #[test]
    fn test_pending_scan_filters_idle_on_the_server() {
        let packed =
            pending_idle_cmd("vdo:storage-events", "vdo:relay", 30_000, 10).get_packed_command();
        let expected = "*8\r\n$8\r\nXPENDING\r\n$18\r\nvdo:storage-events\r\n$9\r\nvdo:relay\r\n\
                        $4\r\nIDLE\r\n$5\r\n30000\r\n$1\r\n-\r\n$1\r\n+\r\n$2\r\n10\r\n";
        assert_eq!(String::from_utf8(packed).unwrap(), expected);
    }
}
