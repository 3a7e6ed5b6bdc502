//! Relay worker loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::consumer::{MessageReport, Outcome, QueueConsumer, QueueMessage};
use crate::error::RelayResult;
use crate::metrics;
use crate::queue::EventQueue;

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Reads batches from the queue and applies each message's outcome.
pub struct RelayWorker {
    config: RelayConfig,
    queue: Arc<EventQueue>,
    consumer: QueueConsumer,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl RelayWorker {
    pub fn new(config: RelayConfig, queue: EventQueue, consumer: QueueConsumer) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            queue: Arc::new(queue),
            consumer,
            shutdown,
            consumer_name: format!("relay-{}", Uuid::new_v4()),
        }
    }

    /// Sender that stops `run` when set to true.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Run until shutdown.
    pub async fn run(&self) -> RelayResult<()> {
        info!(consumer = %self.consumer_name, "Starting relay worker");
        self.queue.init().await?;

        let claim_task = self.spawn_claim_task();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping relay");
                        break;
                    }
                }
                result = self.consume_batch() => {
                    if let Err(e) = result {
                        error!("Error consuming storage events: {}", e);
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
            }
        }

        claim_task.abort();
        info!("Relay worker stopped");
        Ok(())
    }

    async fn consume_batch(&self) -> RelayResult<()> {
        let messages = self
            .queue
            .consume(&self.consumer_name, self.config.block_ms, self.config.batch_size)
            .await?;
        if messages.is_empty() {
            return Ok(());
        }
        Self::handle(&self.queue, &self.consumer, messages).await;
        Ok(())
    }

    /// Redeliver messages left pending by retries or crashed consumers.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let consumer = self.consumer.clone();
        let consumer_name = self.consumer_name.clone();
        let interval = self.config.claim_interval;
        let min_idle = self.config.retry_delay;
        let count = self.config.batch_size;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match queue.claim_pending(&consumer_name, min_idle, count).await {
                            Ok(messages) if !messages.is_empty() => {
                                Self::handle(&queue, &consumer, messages).await;
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim pending messages: {}", e),
                        }
                        if let (Ok(len), Ok(dlq_len)) = (queue.len().await, queue.dlq_len().await) {
                            metrics::set_queue_lengths(len, dlq_len);
                        }
                    }
                }
            }
        })
    }

    async fn handle(queue: &EventQueue, consumer: &QueueConsumer, messages: Vec<QueueMessage>) {
        let reports = consumer.process_batch(messages.clone()).await;
        for (message, report) in messages.iter().zip(reports) {
            Self::apply(queue, message, &report).await;
        }
    }

    async fn apply(queue: &EventQueue, message: &QueueMessage, report: &MessageReport) {
        let result = match report.outcome {
            Outcome::Ack => queue.ack(&message.id).await,
            Outcome::Retry => queue
                .retry(message, &format!("{} relay failed", report.kind))
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            error!(message_id = %message.id, "Failed to settle message: {}", e);
        }
    }
}
