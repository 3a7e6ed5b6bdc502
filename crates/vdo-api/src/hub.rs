//! Correlation key → waiting clients.
//!
//! The hub remembers the last status seen per key so a client that
//! (re)connects after completion is told immediately instead of waiting
//! for a message that was already sent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};
use vdo_models::{CorrelationKey, NotificationMessage, NotificationStatus};

/// Messages buffered per subscriber before sends start waiting.
const SUBSCRIBER_BUFFER_SIZE: usize = 16;

pub type SubscriptionId = u64;

/// A registered client.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub key: CorrelationKey,
    pub events: mpsc::Receiver<NotificationMessage>,
    /// Completion that happened before this client subscribed
    pub replay: Option<NotificationMessage>,
}

#[derive(Debug)]
struct KeyRecord {
    last: NotificationMessage,
    completed: bool,
    updated_at: Instant,
}

#[derive(Debug, Default)]
struct HubState {
    subscribers: HashMap<CorrelationKey, Vec<(SubscriptionId, mpsc::Sender<NotificationMessage>)>>,
    records: HashMap<CorrelationKey, KeyRecord>,
}

#[derive(Debug)]
pub struct NotificationHub {
    state: RwLock<HubState>,
    next_id: AtomicU64,
    ttl: Duration,
}

impl NotificationHub {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            next_id: AtomicU64::new(1),
            ttl,
        }
    }

    /// Register a client for `key`.
    pub async fn subscribe(&self, key: CorrelationKey) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_SIZE);

        let mut state = self.state.write().await;
        state.subscribers.entry(key.clone()).or_default().push((id, tx));
        let replay = state
            .records
            .get(&key)
            .filter(|record| record.completed)
            .map(|record| record.last.clone());

        debug!(video_key = %key, subscription = id, replay = replay.is_some(), "Client subscribed");
        Subscription {
            id,
            key,
            events: rx,
            replay,
        }
    }

    pub async fn unsubscribe(&self, key: &CorrelationKey, id: SubscriptionId) {
        let mut state = self.state.write().await;
        if let Some(subscribers) = state.subscribers.get_mut(key) {
            subscribers.retain(|(sub_id, _)| *sub_id != id);
            if subscribers.is_empty() {
                state.subscribers.remove(key);
            }
        }
    }

    /// Record and fan out a message. A `completed` for a key that already
    /// completed is recorded once and not sent again.
    ///
    /// Returns how many clients received it.
    pub async fn publish(&self, message: NotificationMessage) -> usize {
        let key = message.video_key.clone();
        let is_completed = message.status == NotificationStatus::Completed;

        let senders = {
            let mut state = self.state.write().await;
            let record = state.records.entry(key.clone()).or_insert_with(|| KeyRecord {
                last: message.clone(),
                completed: false,
                updated_at: Instant::now(),
            });
            if record.completed {
                debug!(
                    video_key = %key,
                    status = %message.status.as_str(),
                    "Key already completed, not re-sending"
                );
                return 0;
            }
            record.last = message.clone();
            record.completed = is_completed;
            record.updated_at = Instant::now();

            state
                .subscribers
                .get(&key)
                .map(|subs| subs.iter().map(|(_, tx)| tx.clone()).collect::<Vec<_>>())
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for tx in senders {
            if tx.send(message.clone()).await.is_ok() {
                delivered += 1;
            }
        }

        info!(
            video_key = %key,
            status = %message.status.as_str(),
            delivered,
            "Notification published"
        );
        delivered
    }

    pub async fn is_completed(&self, key: &CorrelationKey) -> bool {
        self.state
            .read()
            .await
            .records
            .get(key)
            .is_some_and(|record| record.completed)
    }

    pub async fn subscriber_count(&self, key: &CorrelationKey) -> usize {
        self.state.read().await.subscribers.get(key).map_or(0, Vec::len)
    }

    /// Drop records older than the TTL that nobody is waiting on.
    pub async fn prune(&self) -> usize {
        let mut state = self.state.write().await;
        let now = Instant::now();
        let ttl = self.ttl;

        let HubState { subscribers, records } = &mut *state;
        let before = records.len();
        records.retain(|key, record| {
            subscribers.contains_key(key) || now.duration_since(record.updated_at) < ttl
        });
        before - records.len()
    }

    /// Periodically prune until `shutdown` flips to true.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let removed = self.prune().await;
                        if removed > 0 {
                            debug!(removed, "Pruned expired notification records");
                        }
                    }
                }
            }
        })
    }
}
