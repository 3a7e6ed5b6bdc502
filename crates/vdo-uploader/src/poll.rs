//! Fixed-interval readiness polling, used when the push channel is unavailable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use vdo_models::CorrelationKey;

use crate::error::UploaderResult;
use crate::event::UploaderEvent;

/// Answers "is the processed result there yet?" for a URI.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn check(&self, uri: &str) -> UploaderResult<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Check `uri` now, then once per `interval` after every miss, until it is
/// ready or `shutdown` flips to true (or its sender is dropped).
///
/// Probe errors count as misses. There is no attempt limit.
pub async fn poll_until_ready<P>(
    probe: &P,
    uri: &str,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> PollOutcome
where
    P: ReadinessProbe + ?Sized,
{
    let mut attempts = 0u32;
    loop {
        if *shutdown.borrow() {
            return PollOutcome::Cancelled { attempts };
        }

        attempts += 1;
        match probe.check(uri).await {
            Ok(true) => {
                info!(uri, attempts, "Processed result available");
                return PollOutcome::Ready { attempts };
            }
            Ok(false) => debug!(uri, attempts, "Waiting for processing"),
            Err(e) => debug!(uri, attempts, error = %e, "Readiness check failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return PollOutcome::Cancelled { attempts };
                }
            }
        }
    }
}

/// A spawned poll task. Dropping the handle cancels it.
#[derive(Debug)]
pub struct PollHandle {
    shutdown: watch::Sender<bool>,
}

impl PollHandle {
    /// Spawn a poll for `key`; a success is reported to `events`.
    pub fn spawn(
        probe: Arc<dyn ReadinessProbe>,
        key: CorrelationKey,
        uri: String,
        interval: Duration,
        events: mpsc::Sender<UploaderEvent>,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            debug!(video_key = %key, uri = %uri, "Starting readiness poll");
            match poll_until_ready(probe.as_ref(), &uri, interval, shutdown_rx).await {
                PollOutcome::Ready { attempts } => {
                    let _ = events.send(UploaderEvent::PollReady { key, attempts }).await;
                }
                PollOutcome::Cancelled { attempts } => {
                    debug!(video_key = %key, attempts, "Readiness poll cancelled");
                }
            }
        });

        Self { shutdown }
    }

    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Not ready for the first `misses` checks, records when each check happened.
    struct FlakyProbe {
        misses: u32,
        calls: AtomicU32,
        seen: Mutex<Vec<Instant>>,
    }

    impl FlakyProbe {
        fn new(misses: u32) -> Self {
            Self {
                misses,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReadinessProbe for FlakyProbe {
        async fn check(&self, _uri: &str) -> UploaderResult<bool> {
            self.seen.lock().unwrap().push(Instant::now());
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(call >= self.misses)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_misses_then_ready() {
        let probe = FlakyProbe::new(3);
        let (_tx, rx) = watch::channel(false);

        let interval = Duration::from_millis(2000);
        let outcome = poll_until_ready(&probe, "http://backend/ready", interval, rx).await;
        assert_eq!(outcome, PollOutcome::Ready { attempts: 4 });

        let seen = probe.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        for pair in seen.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap >= interval && gap < interval + Duration::from_millis(10),
                "gap {:?}",
                gap
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels() {
        let probe = Arc::new(FlakyProbe::new(u32::MAX));
        let (tx, rx) = watch::channel(false);

        let task = {
            let probe = probe.clone();
            let interval = Duration::from_secs(2);
            tokio::spawn(async move {
                poll_until_ready(probe.as_ref(), "http://backend/ready", interval, rx).await
            })
        };

        tokio::time::sleep(Duration::from_millis(4500)).await;
        tx.send(true).unwrap();

        let outcome = task.await.unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_sends_nothing() {
        let probe: Arc<dyn ReadinessProbe> = Arc::new(FlakyProbe::new(1));
        let (events_tx, mut events_rx) = mpsc::channel(4);

        let handle = PollHandle::spawn(
            probe,
            CorrelationKey::from("videos/abc123"),
            "http://backend/ready".to_string(),
            Duration::from_secs(2),
            events_tx,
        );
        tokio::task::yield_now().await;
        drop(handle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(events_rx.try_recv().is_err());
    }
}
