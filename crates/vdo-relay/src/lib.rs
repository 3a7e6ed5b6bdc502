//! Storage event relay.
//!
//! Consumes object-storage events from a Redis Streams queue, classifies
//! them by key namespace and tells the backend about the ones it cares
//! about. Each message is acknowledged or retried on its own.

pub mod classify;
pub mod config;
pub mod consumer;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod queue;
pub mod worker;

pub use classify::{classify, EventKind};
pub use config::RelayConfig;
pub use consumer::{MessageReport, Outcome, QueueConsumer, QueueMessage};
pub use error::{RelayError, RelayResult};
pub use notifier::{HttpNotifier, Notifier};
pub use queue::{EventQueue, QueueConfig};
pub use worker::RelayWorker;
