//! Reference notification backend.
//!
//! This crate provides:
//! - Presigned write/read credentials for the uploader
//! - Completion endpoints called by the storage event relay
//! - A WebSocket hub pushing completion to waiting clients
//! - A readiness endpoint for the poll fallback
//! - Health and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use hub::NotificationHub;
pub use routes::create_router;
pub use state::AppState;
