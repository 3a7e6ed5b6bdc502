//! Storage event relay binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vdo_relay::{metrics, EventQueue, HttpNotifier, QueueConsumer, RelayConfig, RelayWorker};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vdo_relay=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting vdo-relay");

    let config = RelayConfig::from_env();
    info!("Relay config: {:?}", config);

    if let Ok(addr) = std::env::var("RELAY_METRICS_ADDR") {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => match metrics::init_metrics(addr) {
                Ok(()) => info!("Metrics listening on {}", addr),
                Err(e) => error!("Failed to start metrics exporter: {}", e),
            },
            Err(e) => error!("Invalid RELAY_METRICS_ADDR {}: {}", addr, e),
        }
    }

    let queue = match EventQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create event queue: {}", e);
            std::process::exit(1);
        }
    };

    let notifier = match HttpNotifier::new(config.clone()) {
        Ok(n) => n,
        Err(e) => {
            error!("Failed to create backend client: {}", e);
            std::process::exit(1);
        }
    };

    let consumer =
        QueueConsumer::new(Arc::new(notifier)).with_key_marker(config.key_marker.clone());
    let worker = RelayWorker::new(config, queue, consumer);

    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown.send(true);
    });

    if let Err(e) = worker.run().await {
        error!("Relay error: {}", e);
        std::process::exit(1);
    }
}
