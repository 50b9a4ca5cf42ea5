//! Pub/sub service entry point.
//!
//! Loads configuration, initialises logging, provisions the service's queues
//! and runs their consumers until the process is asked to stop.

mod config;
mod consumers;

use consumers::{movie_events_queue, MovieEventConsumer};
use pubsub_core::{InMemoryClaimStore, PubSub, QueueRegistration};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration is loaded before logging so the output format can follow
    // it; a load failure is reported once the subscriber is in place.
    let loaded = config::load();
    let logging = loaded
        .as_ref()
        .map(|service_config| service_config.logging.clone())
        .unwrap_or_default();
    init_logging(&logging);

    let service_config = match loaded {
        Ok(service_config) => service_config,
        Err(e) => {
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(3);
        }
    };

    if let Some(path) = config::explicit_path() {
        info!(path = %path, "Loaded configuration from explicit path");
    }

    info!(
        environment = ?service_config.pubsub.environment,
        provider = ?service_config.pubsub.provider,
        "Starting pub/sub service"
    );

    let pubsub = match PubSub::from_settings(service_config.pubsub).await {
        Ok(pubsub) => pubsub,
        Err(e) => {
            error!(error = %e, "Failed to create queue provider; aborting");
            std::process::exit(3);
        }
    };

    let movie_consumer = Arc::new(MovieEventConsumer::new(Arc::new(InMemoryClaimStore::new())));
    let mut movie_events = movie_events_queue(Arc::clone(&movie_consumer));

    let results = pubsub
        .register_queues(vec![&mut movie_events as &mut dyn QueueRegistration])
        .await;

    let names = [movie_events.name().to_string()];
    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(url) => info!(queue = %name, url = %url, "Queue ready"),
            Err(e) => error!(queue = %name, error = %e, "Queue registration failed"),
        }
    }

    shutdown_signal().await;

    pubsub.shutdown().await;
    info!(
        movie_events_processed = movie_consumer.processed_count(),
        "Pub/sub service stopped"
    );
    Ok(())
}

fn init_logging(logging: &config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.as_str().into());

    if logging.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Resolve on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), stopping consumers"),
        _ = terminate => info!("Received SIGTERM, stopping consumers"),
    }
}
