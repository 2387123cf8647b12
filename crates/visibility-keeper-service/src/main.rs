//! # Visibility-Keeper Daemon
//!
//! Binary entry point. This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Derives the immutable cycle parameters exactly once
//! - Starts the publisher endpoint and the fixed-rate scheduler
//! - Shuts down gracefully on SIGINT/SIGTERM, letting an in-flight cycle
//!   finish

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use visibility_keeper_service::config::ServiceConfig;
use visibility_keeper_service::keeper::VisibilityKeeper;
use visibility_keeper_service::publisher::{self, PublisherState};
use visibility_keeper_service::scheduler::Scheduler;
use visibility_runtime::{QueueClient, SqsClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visibility_keeper_service=info,visibility_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Visibility-Keeper Service");

    // -------------------------------------------------------------------------
    // Load configuration. Missing or invalid configuration is fatal; the
    // scheduler must never start with a broken setup.
    // -------------------------------------------------------------------------
    let config = match ServiceConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    if let Err(e) = config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    // -------------------------------------------------------------------------
    // One-time lifecycle derivation: queue identity, the fixed receive
    // descriptor, and the visibility timeout in whole seconds. These are
    // immutable for the life of the process.
    // -------------------------------------------------------------------------
    let queue_url = match config.keeper.queue_url() {
        Ok(url) => url,
        Err(e) => {
            error!(error = %e, "Queue URL is invalid; aborting");
            std::process::exit(3);
        }
    };
    let visibility_timeout_secs = config.keeper.visibility_timeout_secs();

    let client: Arc<dyn QueueClient> = match SqsClient::new(config.aws.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to construct queue client; aborting");
            std::process::exit(3);
        }
    };

    let keeper = match VisibilityKeeper::new(
        client.clone(),
        queue_url.clone(),
        config.keeper.poll_batch_size,
        visibility_timeout_secs,
    ) {
        Ok(keeper) => Arc::new(keeper),
        Err(e) => {
            error!(error = %e, "Failed to build receive descriptor; aborting");
            std::process::exit(3);
        }
    };

    info!(
        queue_url = %queue_url,
        time_bound_ms = config.keeper.time_bound_ms,
        visibility_timeout_ms = config.keeper.visibility_timeout_ms,
        visibility_timeout_secs = visibility_timeout_secs,
        poll_interval_ms = config.keeper.poll_interval_ms,
        poll_batch_size = config.keeper.poll_batch_size,
        "Starting visibility keeper"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // -------------------------------------------------------------------------
    // Publisher endpoint
    // -------------------------------------------------------------------------
    let publisher_state = PublisherState {
        client: client.clone(),
        queue_url: queue_url.clone(),
        burst_size: config.publisher.burst_size,
    };
    let app = publisher::router(publisher_state);

    let bind_address = format!("{}:{}", config.publisher.host, config.publisher.port);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "Publisher endpoint listening");

    let mut publisher_shutdown = shutdown_rx.clone();
    let publisher_handle = tokio::spawn(async move {
        let shutdown = async move {
            // Either an explicit signal or a dropped sender ends the server
            let _ = publisher_shutdown.changed().await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(error = %e, "Publisher server failed");
        }
    });

    // -------------------------------------------------------------------------
    // Scheduler
    // -------------------------------------------------------------------------
    let scheduler = Scheduler::new(
        keeper,
        Duration::from_millis(config.keeper.poll_interval_ms),
        shutdown_rx,
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    // -------------------------------------------------------------------------
    // Wait for a shutdown signal, then stop both tasks. The scheduler lets an
    // in-flight cycle finish before it exits.
    // -------------------------------------------------------------------------
    wait_for_shutdown_signal().await;
    info!("Shutdown signal received; stopping");

    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
    let _ = publisher_handle.await;

    info!("Visibility-Keeper Service stopped");
    Ok(())
}

/// Resolve on SIGINT or, on unix, SIGTERM
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
