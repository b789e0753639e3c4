//! Resource Cache - a disk-backed LRU cache in front of network fetches
//!
//! Serves `GET /resolve` through the cache and exposes stats and health.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resource_cache::api::create_router;
use resource_cache::{spawn_cleanup_task, AppState, Config, RequestCoordinator};

/// Main entry point for the resource cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the disk store and wrap it in the request coordinator
/// 4. Start background store maintenance task
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM, then flush the index
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resource_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resource Cache Server");

    let config = Config::from_env();
    info!(
        max_capacity_bytes = config.max_capacity_bytes,
        content_root = %config.content_root.display(),
        max_age_secs = config.max_age_secs,
        port = config.server_port,
        cleanup_interval = config.cleanup_interval,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config).context("failed to open disk store")?;
    let coordinator = state.coordinator.clone();
    info!("Request coordinator initialized");

    let cleanup_handle = spawn_cleanup_task(coordinator.store(), config.cleanup_interval);
    info!("Background maintenance task started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle, coordinator.clone()))
        .await
        .context("server error")?;

    coordinator
        .persist_index()
        .await
        .context("failed to flush index on shutdown")?;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the maintenance task and outstanding fetches.
async fn shutdown_signal(
    cleanup_handle: tokio::task::JoinHandle<()>,
    coordinator: RequestCoordinator,
) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cleanup_handle.abort();
    let aborted = coordinator.shutdown();
    warn!(aborted, "Maintenance task and outstanding fetches aborted");
}
