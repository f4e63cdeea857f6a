#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::history::{HistorySource, MemoryHistory};
use server::http::build_router;
use server::service::ReportCoordinator;
use server::store::{ReportStore, fs::FsReportStore};
use server::telemetry::{TelemetryProviders, init_telemetry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let store: Arc<dyn ReportStore> = Arc::new(FsReportStore::open_dir(&config.report_dir).await?);
    let history: Arc<dyn HistorySource> = match &config.seed_file {
        Some(path) => Arc::new(MemoryHistory::load(path).await?),
        None => {
            tracing::warn!("SEED_FILE not set; every report request will answer NOT_FOUND");
            Arc::new(MemoryHistory::default())
        }
    };

    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config.server_addr, &config);

    run_server(listener, config, history, store, providers).await
}

async fn run_server(
    listener: TcpListener,
    config: ServerConfig,
    history: Arc<dyn HistorySource>,
    store: Arc<dyn ReportStore>,
    providers: TelemetryProviders,
) -> anyhow::Result<()> {
    let coordinator = ReportCoordinator::new(&config, history, store);
    let app = build_router(coordinator.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP listener closed, stopping renders...");
    // 1. Stop the render pool; queued renders finish within the timeout
    coordinator.shutdown().await;
    // 2. Flush telemetry
    providers.shutdown();

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting report service on {addr} with full config: {config:#?}");
    } else {
        tracing::info!(
            "Starting report service on {} with {} render workers, writing to {}",
            addr,
            config.render_workers,
            config.report_dir.display()
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
