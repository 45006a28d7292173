//! SQL Exporter Binary Entry Point
//!
//! Loads the job configuration, starts the scheduler and serves the scrape
//! endpoint. Core functionality is provided by the `sql_exporter` library crate.

use clap::Parser;
use prometheus::Registry;
use sql_exporter::{
    Exporter,
    config::DEFAULT_CONFIG_FILE,
    server::{AppState, DEFAULT_TELEMETRY_PATH, create_router},
};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// SQL Exporter - scheduled SQL queries as Prometheus metrics
#[derive(Parser, Debug)]
#[command(name = "sql_exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        long = "config.file",
        default_value = DEFAULT_CONFIG_FILE,
        env = "SQL_EXPORTER_CONFIG"
    )]
    config_file: String,

    /// Address to listen on for the web interface and telemetry
    #[arg(
        long = "web.listen-address",
        default_value = "0.0.0.0:9237",
        env = "SQL_EXPORTER_LISTEN_ADDRESS"
    )]
    listen_address: String,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", default_value = DEFAULT_TELEMETRY_PATH)]
    telemetry_path: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sql_exporter=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    tracing::info!("Loading configuration from: {}", cli.config_file);

    let exporter = Exporter::new(&cli.config_file).await?;
    for (index, name, reason) in exporter.report().skipped() {
        tracing::warn!(
            "Job #{} ({}) skipped: {}",
            index,
            name.unwrap_or("<unnamed>"),
            reason
        );
    }
    tracing::info!(
        "Scheduled {} job(s): {}",
        exporter.jobs().len(),
        exporter.report().scheduled().join(", ")
    );

    let registry = Registry::new();
    exporter.register(&registry)?;

    let app = create_router(AppState { registry }, &cli.telemetry_path);
    let addr: SocketAddr = cli.listen_address.parse()?;

    tracing::info!("Listening on: http://{}{}", addr, cli.telemetry_path);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(exporter))
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal(exporter: Exporter) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Shutting down scheduler...");
    if let Err(e) = exporter.shutdown().await {
        tracing::error!("Failed to shutdown scheduler: {}", e);
    }
}
