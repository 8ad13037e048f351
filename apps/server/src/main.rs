//! Saturator server — account-description enrichment over HTTP.
//!
//! Accepts job submissions (account set + proxy + rotation endpoint),
//! runs each as a background enrichment pipeline, and serves the
//! resulting snapshot files.

mod app;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use saturator_shared::{PipelineConfig, load_config};
use saturator_store::SnapshotStore;

use app::AppState;

/// Saturator — enrich account sets with profile descriptions.
#[derive(Parser)]
#[command(
    name = "saturator",
    version,
    about = "Account-description enrichment server.",
    long_about = None,
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address from the config.
    #[arg(long)]
    listen: Option<String>,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Set up tracing to stdout and the configured log file.
fn init_tracing(cli: &Cli, log_file: &str) -> Result<()> {
    let default_directive = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive.into());

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .wrap_err_with(|| format!("failed to open log file {log_file}"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).wrap_err("failed to load configuration")?;
    init_tracing(&cli, &config.server.log_file)?;

    let store = SnapshotStore::open(&config.server.store_dir)?;
    let pipeline = PipelineConfig::from(&config);
    let state = AppState::new(store, pipeline);
    let router = app::build_app(state.clone());

    let addr = cli.listen.unwrap_or_else(|| config.server.listen_addr.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, store_dir = %config.server.store_dir, "server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    // Cancel in-flight runs and wait for them to wind down before exiting.
    let mut runs = state.runs.lock().await;
    tracing::info!(in_flight = runs.len(), "aborting in-flight runs");
    runs.shutdown().await;

    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, stopping server");
}
