// skilltrace - usage telemetry server for skills
//
// Accepts one event per skill invocation over HTTP, stores it in SQLite with
// the caller identity hashed, and serves aggregated views for a dashboard.
//
// Architecture:
// - Server (axum): POST /api/track, GET /analytics/*
// - Store (rusqlite + r2d2): append-only usage_events table
// - Tracker (library): wraps skills and posts events to the server

mod cli;

use anyhow::Result;
use skilltrace::config::{Config, LogRotation, LoggingConfig};
use skilltrace::server::{self, AppState};
use skilltrace::store::EventStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Handle CLI commands first (config, prune); exit early if one ran
    if cli::handle_cli()? {
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let config = Config::from_env()?;

    // The guard must be kept alive for the duration of the program to ensure logs flush
    let _file_guard = init_tracing(&config.logging);

    tracing::info!(
        version = skilltrace::config::VERSION,
        db = %config.store.db_path.display(),
        default_category = %config.default_category,
        "Starting skilltrace"
    );

    let store = EventStore::open(&config.store.db_path, config.store.pool_size)?;
    tracing::info!(events = store.count()?, "Event store ready");

    let state = AppState::new(store, config.ingest_options());

    server::start_server(config.bind_addr, state, shutdown_signal()).await?;

    Ok(())
}

/// Initialize tracing: stdout plus an optional rolling JSON file
///
/// Precedence: RUST_LOG env var > config file > default "info"
fn init_tracing(logging: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_filter = format!("skilltrace={},axum=info", logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    if !logging.file_enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&logging.file_dir) {
        eprintln!(
            "Warning: Could not create log directory {:?}: {}",
            logging.file_dir, e
        );
        // Fall back to stdout only
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return None;
    }

    let file_appender = match logging.file_rotation {
        LogRotation::Hourly => {
            tracing_appender::rolling::hourly(&logging.file_dir, &logging.file_prefix)
        }
        LogRotation::Daily => {
            tracing_appender::rolling::daily(&logging.file_dir, &logging.file_prefix)
        }
        LogRotation::Never => {
            tracing_appender::rolling::never(&logging.file_dir, &logging.file_prefix)
        }
    };

    // Writes happen on a background thread
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // File layer uses JSON format for structured log parsing
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    Some(guard)
}

/// Resolves on Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, keep serving
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
