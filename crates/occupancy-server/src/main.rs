//! Service binary for the room occupancy monitor.
//!
//! Wires the door sensor feed to the viewers: it subscribes to the sensor
//! subject on NATS, runs every payload through the ingestion pipeline,
//! appends the readings worth keeping to `SQLite`, and serves the viewer
//! API (HTTP polling plus `WebSocket` push) from the same state.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `occupancy-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Open the database and apply migrations
//! 4. Restore the debounce baseline from the newest stored row
//! 5. Assemble the ingestion pipeline
//! 6. Start the viewer API server
//! 7. Connect to NATS and consume sensor messages until shutdown

mod error;
mod nats_ingest;

use std::path::Path;
use std::sync::Arc;

use occupancy_core::config::{LogFormat, LoggingConfig, ServiceConfig};
use occupancy_core::{Broadcaster, Pipeline};
use occupancy_db::{SqliteConfig, SqliteDatabase};
use occupancy_observer::{AppState, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::ServiceError;
use crate::nats_ingest::SensorSubscription;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "occupancy-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step fails or the sensor
/// subscription ends.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("occupancy-server starting");
    info!(
        from_file,
        nats_url = %config.ingest.nats_url,
        subject = %config.ingest.subject,
        database_url = %config.storage.database_url,
        heartbeat_minutes = config.debounce.heartbeat_minutes,
        observer_port = config.observer.port,
        "Configuration loaded"
    );

    // 3. Open the database.
    let db_config = SqliteConfig::new(&config.storage.database_url)
        .with_max_connections(config.storage.max_connections);
    let db = SqliteDatabase::connect(&db_config).await?;
    db.run_migrations().await?;
    let store = db.readings();

    // 4. Restore the debounce baseline.
    let state = Arc::new(store.restore_state().await);

    // 5. Assemble the pipeline.
    let broadcaster = Broadcaster::new(config.observer.broadcast_capacity);
    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&state),
        broadcaster.clone(),
        Arc::new(store.clone()),
        config.pipeline_options(),
    ));
    info!(
        write_timeout_ms = config.storage.write_timeout_ms,
        "Ingestion pipeline assembled"
    );

    // 6. Start the viewer API server.
    let app_state = Arc::new(
        AppState::new(state, broadcaster, store)
            .with_ping_interval(config.observer.ping_interval()),
    );
    let server_config = ServerConfig {
        host: config.observer.host.clone(),
        port: config.observer.port,
    };
    let observer_handle = occupancy_observer::spawn_observer(&server_config, app_state).await?;

    // 7. Consume sensor messages.
    let subscription =
        SensorSubscription::connect(&config.ingest.nats_url, &config.ingest.subject).await?;
    info!(subject = subscription.subject(), "Sensor intake ready");

    let result = tokio::select! {
        result = subscription.run(Arc::clone(&pipeline)) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    observer_handle.abort();
    db.close().await;
    info!("occupancy-server shutdown complete");

    result?;
    Ok(())
}

/// Load configuration from [`CONFIG_PATH`], falling back to defaults.
///
/// Environment overrides apply in both cases. Returns whether the file
/// was found.
fn load_config() -> Result<(ServiceConfig, bool), ServiceError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok((ServiceConfig::from_file(config_path)?, true))
    } else {
        let mut config = ServiceConfig::default();
        config.apply_env_overrides()?;
        Ok((config, false))
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}
