//! Retroboard server
//!
//! Binds the TCP front end, wires it to the room engine, and runs until
//! interrupted.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use retroboard_core::{MetadataStore, RoomEngine};
use retroboard_net::Server;

mod config;

use config::Config;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Retroboard server");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let metadata = if config.ephemeral {
        tracing::warn!("Running ephemeral; rooms will not survive a restart");
        None
    } else {
        match open_metadata(&config) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::error!("Failed to open metadata store: {}", e);
                std::process::exit(1);
            }
        }
    };

    let (engine, events_rx) = RoomEngine::new(metadata);

    let server = match Server::start(config.port, engine, events_rx).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %server.addr(), "Ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }

    tracing::info!("Shutting down");
    server.shutdown();
}

fn open_metadata(config: &Config) -> Result<MetadataStore, Box<dyn std::error::Error>> {
    let db_path = config.resolve_db_path()?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(path = %db_path.display(), "Opening metadata store");
    Ok(MetadataStore::open(&db_path)?)
}
