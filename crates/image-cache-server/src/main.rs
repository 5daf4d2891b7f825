//! Image cache server - upload, serve and resize images
//!
//! Originals are stored on local disk, resized variants are written to a
//! cache directory, and the paths of both are held in an expiring
//! in-memory cache so repeat requests skip the filesystem checks and
//! resize work.

mod auth;
mod error;
mod server;
mod storage;
mod types;

use crate::error::{ImageServiceError, Result};
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ServiceConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive("image_cache_server=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting image cache server...");

    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Upload dir: {:?}", config.upload_dir);
    info!("Cache dir: {:?}", config.cache_dir);
    info!(
        "Cache TTL: {} seconds, sweep every {} seconds",
        config.cache_ttl_secs, config.cache_sweep_interval_secs
    );

    let port = config.port;
    let state: SharedState = Arc::new(ServerState::new(config));
    state.store.init().await?;

    start_server(state.clone(), port, shutdown_signal())
        .await
        .map_err(|e| ImageServiceError::Config(format!("Server error: {}", e)))?;

    state.cache.shutdown();
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn load_config() -> Result<ServiceConfig> {
    let defaults = ServiceConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let upload_dir = std::env::var("UPLOAD_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.upload_dir);

    let cache_dir = std::env::var("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cache_dir);

    let api_token = std::env::var("API_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ImageServiceError::Config("API_TOKEN environment variable is required".to_string())
        })?;

    let public_url = std::env::var("PUBLIC_URL").ok();

    let cache_ttl_secs = std::env::var("CACHE_TTL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.cache_ttl_secs);

    let cache_sweep_interval_secs = std::env::var("CACHE_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.cache_sweep_interval_secs);

    let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(defaults.max_upload_bytes);

    Ok(ServiceConfig {
        port,
        upload_dir,
        cache_dir,
        api_token,
        public_url,
        cache_ttl_secs,
        cache_sweep_interval_secs,
        max_upload_bytes,
    })
}
