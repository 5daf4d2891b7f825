//! HTTP server for image endpoints
//!
//! Provides /health, /api/upload, /api/image/:filename and
//! /api/resize/:filename endpoints.

use crate::auth::ApiToken;
use crate::error::{ImageServiceError, Result};
use crate::storage::{content_type_for, validate_filename, ImageStore};
use crate::types::{HealthResponse, ResizeQuery, ServiceConfig, UploadResponse};
use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use expiring_cache::{CacheConfig, ExpiringCache};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    /// Request key to file path of an original or resized image
    pub cache: ExpiringCache<PathBuf>,
    pub store: ImageStore,
    pub config: ServiceConfig,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    /// Build the state from configuration. Must be called inside a tokio
    /// runtime for the cache sweeper to start.
    pub fn new(config: ServiceConfig) -> Self {
        let cache = ExpiringCache::with_config(CacheConfig::new(
            Duration::from_secs(config.cache_ttl_secs),
            Duration::from_secs(config.cache_sweep_interval_secs),
        ));
        let store = ImageStore::new(config.upload_dir.clone(), config.cache_dir.clone());

        Self {
            cache,
            store,
            config,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/api/upload", post(upload_image))
        .route("/api/image/{filename}", get(serve_image))
        .route("/api/resize/{filename}", get(resize_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server, returning once `shutdown` resolves
pub async fn start_server(
    state: SharedState,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    // Clamped so a wall clock stepping backwards reports zero
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: state.cache.stats(),
    })
}

/// Cache key for an original upload
fn image_cache_key(filename: &str) -> String {
    format!("image:{}", filename)
}

/// Cache key for a resized variant
fn resize_cache_key(filename: &str, width: u32, height: u32) -> String {
    format!("resize:{}_{}_{}", filename, width, height)
}

/// Store an uploaded image from the `image` multipart field
async fn upload_image(
    State(state): State<SharedState>,
    _auth: ApiToken,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    let no_image = || ImageServiceError::BadRequest("No image provided".into());
    let mut multipart = multipart.map_err(|_| no_image())?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        upload = Some((original_name, data));
        break;
    }

    let (original_name, data) = upload.ok_or_else(no_image)?;
    let stored = state.store.save_upload(&original_name, &data).await?;

    let path = format!("/api/image/{}", stored);
    let filename = match &state.config.public_url {
        Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
        None => path,
    };

    info!(filename = %stored, size = data.len(), "Image uploaded");

    Ok(Json(UploadResponse {
        message: "Image uploaded successfully".to_string(),
        filename,
    }))
}

/// Serve an original upload, caching its path
async fn serve_image(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> Result<Response> {
    let filename = validate_filename(&filename)?;

    let cache_key = image_cache_key(filename);
    if let Some(response) = serve_cached(&state, &cache_key).await {
        return Ok(response);
    }

    if !state.store.has_original(filename).await {
        return Err(ImageServiceError::NotFound("Image not found".into()));
    }

    let path = state.store.original_path(filename);
    state.cache.set(cache_key, path.clone());

    file_response(&path, false).await
}

/// Serve a resized variant, producing and caching it on a miss
async fn resize_image(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
    query: std::result::Result<Query<ResizeQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Response> {
    let filename = validate_filename(&filename)?;
    let Query(query) = query.map_err(|e| ImageServiceError::BadRequest(e.body_text()))?;
    let (width, height) = query.dimensions()?;

    let cache_key = resize_cache_key(filename, width, height);
    if let Some(response) = serve_cached(&state, &cache_key).await {
        return Ok(response);
    }

    let path = state.store.resize(filename, width, height).await?;
    state.cache.set(cache_key, path.clone());

    file_response(&path, false).await
}

/// Serve the file a cache entry points at.
///
/// A path that can no longer be read is dropped from the cache and the
/// caller falls back to its miss path.
async fn serve_cached(state: &ServerState, key: &str) -> Option<Response> {
    let path = state.cache.get(key)?;

    match file_response(&path, true).await {
        Ok(response) => Some(response),
        Err(e) => {
            warn!(key = %key, path = ?path, error = %e, "Cached path unreadable, removing entry");
            state.cache.delete(key);
            None
        }
    }
}

async fn file_response(path: &FsPath, from_cache: bool) -> Result<Response> {
    let data = fs::read(path).await?;
    let cache_header = if from_cache { "HIT" } else { "MISS" };
    debug!(path = ?path, size = data.len(), cache = cache_header, "Serving image");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(path, &data))
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .header("X-Cache", cache_header)
        .body(Body::from(data))
        .map_err(|e| ImageServiceError::Internal(format!("Failed to build response: {}", e)))
}
