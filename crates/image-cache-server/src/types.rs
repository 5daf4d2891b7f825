//! Core types for the image cache service

use crate::error::{ImageServiceError, Result};
use expiring_cache::CacheStats;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Width and height used when a resize request omits them
pub const DEFAULT_DIMENSION: u32 = 300;

/// Largest width or height a resize request may ask for
pub const MAX_DIMENSION: u32 = 4096;

/// Configuration for the image cache service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub upload_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub api_token: String,
    pub public_url: Option<String>,
    pub cache_ttl_secs: u64,
    pub cache_sweep_interval_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            upload_dir: PathBuf::from("./uploads"),
            cache_dir: PathBuf::from("./cache"),
            api_token: String::new(),
            public_url: None,
            cache_ttl_secs: 5 * 60,             // 5 minutes
            cache_sweep_interval_secs: 10 * 60, // 10 minutes
            max_upload_bytes: 8 << 20,          // 8 MiB
        }
    }
}

/// Query parameters for the resize endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ResizeQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ResizeQuery {
    /// Requested dimensions, defaulting to 300x300
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let width = self.width.unwrap_or(DEFAULT_DIMENSION);
        let height = self.height.unwrap_or(DEFAULT_DIMENSION);

        let valid = |d: u32| (1..=MAX_DIMENSION).contains(&d);
        if !valid(width) || !valid(height) {
            return Err(ImageServiceError::BadRequest(format!(
                "Width and height must be between 1 and {}",
                MAX_DIMENSION
            )));
        }

        Ok((width, height))
    }
}

/// Successful upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}
