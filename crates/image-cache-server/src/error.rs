//! Error types for the image cache service

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum ImageServiceError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Multipart(MultipartError),
    Upload(String),
    Processing(String),
    Io(Box<std::io::Error>),
    Internal(String),
    Config(String),
}

impl fmt::Display for ImageServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageServiceError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ImageServiceError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ImageServiceError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ImageServiceError::Multipart(err) => write!(f, "Multipart error: {}", err),
            ImageServiceError::Upload(msg) => write!(f, "Upload error: {}", msg),
            ImageServiceError::Processing(msg) => write!(f, "Image processing error: {}", msg),
            ImageServiceError::Io(err) => write!(f, "IO error: {}", err),
            ImageServiceError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ImageServiceError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ImageServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageServiceError::Multipart(err) => Some(err),
            ImageServiceError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl IntoResponse for ImageServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ImageServiceError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ImageServiceError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ImageServiceError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ImageServiceError::Multipart(err) => (err.status(), err.body_text()),
            ImageServiceError::Upload(msg) => {
                tracing::error!(error = %msg, "Failed to save upload");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error saving image".into(),
                )
            }
            ImageServiceError::Processing(msg) => {
                tracing::error!(error = %msg, "Failed to process image");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error processing image".into(),
                )
            }
            ImageServiceError::Io(err) => {
                tracing::error!(error = %err, "IO error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
            ImageServiceError::Internal(msg) | ImageServiceError::Config(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

impl From<std::io::Error> for ImageServiceError {
    fn from(err: std::io::Error) -> Self {
        ImageServiceError::Io(Box::new(err))
    }
}

impl From<image::ImageError> for ImageServiceError {
    fn from(err: image::ImageError) -> Self {
        ImageServiceError::Processing(err.to_string())
    }
}

impl From<MultipartError> for ImageServiceError {
    fn from(err: MultipartError) -> Self {
        ImageServiceError::Multipart(err)
    }
}

impl From<tokio::task::JoinError> for ImageServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ImageServiceError::Internal(format!("Blocking task failed: {}", err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ImageServiceError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ImageServiceError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ImageServiceError>;
