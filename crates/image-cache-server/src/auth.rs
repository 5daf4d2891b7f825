//! API token check for write endpoints

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ImageServiceError;
use crate::server::SharedState;

/// Header carrying the API token
pub const API_TOKEN_HEADER: &str = "X-API-Token";

/// Axum extractor that rejects requests without the configured API token.
///
/// Use this as a handler parameter to require authentication:
///
/// ```ignore
/// async fn my_handler(_auth: ApiToken, ...) -> Result<..., ImageServiceError> { ... }
/// ```
#[derive(Debug)]
pub struct ApiToken;

impl FromRequestParts<SharedState> for ApiToken {
    type Rejection = ImageServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(API_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ImageServiceError::Unauthorized("API token required".into()))?;

        if token != state.config.api_token {
            return Err(ImageServiceError::Unauthorized("Invalid API token".into()));
        }

        Ok(ApiToken)
    }
}
