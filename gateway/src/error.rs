//! Error types for the gateway
//!
//! - `UpstreamError`: failures reaching a backend instance
//! - `AppError`: handler errors, rendered as JSON responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Instance unavailable: {0}")]
    Unavailable(String),

    #[error("No upstream instances configured")]
    NoInstances,

    #[error("Unknown upstream instance: {0}")]
    UnknownInstance(usize),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Upstream(e) => {
                tracing::error!("Error forwarding to upstream: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Internal Server Error",
                    e.to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", msg.clone()),
        };

        (status, Json(ErrorResponse { error, message })).into_response()
    }
}
