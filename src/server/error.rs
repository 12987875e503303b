//! Error types for the server

use crate::error::TripcastError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Deployed artifacts disagree with each other or with the request schema
    #[error("Artifact contract violated: {0}")]
    ArtifactContract(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TripcastError> for ServerError {
    fn from(err: TripcastError) -> Self {
        match err {
            TripcastError::Validation(msg) => ServerError::BadRequest(msg),
            TripcastError::NotFound(msg) => ServerError::NotFound(msg),
            e @ TripcastError::SchemaMismatch { .. } => ServerError::ArtifactContract(e.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::ArtifactContract(msg) => {
                tracing::error!(detail = %msg, "Artifact contract violated");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Deployed artifacts are inconsistent: {}", msg),
                )
            }
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
