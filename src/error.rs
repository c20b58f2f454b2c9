use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// The durable store could not persist, read or delete an entry.
///
/// Never retried automatically: a caller that loses one of these during
/// `submit` must tell the user the entry was not saved.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("entry {id} has a corrupt payload: {source}")]
    CorruptPayload {
        id: i64,
        #[source]
        source: serde_json::Error,
    },
}

/// A delivery attempt failed. Every variant is retryable.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("endpoint responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
}

/// Background sync could not be registered. Logged and ignored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("background sync is not available for this queue")]
    Unsupported,
    #[error("background sync worker is not running")]
    Closed,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Storage Error: {0}")]
    Storage(#[from] StorageError),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Storage(err) => AppError::Storage(err),
            QueueError::Payload(err) => AppError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Storage(err) => {
                tracing::error!("Storage error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Entry not saved".to_string(),
                )
            }
        };

        let body = json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
