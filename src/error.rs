use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// The live document could not be read; nothing was written
    #[error("Metadata store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Timed out while {0}")]
    Timeout(String),

    /// A concurrent writer changed the document, or a unique field is taken
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid backup: {0}")]
    InvalidBackup(String),

    #[error("Backup not found")]
    BackupNotFound,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid signature")]
    InvalidSignature,
}

/// Implement IntoResponse to convert AppError into HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Migration(ref e) => {
                tracing::error!("Migration error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Io(ref e) => {
                tracing::error!("I/O error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Serialization(ref e) => {
                tracing::error!("Serialization error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::ObjectStore(ref e) => {
                tracing::error!("Object store error: {}", e);
                (StatusCode::BAD_GATEWAY, "Object store request failed".to_string())
            }
            AppError::StoreUnavailable(ref e) => {
                tracing::error!("Metadata store unavailable: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Metadata store unavailable".to_string(),
                )
            }
            AppError::Timeout(ref what) => {
                tracing::error!("Timed out while {}", what);
                (StatusCode::GATEWAY_TIMEOUT, "Storage request timed out".to_string())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InvalidBackup(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::BackupNotFound => (StatusCode::NOT_FOUND, "Backup not found".to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::InvalidSignature => (
                StatusCode::FORBIDDEN,
                "Invalid or expired signature".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;
