use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Library not found: {0}")]
    LibraryNotFound(Uuid),

    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(Uuid),

    #[error("Query dimension mismatch. Expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Library not indexed. Please build an index first.")]
    IndexMissing,

    #[error("Index needs rebuilding. Set rebuild_if_needed=true or rebuild manually.")]
    IndexRebuildNeeded,

    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::LibraryNotFound(_)
            | AppError::DocumentNotFound(_)
            | AppError::ChunkNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::DimensionMismatch { .. }
            | AppError::IndexMissing
            | AppError::IndexRebuildNeeded
            | AppError::UnknownAlgorithm(_)
            | AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Provider(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
