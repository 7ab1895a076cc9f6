use crate::db::StoreError;
use crate::services::converter::ConversionError;
use crate::services::importer::ImportError;
use crate::services::recovery::RecoveryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("this chapter is password protected")]
    Forbidden,
    #[error("upload failed: {0}")]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StoryNotFound(_) => ApiError::NotFound,
            StoreError::Database(e) => ApiError::Database(e),
        }
    }
}

impl From<RecoveryError> for ApiError {
    fn from(err: RecoveryError) -> Self {
        match err {
            RecoveryError::Database(e) => ApiError::Database(e),
            RecoveryError::Hash(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": self.to_string() })),
            ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
            }
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                json!({ "error": self.to_string(), "locked": true }),
            ),
            ApiError::Conversion(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": self.to_string() }),
            ),
            ApiError::Import(err) => {
                tracing::error!(error = %err, "Import stopped part-way");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": err.source.to_string(),
                        "chapter": err.title,
                        "created": err.created,
                    }),
                )
            }
            ApiError::Internal(_) => {
                tracing::error!(error = %self, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": self.to_string() }),
                )
            }
            ApiError::Database(_) => {
                tracing::error!(error = %self, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}
