//! API error handling
//!
//! Domain errors are mapped to HTTP status codes here and rendered as
//! `{code, message, details?}` JSON.
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docqa_core::DocQaError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    #[schema(example = "INDEX_NOT_FOUND")]
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// The document exists but has no published index
    IndexNotFound(String),
    /// Nothing indexable was supplied
    EmptyExtraction(String),
    /// The language model could not produce an answer
    Generation(String),
    /// Index artifacts and chunk rows disagree
    Inconsistent(String),
    Internal(String),
    Database(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ApiError) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::not_found(msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::IndexNotFound(msg) => {
                (StatusCode::CONFLICT, ApiError::new("INDEX_NOT_FOUND", msg))
            }
            AppError::EmptyExtraction(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError::new("EMPTY_EXTRACTION", msg),
            ),
            AppError::Generation(msg) => (
                StatusCode::BAD_GATEWAY,
                ApiError::new("GENERATION_FAILED", "Answer generation failed").with_details(msg),
            ),
            AppError::Inconsistent(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("INDEX_INCONSISTENT", "Document index is inconsistent")
                    .with_details(msg),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal_error().with_details(msg),
            ),
            AppError::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("DATABASE_ERROR", "Database operation failed").with_details(msg),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_body();
        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                code = %error.code,
                details = error.details.as_deref().unwrap_or_default(),
                "Request failed"
            );
        }
        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<DocQaError> for AppError {
    fn from(err: DocQaError) -> Self {
        match err {
            DocQaError::DocumentNotFound(id) => AppError::NotFound(format!("Document {id} not found")),
            err @ DocQaError::IndexNotFound(_) => AppError::IndexNotFound(err.to_string()),
            err @ DocQaError::EmptyExtraction(_) => AppError::EmptyExtraction(err.to_string()),
            DocQaError::UnsupportedInput(msg) | DocQaError::ValidationError(msg) => {
                AppError::BadRequest(msg)
            }
            DocQaError::GenerationFailure(msg) => AppError::Generation(msg),
            err @ DocQaError::IndexInconsistent { .. } => AppError::Inconsistent(err.to_string()),
            DocQaError::DatabaseError(msg) => AppError::Database(msg),
            DocQaError::EmbeddingError(msg) => AppError::Internal(format!("Embedding error: {msg}")),
            DocQaError::StorageError(msg) => AppError::Internal(format!("Storage error: {msg}")),
            DocQaError::LlmError(msg) => AppError::Internal(format!("LLM error: {msg}")),
            DocQaError::ConfigError(msg) => {
                AppError::Internal(format!("Configuration error: {msg}"))
            }
            DocQaError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status_of(err: DocQaError) -> (StatusCode, String) {
        let (status, body) = AppError::from(err).status_and_body();
        (status, body.code)
    }

    #[test]
    fn test_domain_errors_map_to_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(
            status_of(DocQaError::IndexNotFound(id)),
            (StatusCode::CONFLICT, "INDEX_NOT_FOUND".to_string())
        );
        assert_eq!(
            status_of(DocQaError::DocumentNotFound(id)),
            (StatusCode::NOT_FOUND, "NOT_FOUND".to_string())
        );
        assert_eq!(
            status_of(DocQaError::EmptyExtraction(id)),
            (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_EXTRACTION".to_string())
        );
        assert_eq!(
            status_of(DocQaError::UnsupportedInput("blank chunk".into())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DocQaError::GenerationFailure("timeout".into())).0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(DocQaError::StorageError("disk full".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_details_omitted_when_absent() {
        let json = serde_json::to_value(ApiError::bad_request("nope")).unwrap();
        assert_eq!(json["code"], "BAD_REQUEST");
        assert!(json.get("details").is_none());
    }
}
