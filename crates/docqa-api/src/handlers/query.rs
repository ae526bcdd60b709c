//! Question answering handler
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use docqa_rag::AnswerSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use utoipa::ToSchema;
use uuid::Uuid;

/// Question about one document
#[derive(Debug, Deserialize, ToSchema)]
pub struct AskRequest {
    /// Document to answer from
    pub document_id: Uuid,

    /// User's question
    #[schema(example = "How many vacation days do employees get?")]
    pub question: String,

    /// Maximum number of chunks to retrieve, at most 100
    #[serde(default = "default_top_k")]
    #[schema(example = 5, default = 5, maximum = 100)]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

/// Chunk the answer was drawn from
#[derive(Debug, Serialize, ToSchema)]
pub struct SourceInfo {
    pub chunk_id: Uuid,
    pub chunk_index: u32,
    #[schema(example = 0.91)]
    pub similarity: f32,
    pub preview: String,
}

impl From<AnswerSource> for SourceInfo {
    fn from(source: AnswerSource) -> Self {
        Self {
            chunk_id: source.chunk_id,
            chunk_index: source.chunk_index,
            similarity: source.similarity,
            preview: source.preview,
        }
    }
}

/// Answer response body
#[derive(Debug, Serialize, ToSchema)]
pub struct AskResponse {
    /// Generated answer, a fixed no-context message, or an error excerpt
    pub answer: String,

    /// One of answered, no_context or degraded
    #[schema(example = "answered")]
    pub outcome: String,

    /// Retrieved chunks placed in the prompt
    pub sources: Vec<SourceInfo>,

    /// Processing time in milliseconds
    #[schema(example = 1250)]
    pub processing_time_ms: u64,
}

/// Answer a question from a document's indexed chunks
#[utoipa::path(
    post,
    path = "/api/v1/questions/ask",
    tag = "questions",
    request_body = AskRequest,
    responses(
        (status = 200, description = "Answer produced", body = AskResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 404, description = "Document not found", body = crate::error::ApiError),
        (status = 409, description = "Document not indexed", body = crate::error::ApiError)
    )
)]
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let start = Instant::now();

    if req.question.trim().is_empty() {
        return Err(AppError::BadRequest("Question cannot be empty".to_string()));
    }

    let answer = state
        .service
        .ask(req.document_id, &req.question, req.top_k)
        .await?;

    let outcome = answer.outcome.kind().to_string();
    Ok(Json(AskResponse {
        answer: answer.outcome.into_text(),
        outcome,
        sources: answer.sources.into_iter().map(SourceInfo::from).collect(),
        processing_time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    }))
}
