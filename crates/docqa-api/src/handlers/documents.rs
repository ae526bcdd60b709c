//! Document management handlers
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use docqa_core::{DocumentChunk, DocumentRecord, RetrievalResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const MAX_PAGE_SIZE: u32 = 100;

/// Document information
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentInfo {
    /// Document UUID
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,

    /// Document title
    #[schema(example = "employee_handbook.pdf")]
    pub title: String,

    /// Lifecycle state: registered, indexed or failed
    #[schema(example = "indexed")]
    pub status: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DocumentRecord> for DocumentInfo {
    fn from(doc: DocumentRecord) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            status: doc.status.to_string(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

/// Document list response
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentListResponse {
    /// Documents on this page, newest first
    pub documents: Vec<DocumentInfo>,

    /// Current page
    pub page: u32,

    /// Page size
    pub page_size: u32,
}

/// Query parameters for document listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListDocumentsQuery {
    /// Page number (1-indexed)
    #[param(default = 1)]
    pub page: Option<u32>,

    /// Items per page
    #[param(default = 20)]
    pub page_size: Option<u32>,
}

/// List documents
#[utoipa::path(
    get,
    path = "/api/v1/documents",
    tag = "documents",
    params(ListDocumentsQuery),
    responses(
        (status = 200, description = "Document list", body = DocumentListResponse)
    )
)]
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDocumentsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, MAX_PAGE_SIZE);
    let offset = i64::from(page - 1) * i64::from(page_size);

    let documents = state
        .service
        .list_documents(i64::from(page_size), offset)
        .await?
        .into_iter()
        .map(DocumentInfo::from)
        .collect();

    Ok(Json(DocumentListResponse {
        documents,
        page,
        page_size,
    }))
}

/// Get single document by ID
#[utoipa::path(
    get,
    path = "/api/v1/documents/{id}",
    tag = "documents",
    params(
        ("id" = Uuid, Path, description = "Document UUID")
    ),
    responses(
        (status = 200, description = "Document details", body = DocumentInfo),
        (status = 404, description = "Document not found", body = crate::error::ApiError)
    )
)]
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let doc = state.service.get_document(id).await?;
    Ok(Json(DocumentInfo::from(doc)))
}

/// Register document request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDocumentRequest {
    /// Document title
    #[schema(example = "employee_handbook.pdf")]
    pub title: String,
}

/// Register a new document
#[utoipa::path(
    post,
    path = "/api/v1/documents",
    tag = "documents",
    request_body = CreateDocumentRequest,
    responses(
        (status = 201, description = "Document registered", body = DocumentInfo),
        (status = 400, description = "Invalid request", body = crate::error::ApiError)
    )
)]
pub async fn create_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let doc = state.service.register_document(&req.title).await?;
    Ok((StatusCode::CREATED, Json(DocumentInfo::from(doc))))
}

/// Delete document response
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteDocumentResponse {
    pub message: String,
}

/// Delete a document with its chunks and index
#[utoipa::path(
    delete,
    path = "/api/v1/documents/{id}",
    tag = "documents",
    params(
        ("id" = Uuid, Path, description = "Document UUID")
    ),
    responses(
        (status = 200, description = "Document deleted", body = DeleteDocumentResponse),
        (status = 404, description = "Document not found", body = crate::error::ApiError)
    )
)]
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.service.delete_document(id).await?;

    Ok(Json(DeleteDocumentResponse {
        message: format!("Document {id} deleted"),
    }))
}

// ============================================================================
// Indexing
// ============================================================================

/// Index request carrying the document's extracted text
#[derive(Debug, Deserialize, ToSchema)]
pub struct IndexDocumentRequest {
    /// Plain text extracted from the uploaded file
    pub text: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IndexDocumentResponse {
    pub document_id: Uuid,
    #[schema(example = 42)]
    pub chunks_indexed: usize,
}

/// Chunk and index a document's text, replacing any previous index
#[utoipa::path(
    post,
    path = "/api/v1/documents/{id}/index",
    tag = "documents",
    params(
        ("id" = Uuid, Path, description = "Document UUID")
    ),
    request_body = IndexDocumentRequest,
    responses(
        (status = 200, description = "Document indexed", body = IndexDocumentResponse),
        (status = 404, description = "Document not found", body = crate::error::ApiError),
        (status = 422, description = "No usable text", body = crate::error::ApiError)
    )
)]
pub async fn index_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<IndexDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let chunks_indexed = state.service.index_document(id, &req.text).await?;

    Ok(Json(IndexDocumentResponse {
        document_id: id,
        chunks_indexed,
    }))
}

/// Stored chunk
#[derive(Debug, Serialize, ToSchema)]
pub struct ChunkInfo {
    pub id: Uuid,
    /// Position of the chunk's vector in the document index
    pub chunk_index: u32,
    pub content: String,
}

impl From<DocumentChunk> for ChunkInfo {
    fn from(chunk: DocumentChunk) -> Self {
        Self {
            id: chunk.id,
            chunk_index: chunk.chunk_index,
            content: chunk.content,
        }
    }
}

/// List a document's chunks in index order
#[utoipa::path(
    get,
    path = "/api/v1/documents/{id}/chunks",
    tag = "documents",
    params(
        ("id" = Uuid, Path, description = "Document UUID")
    ),
    responses(
        (status = 200, description = "Chunks in index order", body = [ChunkInfo]),
        (status = 404, description = "Document not found", body = crate::error::ApiError)
    )
)]
pub async fn list_chunks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let chunks: Vec<ChunkInfo> = state
        .service
        .chunks(id)
        .await?
        .into_iter()
        .map(ChunkInfo::from)
        .collect();
    Ok(Json(chunks))
}

// ============================================================================
// Search
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    #[schema(example = "How many vacation days do employees get?")]
    pub question: String,

    /// Number of chunks to return, at most 100; defaults to the configured top-k
    #[schema(example = 5, maximum = 100)]
    pub top_k: Option<usize>,
}

/// One ranked chunk
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResult {
    pub vector_id: usize,
    #[schema(example = 0.83)]
    pub similarity: f32,
    pub text: String,
    pub preview: String,
}

impl From<RetrievalResult> for SearchResult {
    fn from(result: RetrievalResult) -> Self {
        Self {
            vector_id: result.vector_id,
            similarity: result.similarity,
            text: result.text,
            preview: result.preview,
        }
    }
}

/// Rank a document's chunks against a question without generating an answer
#[utoipa::path(
    post,
    path = "/api/v1/documents/{id}/search",
    tag = "documents",
    params(
        ("id" = Uuid, Path, description = "Document UUID")
    ),
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Chunks, most similar first", body = [SearchResult]),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 404, description = "Document not found", body = crate::error::ApiError),
        (status = 409, description = "Document not indexed", body = crate::error::ApiError)
    )
)]
pub async fn search_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let top_k = req.top_k.unwrap_or_else(|| state.service.default_top_k());
    let results: Vec<SearchResult> = state
        .service
        .retrieve(id, &req.question, top_k)
        .await?
        .into_iter()
        .map(SearchResult::from)
        .collect();
    Ok(Json(results))
}
