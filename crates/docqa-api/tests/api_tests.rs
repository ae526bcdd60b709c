//! API Integration Tests
//!
//! The router runs against an in-memory metadata store, a hashing embedder,
//! a stub language model and index artifacts in a temp directory.
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use docqa_api::{create_router, state::AppState};
use docqa_core::{AppConfig, InMemoryMetadataStore, LlmClient, Prompt, Result};
use docqa_rag::DocumentQaService;
use docqa_vector::{HashingEmbedding, IndexStore};
use serde_json::{json, Value};
use tower::ServiceExt;

const HANDBOOK: &str = "The office opens at nine in the morning. \
Employees receive twenty vacation days per year. \
Expense reports are due on the fifth of each month.";

struct StubLlm;

#[async_trait]
impl LlmClient for StubLlm {
    async fn generate(&self, _prompt: &Prompt) -> Result<String> {
        Ok("Employees receive twenty vacation days per year.".to_string())
    }

    fn model(&self) -> &str {
        "stub"
    }
}

fn test_app(dir: &tempfile::TempDir) -> Router {
    let mut config = AppConfig::default();
    config.rag.chunk_size = 60;
    config.rag.chunk_overlap = 0;

    let service = DocumentQaService::new(
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(HashingEmbedding::new(256)),
        Arc::new(StubLlm),
        IndexStore::new(dir.path()),
        &config.rag,
    );
    create_router(Arc::new(AppState::new(config, Arc::new(service))))
}

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn register(app: &Router, title: &str) -> String {
    let (status, json) = send(
        app,
        create_json_request("POST", "/api/v1/documents", Some(json!({ "title": title }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

async fn register_and_index(app: &Router) -> String {
    let id = register(app, "handbook.pdf").await;
    let (status, json) = send(
        app,
        create_json_request(
            "POST",
            &format!("/api/v1/documents/{id}/index"),
            Some(json!({ "text": HANDBOOK })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["chunks_indexed"], 3);
    id
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, json) = send(&app, create_json_request("GET", "/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, json) = send(&app, create_json_request("GET", "/ready", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["database"], true);
    assert_eq!(json["checks"]["llm_model"], "gpt-4o-mini");
}

#[tokio::test]
async fn test_metrics_counts_requests() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    send(&app, create_json_request("GET", "/health", None)).await;
    let (status, json) = send(&app, create_json_request("GET", "/metrics", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["uptime_seconds"].is_number());
    assert!(json["total_requests"].as_u64().unwrap() >= 2);
    assert_eq!(json["endpoints"]["GET /health"]["count"], 1);
    assert_eq!(json["endpoints"]["GET /health"]["status_counts"]["200"], 1);
}

#[tokio::test]
async fn test_openapi_document_served() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, json) = send(
        &app,
        create_json_request("GET", "/api-docs/openapi.json", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/v1/questions/ask"].is_object());
    assert!(json["paths"]["/api/v1/documents/{id}/index"].is_object());
}

// =============================================================================
// Document API Tests
// =============================================================================

#[tokio::test]
async fn test_register_and_get_document() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let id = register(&app, "policy.pdf").await;

    let (status, json) = send(
        &app,
        create_json_request("GET", &format!("/api/v1/documents/{id}"), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "policy.pdf");
    assert_eq!(json["status"], "registered");
}

#[tokio::test]
async fn test_register_blank_title_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, json) = send(
        &app,
        create_json_request("POST", "/api/v1/documents", Some(json!({ "title": "  " }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_get_unknown_document() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, json) = send(
        &app,
        create_json_request(
            "GET",
            "/api/v1/documents/550e8400-e29b-41d4-a716-446655440000",
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn test_list_documents_with_pagination() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    for title in ["a.txt", "b.txt", "c.txt"] {
        register(&app, title).await;
    }

    let (status, json) = send(
        &app,
        create_json_request("GET", "/api/v1/documents?page=1&page_size=2", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["page"], 1);
    assert_eq!(json["page_size"], 2);
    assert_eq!(json["documents"].as_array().unwrap().len(), 2);

    let (_, json) = send(
        &app,
        create_json_request("GET", "/api/v1/documents?page=2&page_size=2", None),
    )
    .await;
    assert_eq!(json["documents"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_index_and_list_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let id = register_and_index(&app).await;

    let (status, json) = send(
        &app,
        create_json_request("GET", &format!("/api/v1/documents/{id}/chunks"), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let chunks = json.as_array().unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0]["chunk_index"], 0);
    assert_eq!(
        chunks[0]["content"],
        "The office opens at nine in the morning."
    );

    let (_, doc) = send(
        &app,
        create_json_request("GET", &format!("/api/v1/documents/{id}"), None),
    )
    .await;
    assert_eq!(doc["status"], "indexed");
}

#[tokio::test]
async fn test_index_blank_text_is_unprocessable() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let id = register(&app, "scan.pdf").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            &format!("/api/v1/documents/{id}/index"),
            Some(json!({ "text": " \n\n " })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "EMPTY_EXTRACTION");
}

#[tokio::test]
async fn test_search_document() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let id = register_and_index(&app).await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            &format!("/api/v1/documents/{id}/search"),
            Some(json!({
                "question": "Expense reports are due on the fifth of each month.",
                "top_k": 2
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = json.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["vector_id"], 2);
    assert!(results[0]["preview"].is_string());
}

#[tokio::test]
async fn test_oversized_top_k_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let id = register_and_index(&app).await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            &format!("/api/v1/documents/{id}/search"),
            Some(json!({ "question": "Expense reports?", "top_k": u64::MAX })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");

    let (status, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/questions/ask",
            Some(json!({ "document_id": id, "question": "Expense reports?", "top_k": 101 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The server keeps serving afterwards
    let (status, _) = send(&app, create_json_request("GET", "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_delete_document() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let id = register_and_index(&app).await;

    let (status, _) = send(
        &app,
        create_json_request("DELETE", &format!("/api/v1/documents/{id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        create_json_request("GET", &format!("/api/v1/documents/{id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

// =============================================================================
// Question API Tests
// =============================================================================

#[tokio::test]
async fn test_ask_before_indexing_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let id = register(&app, "pending.pdf").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/questions/ask",
            Some(json!({ "document_id": id, "question": "Vacation?" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INDEX_NOT_FOUND");
}

#[tokio::test]
async fn test_ask_answers_with_sources() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let id = register_and_index(&app).await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/questions/ask",
            Some(json!({
                "document_id": id,
                "question": "Employees receive twenty vacation days per year.",
                "top_k": 2
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "answered");
    assert_eq!(
        json["answer"],
        "Employees receive twenty vacation days per year."
    );
    let sources = json["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["chunk_index"], 1);
    assert!(json["processing_time_ms"].is_number());
}

#[tokio::test]
async fn test_ask_empty_question() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);
    let id = register_and_index(&app).await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/questions/ask",
            Some(json!({ "document_id": id, "question": "   " })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_ask_unknown_document() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let (status, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/questions/ask",
            Some(json!({
                "document_id": "550e8400-e29b-41d4-a716-446655440000",
                "question": "Anything?"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
