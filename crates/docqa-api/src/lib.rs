//! docqa API - REST server for document question answering
//!
//! Exposes document registration, indexing, retrieval and question
//! answering over HTTP, with health probes, JSON metrics and an OpenAPI
//! document served through Swagger UI.
//!
//! Author: hephaex@gmail.com

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{extract::DefaultBodyLimit, http::HeaderValue, routing::get, Router};
use docqa_core::ServerConfig;
use handlers::{documents, health, query};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "docqa API",
        description = "Question answering over uploaded documents"
    ),
    paths(
        health::health_check,
        health::readiness_check,
        documents::list_documents,
        documents::create_document,
        documents::get_document,
        documents::delete_document,
        documents::index_document,
        documents::list_chunks,
        documents::search_document,
        query::ask_handler,
    ),
    components(schemas(
        error::ApiError,
        health::HealthResponse,
        health::BuildInfo,
        health::ReadinessResponse,
        health::ReadinessChecks,
        documents::DocumentInfo,
        documents::DocumentListResponse,
        documents::CreateDocumentRequest,
        documents::DeleteDocumentResponse,
        documents::IndexDocumentRequest,
        documents::IndexDocumentResponse,
        documents::ChunkInfo,
        documents::SearchRequest,
        documents::SearchResult,
        query::AskRequest,
        query::AskResponse,
        query::SourceInfo,
    )),
    tags(
        (name = "health", description = "Liveness and readiness probes"),
        (name = "documents", description = "Document registration, indexing and search"),
        (name = "questions", description = "Context-constrained question answering")
    )
)]
pub struct ApiDoc;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;
    let body_limit = DefaultBodyLimit::max(server.max_body_size);
    let cors = server.cors_enabled.then(|| cors_layer(server));

    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .nest("/api/v1", routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || server.cors_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}
