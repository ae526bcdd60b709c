//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::{documents, query};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Document endpoints
        .route(
            "/documents",
            get(documents::list_documents).post(documents::create_document),
        )
        .route(
            "/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/documents/:id/index", post(documents::index_document))
        .route("/documents/:id/chunks", get(documents::list_chunks))
        .route("/documents/:id/search", post(documents::search_document))
        // Question answering
        .route("/questions/ask", post(query::ask_handler))
}
