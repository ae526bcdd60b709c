//! docqa API Server
//!
//! REST API server for document question answering.
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use docqa_api::{create_router, state::AppState};
use docqa_core::{AppConfig, LoggingConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration file from DOCQA_CONFIG, environment on top
    let config = match std::env::var("DOCQA_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)
            .and_then(AppConfig::with_env_override)
            .with_context(|| format!("loading configuration from {path}"))?,
        Err(_) => AppConfig::from_env().context("loading configuration from environment")?,
    };

    init_tracing(&config.logging);

    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(AppState::initialize(config).await?);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("docqa API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("docqa API Server stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},tower_http=info", logging.level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
