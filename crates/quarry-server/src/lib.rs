// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! HTTP surface of the application server.
//!
//! Thin axum handlers over the subsystem crates.  Error bodies are
//! always `{"error": "..."}`; 4xx for bad input, 403 for disabled
//! features, 5xx only when a core dependency is unreachable.

mod error;
mod handlers;
mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/agents/react", post(handlers::agents::react))
        .route("/agents/react/stream", post(handlers::agents::react_stream))
        .route("/agentic-memory/ingest", post(handlers::memory::ingest))
        .route("/agentic-memory/search", post(handlers::memory::search))
        .route("/sefii/ingest", post(handlers::sefii::ingest))
        .route(
            "/sefii/combined-retrieve",
            post(handlers::sefii::combined_retrieve),
        )
        .route("/code/eval", post(handlers::code::eval))
        .route("/chat/completions", post(handlers::chat::completions))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the process is told to stop (ctrl-c).
pub async fn serve(state: AppState, listen: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(%listen, "http server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
