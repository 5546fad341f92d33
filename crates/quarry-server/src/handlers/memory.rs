// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quarry_memory::{MemoryNote, MemoryStore};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub content: String,
    /// Session scope; omitted → global memory (nil id).
    #[serde(default)]
    pub workflow_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub workflow_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<MemoryNote>,
}

fn require_memory(state: &AppState) -> Result<Arc<MemoryStore>, ApiError> {
    state
        .memory
        .clone()
        .ok_or_else(|| ApiError::Forbidden("agentic memory is disabled".into()))
}

/// POST /agentic-memory/ingest
pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let memory = require_memory(&state)?;
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".into()));
    }
    let id = memory
        .ingest(req.workflow_id.unwrap_or_else(Uuid::nil), &req.content)
        .await?;
    Ok(Json(IngestResponse { id }))
}

/// POST /agentic-memory/search
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let memory = require_memory(&state)?;
    let results = memory
        .search_within_session(
            req.workflow_id.unwrap_or_else(Uuid::nil),
            &req.query,
            req.limit,
        )
        .await?;
    Ok(Json(SearchResponse { results }))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
