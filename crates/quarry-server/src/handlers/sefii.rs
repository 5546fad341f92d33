// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use quarry_index::{IngestRequest, RetrieveRequest, RetrievedChunk};

use crate::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub chunks_ingested: usize,
}

/// Retrieve response: ranked chunks, or whole documents when
/// `return_full_docs` was set.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RetrieveResponse {
    Chunks { chunks: Vec<RetrievedChunk> },
    Documents { documents: BTreeMap<String, Vec<String>> },
}

#[derive(Debug, Deserialize)]
pub struct CombinedRetrieveRequest {
    #[serde(flatten)]
    pub retrieve: RetrieveRequest,
    #[serde(default)]
    pub return_full_docs: bool,
}

/// POST /sefii/ingest
pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    if req.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".into()));
    }
    if req.file_path.trim().is_empty() {
        return Err(ApiError::BadRequest("file_path must not be empty".into()));
    }
    let chunks_ingested = state.sefii.ingest(req).await?;
    Ok(Json(IngestResponse { chunks_ingested }))
}

/// POST /sefii/combined-retrieve
pub async fn combined_retrieve(
    State(state): State<AppState>,
    Json(req): Json<CombinedRetrieveRequest>,
) -> Result<Json<RetrieveResponse>, ApiError> {
    let chunks = state.sefii.retrieve(req.retrieve).await?;
    if !req.return_full_docs {
        return Ok(Json(RetrieveResponse::Chunks { chunks }));
    }
    let ids: Vec<i64> = chunks.iter().map(|c| c.id).collect();
    let documents = state.sefii.documents_for_chunks(&ids).await?;
    Ok(Json(RetrieveResponse::Documents { documents }))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_request_flattens_retrieve_fields() {
        let req: CombinedRetrieveRequest = serde_json::from_str(
            r#"{
                "query": "beta",
                "use_inverted_index": true,
                "use_vector_search": false,
                "merge_mode": "union",
                "limit": 5,
                "return_full_docs": true
            }"#,
        )
        .unwrap();
        assert_eq!(req.retrieve.query, "beta");
        assert!(req.return_full_docs);
        assert!(req.retrieve.use_inverted_index);
    }

    #[test]
    fn merge_mode_defaults_to_union() {
        let req: CombinedRetrieveRequest = serde_json::from_str(
            r#"{"query": "q", "use_inverted_index": false, "use_vector_search": true}"#,
        )
        .unwrap();
        assert_eq!(req.retrieve.merge_mode, quarry_index::MergeMode::Union);
    }

    #[test]
    fn chunks_response_serializes_flat() {
        let resp = RetrieveResponse::Chunks { chunks: vec![] };
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v.get("chunks").is_some());
    }
}
