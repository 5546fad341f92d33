// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use quarry_sandbox::Language;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct EvalRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Only `result` and `error` are exposed; the raw streams stay inside
/// the server for logs.
#[derive(Debug, Serialize)]
pub struct EvalResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /code/eval
pub async fn eval(
    State(state): State<AppState>,
    Json(req): Json<EvalRequest>,
) -> Result<Json<EvalResponse>, ApiError> {
    let language = Language::parse(&req.language)?;
    let outcome = state
        .sandbox
        .run(language, &req.code, &req.dependencies)
        .await?;

    tracing::debug!(
        exit_code = outcome.exit_code,
        duration_ms = outcome.duration_ms,
        truncated = outcome.truncated,
        "code eval finished"
    );

    Ok(Json(match outcome.error {
        None => EvalResponse {
            result: Some(outcome.result),
            error: None,
        },
        Some(error) => EvalResponse {
            result: None,
            error: Some(error),
        },
    }))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_dependencies_empty() {
        let req: EvalRequest =
            serde_json::from_str(r#"{"language":"python","code":"print(1)"}"#).unwrap();
        assert!(req.dependencies.is_empty());
    }

    #[test]
    fn response_omits_absent_fields() {
        let resp = EvalResponse {
            result: Some("5\n".into()),
            error: None,
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v.get("error").is_none());
        assert_eq!(v["result"], "5\n");
    }
}
