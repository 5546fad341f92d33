// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API-level error.  Serialized as `{"error": "..."}` with the mapped
/// status code.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    /// A core dependency (database, chat provider) failed.
    Internal(String),
    /// An external provider refused or misbehaved.
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
            Self::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<quarry_agent::EngineError> for ApiError {
    fn from(e: quarry_agent::EngineError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<quarry_model::ModelError> for ApiError {
    fn from(e: quarry_model::ModelError) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl From<quarry_index::IndexError> for ApiError {
    fn from(e: quarry_index::IndexError) -> Self {
        match e {
            quarry_index::IndexError::UnreadableContent => Self::BadRequest(e.to_string()),
            quarry_index::IndexError::Model(e) => Self::Upstream(e.to_string()),
            quarry_index::IndexError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<quarry_memory::MemoryError> for ApiError {
    fn from(e: quarry_memory::MemoryError) -> Self {
        match e {
            quarry_memory::MemoryError::UnreadableContent => Self::BadRequest(e.to_string()),
            quarry_memory::MemoryError::Model(e) => Self::Upstream(e.to_string()),
            quarry_memory::MemoryError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<quarry_sandbox::SandboxError> for ApiError {
    fn from(e: quarry_sandbox::SandboxError) -> Self {
        match e {
            quarry_sandbox::SandboxError::UnknownLanguage(_)
            | quarry_sandbox::SandboxError::InvalidDependency(_) => {
                Self::BadRequest(e.to_string())
            }
            quarry_sandbox::SandboxError::Launch(_) => Self::Internal(e.to_string()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
