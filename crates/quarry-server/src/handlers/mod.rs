// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod agents;
pub mod chat;
pub mod code;
pub mod memory;
pub mod sefii;

use axum::Json;
use serde_json::{json, Value};

/// GET /healthz — liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
