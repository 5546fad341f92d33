// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::convert::Infallible;

use axum::{
    extract::State,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use quarry_model::{ChatMessage, ChatRequest};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: bool,
}

/// POST /chat/completions — thin non-agent passthrough to the chat
/// provider.  With `stream: true` the deltas arrive as SSE events.
pub async fn completions(
    State(state): State<AppState>,
    Json(req): Json<CompletionRequest>,
) -> Result<Response, ApiError> {
    if req.messages.is_empty() {
        return Err(ApiError::BadRequest("messages must not be empty".into()));
    }

    let mut chat_req = ChatRequest::new(req.messages).with_model(req.model);
    if let Some(mt) = req.max_tokens {
        chat_req = chat_req.with_max_tokens(mt);
    }
    if let Some(t) = req.temperature {
        chat_req = chat_req.with_temperature(t);
    }

    if !req.stream {
        let content = state.chat.complete(chat_req).await?;
        return Ok(Json(json!({ "content": content })).into_response());
    }

    let deltas = state.chat.stream(chat_req).await?;
    let stream = deltas.map(|delta| {
        let event = match delta {
            Ok(text) => Event::default().event("delta").data(text),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Ok::<_, Infallible>(event)
    });
    Ok(Sse::new(stream)
        .keep_alive(axum::response::sse::KeepAlive::default())
        .into_response())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
