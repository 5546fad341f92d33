// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use quarry_agent::{AgentEvent, AgentStep};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ReactRequest {
    pub objective: String,
    #[serde(default)]
    pub max_steps: Option<u32>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReactResponse {
    pub session_id: Uuid,
    pub trace: Vec<AgentStep>,
    pub result: String,
    pub completed: bool,
}

fn validate(req: &ReactRequest) -> Result<(), ApiError> {
    if req.objective.trim().is_empty() {
        return Err(ApiError::BadRequest("objective must not be empty".into()));
    }
    Ok(())
}

/// POST /agents/react — run one session to completion.
///
/// The session runs inside this request future; a client disconnect
/// drops it, cancelling in-flight provider calls at the next await.
pub async fn react(
    State(state): State<AppState>,
    Json(req): Json<ReactRequest>,
) -> Result<Json<ReactResponse>, ApiError> {
    validate(&req)?;
    debug!(objective = %req.objective, "react session requested");

    let session = state
        .engine
        .run_session(&req.objective, req.max_steps, req.model)
        .await?;
    Ok(Json(ReactResponse {
        session_id: session.id,
        trace: session.trace,
        result: session.result,
        completed: session.completed,
    }))
}

/// POST /agents/react/stream — as above, but each step is emitted as
/// one SSE event while the session runs.
///
/// Single producer (the engine task), single consumer (this stream).
/// Dropping the response drops the cancel guard and the event receiver;
/// the engine notices at the next step boundary and stops.
pub async fn react_stream(
    State(state): State<AppState>,
    Json(req): Json<ReactRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    validate(&req)?;
    debug!(objective = %req.objective, "streaming react session requested");

    let (events_tx, mut events_rx) = mpsc::channel::<AgentEvent>(16);
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

    let engine = state.engine.clone();
    let objective = req.objective.clone();
    tokio::spawn(async move {
        let _ = engine
            .run_session_with_events(&objective, req.max_steps, req.model, events_tx, cancel_rx)
            .await;
    });

    let stream = async_stream::stream! {
        // Held for the lifetime of the response: dropping the stream
        // closes the channel, which cancels the engine loop.
        let _cancel_guard = cancel_tx;
        while let Some(event) = events_rx.recv().await {
            let (name, done) = match &event {
                AgentEvent::Step { .. } => ("step", false),
                AgentEvent::Done { .. } => ("done", true),
            };
            let sse = Event::default()
                .event(name)
                .json_data(&event)
                .unwrap_or_else(|_| Event::default().event("error").data("serialization failed"));
            yield Ok::<_, Infallible>(sse);
            if done {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_deserializes_with_defaults() {
        let req: ReactRequest = serde_json::from_value(json!({
            "objective": "Add 2 and 3 using code_eval",
            "max_steps": 5,
        }))
        .unwrap();
        assert_eq!(req.max_steps, Some(5));
        assert!(req.model.is_none());
    }

    #[test]
    fn empty_objective_fails_validation() {
        let req = ReactRequest {
            objective: "   ".into(),
            max_steps: None,
            model: None,
        };
        assert!(validate(&req).is_err());
    }
}
