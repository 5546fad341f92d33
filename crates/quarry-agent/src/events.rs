// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::Serialize;

use crate::AgentStep;

/// Events emitted by the engine for streaming consumers.  One `Step`
/// per persisted step, then exactly one `Done`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Step { step: AgentStep },
    Done { result: String, completed: bool },
}
