// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One step of the ReAct loop.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStep {
    /// 1-based, dense, monotonic within a session.
    pub index: u32,
    pub thought: String,
    /// Tool name, or `finish` for terminal steps (including the
    /// parse-fallback path).
    pub action: String,
    /// Raw action input as emitted by the model, typically JSON.
    pub action_input: String,
    /// Tool output, an `error: …` conversion, or the memory-substituted
    /// rendering for oversized outputs.  Empty for terminal steps.
    pub observation: String,
}

/// One agent session: the objective, the full step trace, and the
/// terminal result.  Owned exclusively by the engine for the lifetime of
/// the request.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSession {
    pub id: Uuid,
    pub objective: String,
    pub trace: Vec<AgentStep>,
    pub result: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl AgentSession {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            objective: objective.into(),
            trace: Vec::new(),
            result: String::new(),
            completed: false,
            created_at: Utc::now(),
        }
    }

    /// Index for the next step to be appended.
    pub fn next_index(&self) -> u32 {
        self.trace.len() as u32 + 1
    }

    pub fn push_step(&mut self, step: AgentStep) {
        debug_assert_eq!(step.index, self.next_index());
        self.trace.push(step);
    }

    /// Terminate the session.  The result is set exactly once.
    pub fn finish(&mut self, result: impl Into<String>, completed: bool) {
        if self.result.is_empty() {
            self.result = result.into();
        }
        self.completed = completed;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn step(index: u32) -> AgentStep {
        AgentStep {
            index,
            thought: "t".into(),
            action: "a".into(),
            action_input: "i".into(),
            observation: "o".into(),
        }
    }

    #[test]
    fn sessions_get_unique_ids() {
        assert_ne!(AgentSession::new("x").id, AgentSession::new("x").id);
    }

    #[test]
    fn step_indices_are_dense_from_one() {
        let mut s = AgentSession::new("obj");
        assert_eq!(s.next_index(), 1);
        s.push_step(step(1));
        s.push_step(step(2));
        for (i, st) in s.trace.iter().enumerate() {
            assert_eq!(st.index as usize, i + 1);
        }
    }

    #[test]
    fn finish_sets_result_once() {
        let mut s = AgentSession::new("obj");
        s.finish("first", true);
        s.finish("second", true);
        assert_eq!(s.result, "first");
        assert!(s.completed);
    }

    #[test]
    fn completed_implies_result_set() {
        let mut s = AgentSession::new("obj");
        s.finish("done", true);
        assert!(s.completed);
        assert!(!s.result.is_empty());
    }

    #[test]
    fn session_serializes_with_trace() {
        let mut s = AgentSession::new("obj");
        s.push_step(step(1));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["trace"][0]["index"], 1);
        assert_eq!(json["objective"], "obj");
    }
}
