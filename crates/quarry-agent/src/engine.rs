// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use quarry_config::AgentSettings;
use quarry_memory::MemoryStore;
use quarry_model::{ChatClient, ChatMessage, ChatRequest};
use quarry_tools::{ToolDispatcher, FINISH_TOOL};

use crate::{
    parse_react_reply,
    prompts::{
        memory_snippets_message, render_memory_substitution, render_step, system_prompt,
        NEXT_STEP_PROMPT,
    },
    AgentEvent, AgentSession, AgentStep,
};

/// Observations longer than this are folded through session memory.
const FOLD_THRESHOLD_CHARS: usize = 500;
/// Fold chunk size, in characters.
const FOLD_CHUNK_CHARS: usize = 500;
/// Memory hits substituted for a folded observation.
const FOLD_QUERY_K: usize = 30;
/// Memory snippets recalled into each step's prompt.
const SNIPPET_K: usize = 5;

/// Session-scope failures.  Everything step-scoped (tool errors, memory
/// hiccups) is converted to observations or swallowed before it gets
/// here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("chat provider failed: {0}")]
    Chat(#[from] quarry_model::ModelError),
}

/// Drives ReAct sessions.  One engine may serve many sessions; each
/// session's loop is strictly sequential.
pub struct AgentEngine {
    chat: Arc<dyn ChatClient>,
    dispatcher: Arc<ToolDispatcher>,
    memory: Option<Arc<MemoryStore>>,
    settings: AgentSettings,
    /// Tool list discovered at construction: built-ins plus every
    /// reachable MCP server's qualified names.
    tools: Vec<(String, String)>,
}

impl AgentEngine {
    /// Construct an engine, discovering tools from the dispatcher.  A
    /// server that fails discovery is simply absent from the prompt.
    pub async fn new(
        chat: Arc<dyn ChatClient>,
        dispatcher: Arc<ToolDispatcher>,
        memory: Option<Arc<MemoryStore>>,
        settings: AgentSettings,
    ) -> Self {
        let tools = dispatcher.discover_tools().await;
        Self {
            chat,
            dispatcher,
            memory,
            settings,
            tools,
        }
    }

    /// Run one session to completion and return it.
    pub async fn run_session(
        &self,
        objective: &str,
        max_steps: Option<u32>,
        model: Option<String>,
    ) -> Result<AgentSession, EngineError> {
        self.run(objective, max_steps, model, None, None).await
    }

    /// Like [`run_session`] but emits an [`AgentEvent`] after each
    /// persisted step.  When the receiver is dropped the loop exits at
    /// the next step boundary.
    pub async fn run_session_with_events(
        &self,
        objective: &str,
        max_steps: Option<u32>,
        model: Option<String>,
        events: mpsc::Sender<AgentEvent>,
        cancel: oneshot::Receiver<()>,
    ) -> Result<AgentSession, EngineError> {
        self.run(objective, max_steps, model, Some(events), Some(cancel))
            .await
    }

    async fn run(
        &self,
        objective: &str,
        max_steps: Option<u32>,
        model: Option<String>,
        events: Option<mpsc::Sender<AgentEvent>>,
        mut cancel: Option<oneshot::Receiver<()>>,
    ) -> Result<AgentSession, EngineError> {
        let max_steps = max_steps.unwrap_or(self.settings.max_steps).max(1);
        let mut session = AgentSession::new(objective);
        debug!(session = %session.id, max_steps, "agent session started");

        for _ in 0..max_steps {
            // A dropped or fired cancel sender both mean "stop": the
            // closed error arm covers the drop case.
            if let Some(rx) = cancel.as_mut() {
                match rx.try_recv() {
                    Err(oneshot::error::TryRecvError::Empty) => {}
                    _ => {
                        session.finish("Cancelled", false);
                        break;
                    }
                }
            }

            let messages = self.assemble_messages(&session).await;
            let reply = self
                .chat
                .complete(
                    ChatRequest::new(messages)
                        .with_model(model.clone())
                        .with_max_tokens(self.settings.step_max_tokens)
                        .with_temperature(self.settings.step_temperature),
                )
                .await?;

            let parsed = parse_react_reply(&reply);

            // Parse fallback: no Action header at all.  The whole reply
            // becomes the terminal answer.
            let Some(action) = parsed.action else {
                let step = AgentStep {
                    index: session.next_index(),
                    thought: parsed.thought,
                    action: FINISH_TOOL.to_string(),
                    action_input: reply.trim().to_string(),
                    observation: String::new(),
                };
                session.push_step(step.clone());
                session.finish(reply.trim().to_string(), true);
                self.persist_step(&session, &step).await;
                Self::emit(&events, AgentEvent::Step { step }).await;
                break;
            };

            if action.eq_ignore_ascii_case(FINISH_TOOL) {
                let result = if parsed.input.is_empty() {
                    parsed.thought.clone()
                } else {
                    parsed.input.clone()
                };
                let step = AgentStep {
                    index: session.next_index(),
                    thought: parsed.thought,
                    action: FINISH_TOOL.to_string(),
                    action_input: parsed.input,
                    observation: String::new(),
                };
                session.push_step(step.clone());
                session.finish(result, true);
                self.persist_step(&session, &step).await;
                Self::emit(&events, AgentEvent::Step { step }).await;
                break;
            }

            // Tool errors become observations; the model reads them and
            // recovers (or gives up on its own terms).
            let observation = match self.dispatcher.execute(&action, &parsed.input).await {
                Ok(output) => output,
                Err(e) => format!("error: {e}"),
            };
            let observation = self.fold_observation(&session, observation).await;

            let step = AgentStep {
                index: session.next_index(),
                thought: parsed.thought,
                action,
                action_input: parsed.input,
                observation,
            };
            session.push_step(step.clone());
            self.persist_step(&session, &step).await;

            if !Self::emit(&events, AgentEvent::Step { step }).await {
                // Streaming consumer went away; stop burning tokens.
                session.finish("Cancelled", false);
                break;
            }
        }

        if session.result.is_empty() {
            session.finish("Max steps reached", false);
        }
        Self::emit(
            &events,
            AgentEvent::Done {
                result: session.result.clone(),
                completed: session.completed,
            },
        )
        .await;

        debug!(
            session = %session.id,
            steps = session.trace.len(),
            completed = session.completed,
            "agent session ended"
        );
        Ok(session)
    }

    /// Ordered per-step messages: system prompt, optional memory block,
    /// prior steps as assistant turns, and the fixed user turn.
    async fn assemble_messages(&self, session: &AgentSession) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(system_prompt(
            &session.objective,
            &self.tools,
            self.settings.max_steps,
        ))];

        if let Some(memory) = &self.memory {
            match memory
                .search_within_session(session.id, &session.objective, SNIPPET_K)
                .await
            {
                Ok(notes) => {
                    if let Some(block) = memory_snippets_message(&notes) {
                        messages.push(ChatMessage::system(block));
                    }
                }
                Err(e) => warn!(session = %session.id, "memory recall failed: {e}"),
            }
        }

        for step in &session.trace {
            messages.push(ChatMessage::assistant(render_step(step)));
        }
        messages.push(ChatMessage::user(NEXT_STEP_PROMPT));
        messages
    }

    /// Fold an oversized observation through session memory: ingest it
    /// in chunks, then substitute the most similar notes.  Every failure
    /// path returns the original observation — memory must never block
    /// progress.
    async fn fold_observation(&self, session: &AgentSession, observation: String) -> String {
        let Some(memory) = &self.memory else {
            return observation;
        };
        if !needs_folding(&observation) {
            return observation;
        }

        for chunk in chunk_chars(&observation, FOLD_CHUNK_CHARS) {
            if let Err(e) = memory.ingest(session.id, &chunk).await {
                warn!(session = %session.id, "observation chunk ingest failed: {e}");
            }
        }

        match memory
            .search_within_session(session.id, &session.objective, FOLD_QUERY_K)
            .await
        {
            Ok(notes) if !notes.is_empty() => render_memory_substitution(&notes),
            Ok(_) => observation,
            Err(e) => {
                warn!(session = %session.id, "memory substitution failed: {e}");
                observation
            }
        }
    }

    /// Best-effort mirror of the step into session memory.
    async fn persist_step(&self, session: &AgentSession, step: &AgentStep) {
        let Some(memory) = &self.memory else {
            return;
        };
        if let Err(e) = memory.ingest(session.id, &render_step(step)).await {
            warn!(session = %session.id, step = step.index, "step memory ingest failed: {e}");
        }
    }

    /// Send an event; `true` when the consumer is still listening (or
    /// there is none).
    async fn emit(events: &Option<mpsc::Sender<AgentEvent>>, event: AgentEvent) -> bool {
        match events {
            Some(tx) => tx.send(event).await.is_ok(),
            None => true,
        }
    }
}

/// Split `s` into chunks of at most `size` characters, on char
/// boundaries.
fn chunk_chars(s: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

/// Whether an observation of this length gets folded.  Exposed for the
/// boundary tests: exactly the threshold is kept inline, one past it is
/// folded.
pub(crate) fn needs_folding(observation: &str) -> bool {
    observation.chars().count() > FOLD_THRESHOLD_CHARS
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use quarry_mcp::NullMcpManager;
    use quarry_model::mock::{FailingChatClient, ScriptedChatClient};
    use quarry_tools::{Tool, ToolError, ToolRegistry};

    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        async fn execute(&self, input: &str) -> Result<String, ToolError> {
            Ok(format!("{input}\n"))
        }
    }

    async fn engine_with(chat: Arc<dyn ChatClient>) -> AgentEngine {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let dispatcher = Arc::new(ToolDispatcher::new(
            registry,
            Arc::new(NullMcpManager),
            "/var/lib/quarry",
        ));
        AgentEngine::new(chat, dispatcher, None, AgentSettings::default()).await
    }

    #[tokio::test]
    async fn tool_step_then_finish() {
        let chat = Arc::new(ScriptedChatClient::new(vec![
            "Thought: compute\nAction: echo\nAction Input: 5",
            "Thought: done\nAction: finish\nAction Input: 5",
        ]));
        let engine = engine_with(chat).await;
        let session = engine.run_session("Add 2 and 3", Some(5), None).await.unwrap();

        assert!(session.completed);
        assert_eq!(session.result, "5");
        assert_eq!(session.trace.len(), 2);
        assert_eq!(session.trace[0].observation, "5\n");
        assert_eq!(session.trace[1].action, "finish");
        for (i, step) in session.trace.iter().enumerate() {
            assert_eq!(step.index as usize, i + 1);
        }
    }

    #[tokio::test]
    async fn parse_fallback_terminates_with_whole_reply() {
        let chat = Arc::new(ScriptedChatClient::new(vec!["I think the answer is 42."]));
        let engine = engine_with(chat).await;
        let session = engine.run_session("answer", Some(5), None).await.unwrap();

        assert!(session.completed);
        assert_eq!(session.result, "I think the answer is 42.");
        assert_eq!(session.trace.len(), 1);
        assert_eq!(session.trace[0].action, "finish");
        assert_eq!(session.trace[0].action_input, "I think the answer is 42.");
        assert!(session.trace[0].observation.is_empty());
    }

    #[tokio::test]
    async fn finish_with_empty_input_uses_thought() {
        let chat = Arc::new(ScriptedChatClient::new(vec![
            "Thought: nothing left to do\nAction: finish\nAction Input:",
        ]));
        let engine = engine_with(chat).await;
        let session = engine.run_session("noop", Some(3), None).await.unwrap();
        assert_eq!(session.result, "nothing left to do");
    }

    #[tokio::test]
    async fn tool_error_becomes_observation_and_loop_continues() {
        let chat = Arc::new(ScriptedChatClient::new(vec![
            "Thought: try\nAction: no_such_tool\nAction Input: {}",
            "Thought: recover\nAction: finish\nAction Input: gave up",
        ]));
        let engine = engine_with(chat).await;
        let session = engine.run_session("x", Some(5), None).await.unwrap();

        assert_eq!(session.trace.len(), 2);
        assert!(session.trace[0].observation.starts_with("error: "));
        assert!(session.trace[0].observation.contains("no_such_tool"));
        assert!(session.completed);
        assert_eq!(session.result, "gave up");
    }

    #[tokio::test]
    async fn max_steps_reached_leaves_session_incomplete() {
        let chat = Arc::new(ScriptedChatClient::new(vec![
            "Thought: loop\nAction: echo\nAction Input: a",
            "Thought: loop\nAction: echo\nAction Input: b",
            "Thought: loop\nAction: echo\nAction Input: c",
        ]));
        let engine = engine_with(chat).await;
        let session = engine.run_session("loop forever", Some(3), None).await.unwrap();

        assert!(!session.completed);
        assert_eq!(session.result, "Max steps reached");
        assert_eq!(session.trace.len(), 3);
    }

    #[tokio::test]
    async fn chat_failure_aborts_the_session() {
        let engine = engine_with(Arc::new(FailingChatClient)).await;
        assert!(engine.run_session("x", Some(2), None).await.is_err());
    }

    #[tokio::test]
    async fn prompt_contains_objective_tools_and_closing_turn() {
        let chat = Arc::new(ScriptedChatClient::new(vec![
            "Thought: t\nAction: finish\nAction Input: ok",
        ]));
        let requests = chat.requests.clone();
        let engine = engine_with(chat).await;
        engine.run_session("find the bug", Some(2), None).await.unwrap();

        let reqs = requests.lock().unwrap();
        let first = &reqs[0];
        assert!(first.messages[0].content.contains("find the bug"));
        assert!(first.messages[0].content.contains("- echo:"));
        assert!(first.messages[0].content.contains("- finish:"));
        assert_eq!(first.messages.last().unwrap().content, NEXT_STEP_PROMPT);
        assert_eq!(first.temperature, Some(0.15));
        assert_eq!(first.max_tokens, Some(1024));
    }

    #[tokio::test]
    async fn prior_steps_are_replayed_as_assistant_turns() {
        let chat = Arc::new(ScriptedChatClient::new(vec![
            "Thought: step one\nAction: echo\nAction Input: alpha",
            "Thought: step two\nAction: finish\nAction Input: done",
        ]));
        let requests = chat.requests.clone();
        let engine = engine_with(chat).await;
        engine.run_session("replay", Some(5), None).await.unwrap();

        let reqs = requests.lock().unwrap();
        assert_eq!(reqs.len(), 2);
        let second = &reqs[1];
        let replayed = second
            .messages
            .iter()
            .find(|m| m.content.contains("Action Input: alpha"))
            .expect("prior step replayed");
        assert!(replayed.content.contains("Observation: alpha"));
    }

    #[tokio::test]
    async fn events_are_emitted_per_step_then_done() {
        let chat = Arc::new(ScriptedChatClient::new(vec![
            "Thought: one\nAction: echo\nAction Input: x",
            "Thought: two\nAction: finish\nAction Input: fin",
        ]));
        let engine = engine_with(chat).await;
        let (tx, mut rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let session = engine
            .run_session_with_events("stream", Some(5), None, tx, cancel_rx)
            .await
            .unwrap();
        assert!(session.completed);

        let mut steps = 0;
        let mut done = 0;
        while let Some(ev) = rx.recv().await {
            match ev {
                AgentEvent::Step { .. } => steps += 1,
                AgentEvent::Done { completed, .. } => {
                    done += 1;
                    assert!(completed);
                }
            }
        }
        assert_eq!(steps, 2);
        assert_eq!(done, 1);
    }

    #[tokio::test]
    async fn pre_resolved_cancel_stops_before_any_step() {
        let chat = Arc::new(ScriptedChatClient::new(vec![
            "Thought: never\nAction: echo\nAction Input: x",
        ]));
        let engine = engine_with(chat).await;
        let (tx, _rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        cancel_tx.send(()).unwrap();
        let session = engine
            .run_session_with_events("cancelled", Some(5), None, tx, cancel_rx)
            .await
            .unwrap();
        assert!(session.trace.is_empty());
        assert!(!session.completed);
        assert_eq!(session.result, "Cancelled");
    }

    // ── Folding helpers ──────────────────────────────────────────────────────

    #[test]
    fn observation_at_threshold_is_not_folded() {
        assert!(!needs_folding(&"x".repeat(500)));
    }

    #[test]
    fn observation_past_threshold_is_folded() {
        assert!(needs_folding(&"x".repeat(501)));
    }

    #[test]
    fn chunk_chars_splits_at_size() {
        let chunks = chunk_chars(&"a".repeat(1200), 500);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 500);
        assert_eq!(chunks[2].len(), 200);
    }

    #[test]
    fn chunk_chars_handles_multibyte() {
        let chunks = chunk_chars(&"é".repeat(501), 500);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].chars().count(), 1);
    }
}
