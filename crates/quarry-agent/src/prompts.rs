// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Prompt assembly for the ReAct loop.

use quarry_memory::MemoryNote;

use crate::AgentStep;

/// The literal user turn that closes every per-step prompt.
pub const NEXT_STEP_PROMPT: &str = "Next step?";

/// Per-snippet budget in the memory block; keeps five snippets well
/// under a thousand tokens.
const SNIPPET_MAX_CHARS: usize = 200;

/// System message for one session: objective, tool list, output grammar.
pub fn system_prompt(objective: &str, tools: &[(String, String)], max_steps: u32) -> String {
    let mut tool_list = String::new();
    for (name, description) in tools {
        tool_list.push_str(&format!("- {name}: {description}\n"));
    }
    format!(
        "You are a methodical problem-solving agent. Work toward the objective one step at a \
         time, using at most {max_steps} steps.\n\
         \n\
         Objective: {objective}\n\
         \n\
         Available tools:\n{tool_list}\
         \n\
         Respond with exactly this structure and nothing else:\n\
         Thought: your reasoning about the next step\n\
         Action: one tool name from the list\n\
         Action Input: the tool's input (JSON unless the tool says otherwise)\n\
         \n\
         When the objective is met, respond with Action: finish and put the final answer in \
         Action Input. Observations from your previous actions appear in the conversation; \
         use them instead of repeating work."
    )
}

/// Render recalled memory as a compact numbered list, or `None` when
/// there is nothing to show.
pub fn memory_snippets_message(notes: &[MemoryNote]) -> Option<String> {
    if notes.is_empty() {
        return None;
    }
    let mut out = String::from("Session memory snippets (most relevant first):\n");
    for (i, note) in notes.iter().enumerate() {
        let line = if note.context.is_empty() {
            &note.content
        } else {
            &note.context
        };
        out.push_str(&format!("{}. {}\n", i + 1, truncate_chars(line, SNIPPET_MAX_CHARS)));
    }
    Some(out)
}

/// One prior step replayed as an assistant turn.
pub fn render_step(step: &AgentStep) -> String {
    format!(
        "Thought: {}\nAction: {}\nAction Input: {}\nObservation: {}",
        step.thought, step.action, step.action_input, step.observation
    )
}

/// Replacement text for an observation that was folded into memory.
pub fn render_memory_substitution(notes: &[MemoryNote]) -> String {
    let mut out = String::from(
        "Output was large; it was stored in session memory. Similar memory chunks:\n",
    );
    for (i, note) in notes.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}\n",
            i + 1,
            truncate_chars(&note.content, SNIPPET_MAX_CHARS)
        ));
    }
    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{truncated}…")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_objective_and_tools() {
        let p = system_prompt(
            "count the files",
            &[("code_eval".into(), "runs code".into())],
            10,
        );
        assert!(p.contains("count the files"));
        assert!(p.contains("- code_eval: runs code"));
        assert!(p.contains("Action Input:"));
    }

    #[test]
    fn memory_message_absent_without_notes() {
        assert!(memory_snippets_message(&[]).is_none());
    }

    #[test]
    fn render_step_round_trips_through_parser() {
        let step = AgentStep {
            index: 1,
            thought: "think".into(),
            action: "tool".into(),
            action_input: "{}".into(),
            observation: "ok".into(),
        };
        let rendered = render_step(&step);
        let parsed = crate::parse_react_reply(&rendered);
        assert_eq!(parsed.thought, "think");
        assert_eq!(parsed.action.as_deref(), Some("tool"));
    }

    #[test]
    fn truncate_chars_respects_multibyte() {
        let s = "é".repeat(300);
        let t = truncate_chars(&s, 200);
        assert_eq!(t.chars().count(), 201); // 200 + ellipsis
    }
}
