// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Parser for the `Thought: / Action: / Action Input:` reply grammar.
//!
//! Header matching is line-wise and case-insensitive.  Everything after
//! `Action Input:` up to the next header (or end of reply) is the raw
//! input; a leading ```` ```json ```` fence is stripped.  A reply with no
//! `Action:` header at all is the parse-fallback terminal case — the
//! caller turns the whole reply into a `finish` step.

/// A structurally parsed model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub thought: String,
    /// `None` when no `Action:` header was found (parse fallback).
    pub action: Option<String>,
    pub input: String,
}

const THOUGHT_HEADER: &str = "thought:";
const ACTION_HEADER: &str = "action:";
const ACTION_INPUT_HEADER: &str = "action input:";

enum Section {
    None,
    Thought,
    Input,
}

pub fn parse_react_reply(reply: &str) -> ParsedReply {
    let mut thought_lines: Vec<String> = Vec::new();
    let mut input_lines: Vec<String> = Vec::new();
    let mut action: Option<String> = None;
    let mut section = Section::None;

    for line in reply.lines() {
        let trimmed = line.trim_start();
        let lower = trimmed.to_lowercase();

        // `action input:` must be tested before `action:` — the latter
        // is a prefix of the former.
        if let Some(rest) = header_rest(trimmed, &lower, ACTION_INPUT_HEADER) {
            if !rest.is_empty() {
                input_lines.push(rest.to_string());
            }
            section = Section::Input;
        } else if let Some(rest) = header_rest(trimmed, &lower, ACTION_HEADER) {
            action = Some(rest.trim().to_string());
            section = Section::None;
        } else if let Some(rest) = header_rest(trimmed, &lower, THOUGHT_HEADER) {
            if !rest.is_empty() {
                thought_lines.push(rest.to_string());
            }
            section = Section::Thought;
        } else {
            match section {
                Section::Thought => thought_lines.push(line.to_string()),
                Section::Input => input_lines.push(line.to_string()),
                Section::None => {}
            }
        }
    }

    ParsedReply {
        thought: thought_lines.join("\n").trim().to_string(),
        action,
        input: strip_code_fence(input_lines.join("\n").trim()),
    }
}

/// Content after `header` when `trimmed` starts with it (checked against
/// the pre-lowered copy), else `None`.
fn header_rest<'a>(trimmed: &'a str, lower: &str, header: &str) -> Option<&'a str> {
    if lower.starts_with(header) {
        Some(trimmed[header.len()..].trim_start())
    } else {
        None
    }
}

/// Strip a surrounding ``` / ```json fence, if present.
fn strip_code_fence(s: &str) -> String {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t.to_string();
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim().to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_step() {
        let p = parse_react_reply(
            "Thought: compute the sum\nAction: code_eval\nAction Input: {\"language\":\"python\"}",
        );
        assert_eq!(p.thought, "compute the sum");
        assert_eq!(p.action.as_deref(), Some("code_eval"));
        assert_eq!(p.input, "{\"language\":\"python\"}");
    }

    #[test]
    fn headers_are_case_insensitive() {
        let p = parse_react_reply("THOUGHT: t\nACTION: finish\nACTION INPUT: done");
        assert_eq!(p.action.as_deref(), Some("finish"));
        assert_eq!(p.input, "done");
    }

    #[test]
    fn missing_action_header_yields_none() {
        let p = parse_react_reply("I think the answer is 42.");
        assert!(p.action.is_none());
        assert!(p.input.is_empty());
    }

    #[test]
    fn multiline_input_runs_to_end_of_reply() {
        let p = parse_react_reply(
            "Thought: t\nAction: code_eval\nAction Input: {\"code\":\n\"print(1)\"\n}",
        );
        assert_eq!(p.input, "{\"code\":\n\"print(1)\"\n}");
    }

    #[test]
    fn input_stops_at_next_header() {
        // A second Thought header after the input belongs to a new
        // (ignored) section, not to the input.
        let p = parse_react_reply(
            "Action: t1\nAction Input: payload\nThought: after-the-fact",
        );
        assert_eq!(p.input, "payload");
        assert_eq!(p.thought, "after-the-fact");
    }

    #[test]
    fn json_fence_is_stripped() {
        let p = parse_react_reply(
            "Thought: t\nAction: a\nAction Input: ```json\n{\"x\": 1}\n```",
        );
        assert_eq!(p.input, "{\"x\": 1}");
    }

    #[test]
    fn bare_fence_is_stripped() {
        let p = parse_react_reply("Action: a\nAction Input: ```\n{}\n```");
        assert_eq!(p.input, "{}");
    }

    #[test]
    fn multiline_thought_accumulates() {
        let p = parse_react_reply("Thought: first\nsecond line\nAction: finish\nAction Input: x");
        assert_eq!(p.thought, "first\nsecond line");
    }

    #[test]
    fn leading_whitespace_before_headers_is_tolerated() {
        let p = parse_react_reply("  Thought: t\n  Action: a\n  Action Input: i");
        assert_eq!(p.action.as_deref(), Some("a"));
    }

    #[test]
    fn empty_input_is_empty_string() {
        let p = parse_react_reply("Thought: t\nAction: finish\nAction Input:");
        assert_eq!(p.input, "");
    }
}
