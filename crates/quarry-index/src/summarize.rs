// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-chunk summarization and keyword extraction.
//!
//! Two sequential chat calls: a retrieval-oriented summary, then a
//! comma-delimited keyword list extracted from that summary.  A reject
//! gate fails ingestion when the keywords mark the chunk as an opaque
//! blob — this is what keeps base64 dumps and ciphertext out of the
//! index.

use std::sync::Arc;

use tracing::debug;

use quarry_model::{ChatClient, ChatMessage, ChatRequest};

use crate::IndexError;

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize text fragments for a code-aware retrieval \
     index. Write at most three sentences describing what the fragment contains and what it \
     would be useful for. Mention identifiers, commands, and file names verbatim. If the \
     fragment is unreadable (binary, base64, encrypted), say exactly: unreadable content.";

const KEYWORD_SYSTEM_PROMPT: &str = "Extract the most important search keywords from the text. \
     Respond with a single comma-separated list and nothing else. Prefer concrete nouns, \
     identifiers, and technical terms. If the text describes unreadable content, respond \
     with exactly: unreadable content.";

/// Keyword markers that reject a chunk at the ingest gate.  Matched
/// case-insensitively against each extracted keyword.
const UNREADABLE_MARKERS: &[&str] = &["encoded data", "encrypted text", "unreadable content"];

/// Summarization temperature — kept low so repeated ingests of the same
/// document produce stable keywords.
const SUMMARIZE_TEMPERATURE: f32 = 0.3;

const MAX_KEYWORDS: usize = 64;

#[derive(Debug, Clone)]
pub struct Summary {
    pub summary: String,
    pub keywords: Vec<String>,
}

pub struct Summarizer {
    chat: Arc<dyn ChatClient>,
    model: Option<String>,
}

impl Summarizer {
    pub fn new(chat: Arc<dyn ChatClient>, model: Option<String>) -> Self {
        Self { chat, model }
    }

    /// Produce `(summary, keywords)` for one text fragment.
    ///
    /// Fails with [`IndexError::UnreadableContent`] when the keyword set
    /// is empty after cleanup or intersects the unreadable markers.
    pub async fn summarize(&self, text: &str) -> Result<Summary, IndexError> {
        let summary = self
            .chat
            .complete(
                ChatRequest::new(vec![
                    ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
                    ChatMessage::user(text),
                ])
                .with_model(self.model.clone())
                .with_temperature(SUMMARIZE_TEMPERATURE),
            )
            .await?;

        let keyword_reply = self
            .chat
            .complete(
                ChatRequest::new(vec![
                    ChatMessage::system(KEYWORD_SYSTEM_PROMPT),
                    ChatMessage::user(&summary),
                ])
                .with_model(self.model.clone())
                .with_temperature(SUMMARIZE_TEMPERATURE),
            )
            .await?;

        let keywords = clean_keywords(&keyword_reply);
        debug!(
            keyword_count = keywords.len(),
            summary_len = summary.len(),
            "chunk summarized"
        );

        if keywords.is_empty() || contains_unreadable_marker(&keywords) {
            return Err(IndexError::UnreadableContent);
        }

        Ok(Summary {
            summary: summary.trim().to_string(),
            keywords,
        })
    }
}

/// Split a comma-delimited keyword reply: trim entries, drop empties,
/// deduplicate preserving first-seen order, cap the set size.
pub(crate) fn clean_keywords(reply: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for raw in reply.split(',') {
        let kw = raw.trim().trim_matches('"').trim();
        if kw.is_empty() {
            continue;
        }
        if seen.insert(kw.to_ascii_lowercase()) {
            out.push(kw.to_string());
        }
        if out.len() >= MAX_KEYWORDS {
            break;
        }
    }
    out
}

/// Case-insensitive membership test against the unreadable markers.
pub(crate) fn contains_unreadable_marker(keywords: &[String]) -> bool {
    keywords.iter().any(|kw| {
        let lower = kw.to_ascii_lowercase();
        UNREADABLE_MARKERS.contains(&lower.as_str())
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
