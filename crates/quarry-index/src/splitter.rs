// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Language-aware chunk splitting with overlap.
//!
//! Each chunk ends at the best separator found inside the size window
//! (separators tried in priority order, rightmost occurrence wins) and
//! the next chunk starts exactly `chunk_overlap` characters before the
//! previous cut.  Reconstruction invariant: the first chunk plus every
//! later chunk minus its leading overlap equals the input.

use serde::{Deserialize, Serialize};

/// Splitter variant.  Unknown language tags map to `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SplitLanguage {
    #[default]
    Default,
    PlainText,
    Markdown,
    Python,
    Go,
    Javascript,
    Rust,
}

impl SplitLanguage {
    /// Parse a language tag, case-insensitively.  Anything unrecognized
    /// falls back to `Default` rather than failing — the tag is advisory.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "plaintext" | "plain_text" | "text" | "txt" => Self::PlainText,
            "markdown" | "md" => Self::Markdown,
            "python" | "py" => Self::Python,
            "go" | "golang" => Self::Go,
            "javascript" | "js" | "node" => Self::Javascript,
            "rust" | "rs" => Self::Rust,
            _ => Self::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::PlainText => "PLAINTEXT",
            Self::Markdown => "MARKDOWN",
            Self::Python => "PYTHON",
            Self::Go => "GO",
            Self::Javascript => "JAVASCRIPT",
            Self::Rust => "RUST",
        }
    }

    /// Priority-ordered separators.  Syntax-aware entries come first so a
    /// cut lands on a structural boundary when one exists in the window;
    /// the trailing entries degrade to paragraph / line / word breaks.
    /// The implicit last resort is a hard cut at the window edge.
    fn separators(&self) -> &'static [&'static str] {
        match self {
            Self::Default | Self::PlainText => &["\n\n", "\n", " "],
            Self::Markdown => &["\n# ", "\n## ", "\n### ", "\n\n", "\n", " "],
            Self::Python => &["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " "],
            Self::Go => &["\nfunc ", "\ntype ", "\n\n", "\n", " "],
            Self::Javascript => &["\nfunction ", "\nclass ", "\nconst ", "\n\n", "\n", " "],
            Self::Rust => &["\nfn ", "\npub fn ", "\nimpl ", "\nstruct ", "\n\n", "\n", " "],
        }
    }
}

/// Split `text` into chunks of at most `chunk_size` bytes, with
/// `chunk_overlap` bytes shared between adjacent chunks.
///
/// Guarantees: no chunk is empty; every chunk is ≤ `chunk_size`;
/// adjacent chunks share exactly `chunk_overlap` bytes (clamped below
/// `chunk_size`); concatenating the first chunk with every later chunk's
/// suffix past the overlap reconstructs `text` exactly.
pub fn split(
    text: &str,
    language: SplitLanguage,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    // Overlap must leave room for forward progress.
    let overlap = chunk_overlap.min(chunk_size.saturating_sub(1));

    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let seps = language.separators();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let mut hard_end = floor_char_boundary(text, (start + chunk_size).min(text.len()));
        if hard_end <= start {
            // chunk_size smaller than the char at `start`; take the
            // whole char rather than emit an empty chunk.
            hard_end = ceil_char_boundary(text, start + 1);
        }
        if hard_end >= text.len() {
            chunks.push(text[start..].to_string());
            break;
        }

        // Rightmost occurrence of the highest-priority separator that
        // still makes progress past the overlap region.
        let window = &text[start..hard_end];
        let mut cut = hard_end;
        for sep in seps {
            if let Some(pos) = window.rfind(sep) {
                let candidate = start + pos + cut_offset(sep);
                if candidate > start + overlap && candidate < hard_end {
                    cut = candidate;
                    break;
                }
            }
        }

        chunks.push(text[start..cut].to_string());
        let mut next_start = floor_char_boundary(text, cut - overlap);
        if next_start <= start {
            // Flooring a mid-char position can land back on `start` in
            // multibyte text; force progress to the next char boundary.
            next_start = ceil_char_boundary(text, start + 1);
        }
        start = next_start;
    }

    chunks
}

/// Smallest byte index ≥ `i` that lands on a char boundary.
fn ceil_char_boundary(text: &str, mut i: usize) -> usize {
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i.min(text.len())
}

/// Where to cut relative to a separator match.
///
/// Whitespace separators are consumed by the preceding chunk.  Syntax
/// separators (`"\ndef "`, `"\nfunc "`, `"\n# "`, …) cut after the
/// leading newline only, so the construct header opens the next chunk.
fn cut_offset(sep: &str) -> usize {
    let has_syntax_tail = sep.starts_with('\n') && sep[1..].chars().any(|c| !c.is_whitespace());
    if has_syntax_tail {
        1
    } else {
        sep.len()
    }
}

/// Largest byte index ≤ `i` that lands on a char boundary.
fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the input from chunks: first chunk verbatim, then each
    /// subsequent chunk minus its leading overlap.
    fn reconstruct(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(c);
            } else {
                out.push_str(&c[overlap.min(c.len())..]);
            }
        }
        out
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split("hello", SplitLanguage::Default, 100, 10);
        assert_eq!(chunks, vec!["hello"]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split("", SplitLanguage::Default, 100, 0).is_empty());
    }

    #[test]
    fn no_chunk_exceeds_chunk_size() {
        let text = "word ".repeat(200);
        for chunk in split(&text, SplitLanguage::Default, 64, 16) {
            assert!(chunk.len() <= 64, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn no_chunk_is_empty() {
        let text = "a\n\nb\n\nc ".repeat(50);
        for chunk in split(&text, SplitLanguage::Default, 16, 4) {
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn reconstruction_round_trips_prose() {
        let text = "The quick brown fox jumps over the lazy dog.\n\n".repeat(20);
        let overlap = 12;
        let chunks = split(&text, SplitLanguage::Default, 80, overlap);
        assert_eq!(reconstruct(&chunks, overlap), text);
    }

    #[test]
    fn reconstruction_round_trips_separator_free_text() {
        // No separators at all → pure fixed windows, every chunk except
        // the last is exactly chunk_size long.
        let text: String = "x".repeat(1000);
        let (size, overlap) = (64, 16);
        let chunks = split(&text, SplitLanguage::Default, size, overlap);
        assert_eq!(reconstruct(&chunks, overlap), text);
        for c in &chunks[..chunks.len() - 1] {
            assert_eq!(c.len(), size);
        }
    }

    #[test]
    fn zero_overlap_partitions_exactly() {
        let text = "abcdefghij".repeat(10);
        let chunks = split(&text, SplitLanguage::Default, 25, 0);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn adjacent_chunks_share_overlap_bytes() {
        let text = "q".repeat(300);
        let overlap = 10;
        let chunks = split(&text, SplitLanguage::Default, 50, overlap);
        for pair in chunks.windows(2) {
            let prev_tail = &pair[0][pair[0].len() - overlap..];
            let next_head = &pair[1][..overlap];
            assert_eq!(prev_tail, next_head);
        }
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = split(&text, SplitLanguage::Default, 40, 0);
        // The cut should land on the paragraph boundary, not mid-word.
        assert_eq!(chunks[0], format!("{}\n\n", "a".repeat(30)));
    }

    #[test]
    fn overlap_larger_than_chunk_size_is_clamped() {
        let text = "z".repeat(100);
        let chunks = split(&text, SplitLanguage::Default, 10, 50);
        // Must terminate and make progress.
        assert!(chunks.len() >= 10);
        assert!(chunks.iter().all(|c| c.len() <= 10));
    }

    #[test]
    fn multibyte_text_never_splits_inside_a_char() {
        let text = "héllo wörld ü ".repeat(30);
        for chunk in split(&text, SplitLanguage::Default, 20, 5) {
            // Constructing the String already validated UTF-8; check it
            // round-trips through chars unharmed.
            assert_eq!(chunk, chunk.chars().collect::<String>());
        }
    }

    // ── Language parsing ──────────────────────────────────────────────────────

    #[test]
    fn parse_known_tags() {
        assert_eq!(SplitLanguage::parse("python"), SplitLanguage::Python);
        assert_eq!(SplitLanguage::parse("GO"), SplitLanguage::Go);
        assert_eq!(SplitLanguage::parse("js"), SplitLanguage::Javascript);
        assert_eq!(SplitLanguage::parse("Markdown"), SplitLanguage::Markdown);
    }

    #[test]
    fn parse_unknown_tag_is_default() {
        assert_eq!(SplitLanguage::parse("cobol"), SplitLanguage::Default);
        assert_eq!(SplitLanguage::parse(""), SplitLanguage::Default);
    }

    #[test]
    fn python_splitter_prefers_def_boundaries() {
        let body = "    pass\n".repeat(5);
        let text = format!("def a():\n{body}\ndef b():\n{body}");
        let chunks = split(&text, SplitLanguage::Python, 60, 0);
        assert!(chunks.iter().any(|c| c.starts_with("def b():")));
    }
}
