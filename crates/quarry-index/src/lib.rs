// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! SEFII — the hybrid retrieval engine.
//!
//! Documents are split into chunks, each chunk is summarized and keyworded
//! by the chat model, embedded, and stored alongside one inverted-index
//! posting per keyword.  Retrieval runs a vector lane and a keyword lane
//! independently and fuses the scores.

mod engine;
mod error;
mod fusion;
mod splitter;
mod summarize;

pub use engine::{IngestRequest, RetrieveRequest, RetrievedChunk, SefiiEngine};
pub use error::IndexError;
pub use fusion::{fuse, tokenize_query, MergeMode};
pub use splitter::{split, SplitLanguage};
pub use summarize::{Summarizer, Summary};
