// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Chat completion and embedding clients.
//!
//! Both clients speak the OpenAI-compatible wire format, which covers the
//! hosted APIs as well as llama.cpp, vLLM, Ollama and LM Studio.  The
//! traits ([`ChatClient`], [`EmbeddingClient`]) are the seams the rest of
//! the workspace programs against; [`mock`] provides deterministic
//! implementations for tests.

mod chat;
mod embedding;
mod error;
pub mod mock;
mod types;

pub use chat::{ChatClient, OpenAiChatClient};
pub use embedding::{EmbeddingClient, OpenAiEmbeddingClient};
pub use error::ModelError;
pub use types::{ChatMessage, ChatRequest, DeltaStream, Role};

use std::sync::Arc;

/// Build the chat client described by the model section of the config.
pub fn chat_from_config(cfg: &quarry_config::ModelConfig) -> Arc<dyn ChatClient> {
    Arc::new(OpenAiChatClient::new(
        &cfg.base_url,
        cfg.name.clone(),
        cfg.resolve_api_key(),
        cfg.request_timeout_secs,
    ))
}

/// Build the embedding client described by the embedding section of the config.
pub fn embedding_from_config(cfg: &quarry_config::EmbeddingConfig) -> Arc<dyn EmbeddingClient> {
    Arc::new(OpenAiEmbeddingClient::new(
        &cfg.base_url,
        cfg.name.clone(),
        cfg.resolve_api_key(),
        cfg.dimensions,
    ))
}
