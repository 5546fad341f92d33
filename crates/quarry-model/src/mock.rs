// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic mock providers for tests.  No network access.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{ChatClient, ChatRequest, DeltaStream, EmbeddingClient, ModelError, Role};

/// Echoes the last user message back as the assistant response.
#[derive(Default)]
pub struct MockChatClient;

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(&self, req: ChatRequest) -> Result<String, ModelError> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("[no input]");
        Ok(format!("MOCK: {reply}"))
    }

    async fn stream(&self, req: ChatRequest) -> Result<DeltaStream, ModelError> {
        let text = self.complete(req).await?;
        Ok(Box::pin(stream::iter(vec![Ok(text)])))
    }
}

/// A pre-scripted chat client.  Each call pops the next reply from the
/// front of the queue, letting tests specify exact multi-turn agent runs
/// without network access.
pub struct ScriptedChatClient {
    replies: Arc<Mutex<Vec<String>>>,
    /// Every request seen by this client, in call order.  Tests inspect
    /// this to assert on prompt assembly.
    pub requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedChatClient {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(String::from).collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn pop(&self, req: ChatRequest) -> String {
        self.requests.lock().unwrap().push(req);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            "[no more scripts]".to_string()
        } else {
            replies.remove(0)
        }
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn complete(&self, req: ChatRequest) -> Result<String, ModelError> {
        Ok(self.pop(req))
    }

    async fn stream(&self, req: ChatRequest) -> Result<DeltaStream, ModelError> {
        let text = self.pop(req);
        Ok(Box::pin(stream::iter(vec![Ok(text)])))
    }
}

/// A chat client that always fails, for session-abort paths.
pub struct FailingChatClient;

#[async_trait]
impl ChatClient for FailingChatClient {
    async fn complete(&self, _req: ChatRequest) -> Result<String, ModelError> {
        Err(ModelError::ProviderMalformed("scripted failure".into()))
    }

    async fn stream(&self, _req: ChatRequest) -> Result<DeltaStream, ModelError> {
        Err(ModelError::ProviderMalformed("scripted failure".into()))
    }
}

/// Deterministic embedding client: hashes each input into a unit-ish
/// vector of the configured dimension.  Equal inputs embed equally, so
/// self-similarity tests behave like a real model's.
pub struct HashEmbeddingClient {
    dimensions: usize,
}

impl HashEmbeddingClient {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, input: &str) -> Vec<f32> {
        // FNV-1a over bytes, re-seeded per component.
        let mut v = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut h: u64 = 0xcbf29ce484222325 ^ (i as u64).wrapping_mul(0x100000001b3);
            for b in input.bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            // Map to [-1, 1].
            v.push(((h % 2000) as f32 / 1000.0) - 1.0);
        }
        v
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(inputs.iter().map(|s| self.embed_one(s)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
