// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use quarry_agent::AgentEngine;
use quarry_config::Config;
use quarry_index::{SefiiEngine, Summarizer};
use quarry_mcp::{HttpMcpManager, McpManager};
use quarry_memory::MemoryStore;
use quarry_sandbox::Sandbox;
use quarry_store::{ChunkStore, MemoryRowStore, PgPool};
use quarry_tools::{
    builtin::{CodeEvalTool, StagePathTool, WebFetchTool, WebSearchTool},
    ToolDispatcher, ToolRegistry,
};

/// Shared handler state.  Everything inside is `Arc`ed; cloning is
/// cheap and handlers never hold locks across awaits.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chat: Arc<dyn quarry_model::ChatClient>,
    pub engine: Arc<AgentEngine>,
    pub sefii: Arc<SefiiEngine>,
    /// `None` when the memory feature is disabled in config.
    pub memory: Option<Arc<MemoryStore>>,
    pub sandbox: Arc<Sandbox>,
}

impl AppState {
    /// Wire every subsystem from config and an already-connected pool.
    /// The pool is shared: sessions, notes, and chunks all live in the
    /// same vector database.
    pub async fn build(config: Arc<Config>, pool: PgPool) -> Self {
        let chat = quarry_model::chat_from_config(&config.model);
        let embedder = quarry_model::embedding_from_config(&config.embedding);

        let sefii = Arc::new(SefiiEngine::new(
            ChunkStore::new(pool.clone()),
            embedder.clone(),
            Summarizer::new(chat.clone(), None),
            config.embedding.embed_prefix.clone(),
            config.embedding.search_prefix.clone(),
            config.retrieval.rerank_url.clone(),
        ));

        let memory = if config.memory.enabled {
            Some(Arc::new(MemoryStore::new(
                MemoryRowStore::new(pool.clone()),
                embedder.clone(),
                Summarizer::new(chat.clone(), None),
                config.embedding.embed_prefix.clone(),
                config.embedding.search_prefix.clone(),
            )))
        } else {
            None
        };

        let sandbox = Arc::new(Sandbox::new(
            config.sandbox.image.clone(),
            config.sandbox.docker_bin.clone(),
            config.sandbox.timeout_secs,
            config.sandbox.go_timeout_secs,
            config.sandbox.output_limit_bytes,
        ));

        let mut registry = ToolRegistry::new();
        registry.register(CodeEvalTool::new(sandbox.clone()));
        registry.register(StagePathTool::new(config.sandbox.data_path.clone()));
        registry.register(WebFetchTool {
            max_chars: config.tools.web.fetch_max_chars,
        });
        registry.register(WebSearchTool {
            api_key: config.tools.web.search.api_key.clone(),
        });

        let mcp: Arc<dyn McpManager> = Arc::new(HttpMcpManager::new(&config.mcp.servers));
        let dispatcher = Arc::new(ToolDispatcher::new(
            registry,
            mcp,
            &config.sandbox.data_path,
        ));

        let engine = Arc::new(
            AgentEngine::new(
                chat.clone(),
                dispatcher,
                memory.clone(),
                config.agent.clone(),
            )
            .await,
        );

        Self {
            config,
            chat,
            engine,
            sefii,
            memory,
            sandbox,
        }
    }
}
