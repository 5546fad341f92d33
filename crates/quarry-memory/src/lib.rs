// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Agentic memory: notes the agent writes between steps and re-queries
//! on later steps.
//!
//! Every note is summarized, keyworded, embedded, and linked to its five
//! nearest neighbours at creation time.  Notes are scoped to a session
//! (workflow) id; the nil id is global memory.  Links may form cycles —
//! they are plain id arrays, never traversed recursively here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use quarry_index::{IndexError, Summarizer};
use quarry_model::EmbeddingClient;
use quarry_store::{MemoryNoteRecord, MemoryRowStore, NewMemoryNote};

/// How many neighbours a fresh note links to.
const LINK_CANDIDATES: i64 = 5;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// The summarizer reject gate tripped — the content reads as an
    /// opaque blob and must not enter memory.
    #[error("unreadable content rejected by memory ingest")]
    UnreadableContent,

    #[error(transparent)]
    Model(#[from] quarry_model::ModelError),

    #[error(transparent)]
    Store(#[from] quarry_store::StoreError),
}

impl From<IndexError> for MemoryError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::UnreadableContent => Self::UnreadableContent,
            IndexError::Model(e) => Self::Model(e),
            IndexError::Store(e) => Self::Store(e),
        }
    }
}

/// A memory note as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryNote {
    pub id: i64,
    pub workflow_id: Uuid,
    pub content: String,
    /// Derived context — the summarizer's one-paragraph summary.
    pub context: String,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub links: Vec<i64>,
    /// Cosine distance to the query (search results only).
    pub distance: Option<f64>,
}

impl From<MemoryNoteRecord> for MemoryNote {
    fn from(r: MemoryNoteRecord) -> Self {
        Self {
            id: r.id,
            workflow_id: r.workflow_id,
            content: r.content,
            context: r.context,
            keywords: r.keywords,
            tags: r.tags,
            timestamp: r.timestamp,
            links: r.links,
            distance: r.distance,
        }
    }
}

pub struct MemoryStore {
    rows: MemoryRowStore,
    embedder: Arc<dyn EmbeddingClient>,
    summarizer: Summarizer,
    embed_prefix: String,
    search_prefix: String,
}

impl MemoryStore {
    pub fn new(
        rows: MemoryRowStore,
        embedder: Arc<dyn EmbeddingClient>,
        summarizer: Summarizer,
        embed_prefix: String,
        search_prefix: String,
    ) -> Self {
        Self {
            rows,
            embedder,
            summarizer,
            embed_prefix,
            search_prefix,
        }
    }

    /// Ingest one piece of content into session memory and return the
    /// new note id.
    ///
    /// The note is summarized (reject gate applies), embedded together
    /// with its summary/keywords/tags, inserted with empty links, and
    /// then linked to its nearest neighbours.  Link generation failure
    /// is logged and swallowed — the note stands on its own.
    pub async fn ingest(&self, session_id: Uuid, content: &str) -> Result<i64, MemoryError> {
        let summary = self.summarizer.summarize(content).await?;
        let tags = summary.keywords.clone();

        let embed_text = format!(
            "{}{} {} {} {}",
            self.embed_prefix,
            content,
            summary.summary,
            summary.keywords.join(", "),
            tags.join(", ")
        );
        let embeddings = self.embedder.embed(&[embed_text]).await?;
        let embedding = embeddings.into_iter().next().ok_or_else(|| {
            quarry_model::ModelError::ProviderMalformed("empty embedding batch".into())
        })?;

        let id = self
            .rows
            .insert(&NewMemoryNote {
                workflow_id: session_id,
                content: content.to_string(),
                context: summary.summary,
                keywords: summary.keywords,
                tags,
                embedding: embedding.clone(),
            })
            .await?;

        // Linking is deliberately not atomic with the insert; readers may
        // briefly observe the note with empty links.
        match self
            .rows
            .nearest(session_id, &embedding, LINK_CANDIDATES, Some(id))
            .await
        {
            Ok(neighbours) => {
                let links: Vec<i64> = neighbours.iter().map(|n| n.id).collect();
                if !links.is_empty() {
                    if let Err(e) = self.rows.set_links(id, &links).await {
                        warn!(note = id, "failed to persist links: {e}");
                    }
                }
            }
            Err(e) => warn!(note = id, "link candidate search failed: {e}"),
        }

        debug!(note = id, session = %session_id, "memory note ingested");
        Ok(id)
    }

    /// K nearest notes to `query` within the session.  The nil session
    /// id searches across all sessions.
    pub async fn search_within_session(
        &self,
        session_id: Uuid,
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryNote>, MemoryError> {
        let query_text = format!("{}{}", self.search_prefix, query);
        let embeddings = self.embedder.embed(&[query_text]).await?;
        let embedding = embeddings.into_iter().next().ok_or_else(|| {
            quarry_model::ModelError::ProviderMalformed("empty embedding batch".into())
        })?;

        let records = self
            .rows
            .nearest(session_id, &embedding, k as i64, None)
            .await?;
        Ok(records.into_iter().map(MemoryNote::from).collect())
    }

    /// Note count for tests and diagnostics.
    pub async fn count(&self, session_id: Option<Uuid>) -> Result<i64, MemoryError> {
        Ok(self.rows.count(session_id).await?)
    }
}

// ─── Integration tests ───────────────────────────────────────────────────────
