// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::StoreError;

/// A memory note row.  `distance` is populated by similarity queries.
#[derive(Debug, Clone)]
pub struct MemoryNoteRecord {
    pub id: i64,
    pub workflow_id: Uuid,
    pub content: String,
    pub context: String,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub links: Vec<i64>,
    pub distance: Option<f64>,
}

/// A note about to be inserted (links start empty and are set once,
/// immediately after creation).
#[derive(Debug, Clone)]
pub struct NewMemoryNote {
    pub workflow_id: Uuid,
    pub content: String,
    pub context: String,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    pub embedding: Vec<f32>,
}

/// SQL access to `agentic_memories`.
#[derive(Clone)]
pub struct MemoryRowStore {
    pool: PgPool,
}

impl MemoryRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, note: &NewMemoryNote) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO agentic_memories
                 (workflow_id, content, note_context, keywords, tags, timestamp, embedding, links)
             VALUES ($1, $2, $3, $4, $5, now(), $6, '{}')
             RETURNING id",
        )
        .bind(note.workflow_id)
        .bind(&note.content)
        .bind(&note.context)
        .bind(&note.keywords)
        .bind(&note.tags)
        .bind(Vector::from(note.embedding.clone()))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Set a note's outbound links.  Called exactly once per note, right
    /// after insertion; notes are never mutated afterwards.
    pub async fn set_links(&self, id: i64, links: &[i64]) -> Result<(), StoreError> {
        sqlx::query("UPDATE agentic_memories SET links = $2 WHERE id = $1")
            .bind(id)
            .bind(links)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// K nearest notes by cosine distance.  The nil workflow id searches
    /// globally; any other id restricts to that session.  `exclude`
    /// omits one note id (used during link generation so a note does not
    /// link to itself).
    pub async fn nearest(
        &self,
        workflow_id: Uuid,
        embedding: &[f32],
        limit: i64,
        exclude: Option<i64>,
    ) -> Result<Vec<MemoryNoteRecord>, StoreError> {
        let query_vec = Vector::from(embedding.to_vec());
        let scoped = !workflow_id.is_nil();
        let rows = sqlx::query(
            "SELECT id, workflow_id, content, note_context, keywords, tags,
                    timestamp, links, embedding <=> $1 AS distance
             FROM agentic_memories
             WHERE ($2 = false OR workflow_id = $3)
               AND ($4::bigint IS NULL OR id <> $4)
             ORDER BY embedding <=> $1
             LIMIT $5",
        )
        .bind(&query_vec)
        .bind(scoped)
        .bind(workflow_id)
        .bind(exclude)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MemoryNoteRecord {
                id: row.get("id"),
                workflow_id: row.get("workflow_id"),
                content: row.get("content"),
                context: row.get("note_context"),
                keywords: row.get("keywords"),
                tags: row.get("tags"),
                timestamp: row.get("timestamp"),
                links: row.get("links"),
                distance: Some(row.get::<f64, _>("distance")),
            })
            .collect())
    }

    /// Note count, optionally scoped to one session.  Used by tests and
    /// the reject-gate invariant (rejected ingests leave the count
    /// unchanged).
    pub async fn count(&self, workflow_id: Option<Uuid>) -> Result<i64, StoreError> {
        let row = match workflow_id {
            Some(wf) => {
                sqlx::query("SELECT COUNT(*) AS n FROM agentic_memories WHERE workflow_id = $1")
                    .bind(wf)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS n FROM agentic_memories")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(row.get::<i64, _>("n"))
    }
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Option<MemoryRowStore> {
        let url = std::env::var("QUARRY_TEST_DATABASE_URL").ok()?;
        let pool = crate::connect(&url, 2).await.ok()?;
        crate::ensure_schema(&pool, 8).await.ok()?;
        Some(MemoryRowStore::new(pool))
    }

    fn note(workflow_id: Uuid, content: &str) -> NewMemoryNote {
        NewMemoryNote {
            workflow_id,
            content: content.into(),
            context: "ctx".into(),
            keywords: vec!["k".into()],
            tags: vec!["k".into()],
            embedding: vec![0.2; 8],
        }
    }

    #[tokio::test]
    async fn insert_starts_with_empty_links() {
        let Some(store) = test_store().await else {
            return;
        };
        let wf = Uuid::new_v4();
        let id = store.insert(&note(wf, "first")).await.unwrap();
        let hits = store.nearest(wf, &[0.2; 8], 1, None).await.unwrap();
        assert_eq!(hits[0].id, id);
        assert!(hits[0].links.is_empty());
    }

    #[tokio::test]
    async fn set_links_persists() {
        let Some(store) = test_store().await else {
            return;
        };
        let wf = Uuid::new_v4();
        let a = store.insert(&note(wf, "a")).await.unwrap();
        let b = store.insert(&note(wf, "b")).await.unwrap();
        store.set_links(b, &[a]).await.unwrap();
        let hits = store.nearest(wf, &[0.2; 8], 10, None).await.unwrap();
        let b_row = hits.iter().find(|n| n.id == b).unwrap();
        assert_eq!(b_row.links, vec![a]);
    }

    #[tokio::test]
    async fn nearest_scopes_to_workflow() {
        let Some(store) = test_store().await else {
            return;
        };
        let wf_a = Uuid::new_v4();
        let wf_b = Uuid::new_v4();
        store.insert(&note(wf_a, "in-a")).await.unwrap();
        store.insert(&note(wf_b, "in-b")).await.unwrap();
        let hits = store.nearest(wf_a, &[0.2; 8], 10, None).await.unwrap();
        assert!(hits.iter().all(|n| n.workflow_id == wf_a));
    }

    #[tokio::test]
    async fn exclude_omits_the_named_note() {
        let Some(store) = test_store().await else {
            return;
        };
        let wf = Uuid::new_v4();
        let id = store.insert(&note(wf, "self")).await.unwrap();
        let hits = store.nearest(wf, &[0.2; 8], 10, Some(id)).await.unwrap();
        assert!(hits.iter().all(|n| n.id != id));
    }
}
