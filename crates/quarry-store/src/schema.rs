// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use sqlx::PgPool;
use tracing::debug;

use crate::StoreError;

/// Ensure the pgvector extension, tables, and indexes exist.
///
/// Idempotent: every statement is `IF NOT EXISTS`.  The `workflow_id`
/// column and its `(workflow_id, timestamp DESC)` index are added
/// separately so that deployments created before session scoping existed
/// upgrade in place.
///
/// `dimensions` is baked into the DDL — vector columns are fixed-width.
/// Changing it on an existing deployment requires a manual migration.
pub async fn ensure_schema(pool: &PgPool, dimensions: usize) -> Result<(), StoreError> {
    debug!(dimensions, "ensuring vector store schema");

    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS chunks (
             id        BIGSERIAL PRIMARY KEY,
             file_path TEXT NOT NULL,
             doc_title TEXT NOT NULL DEFAULT '',
             language  TEXT NOT NULL DEFAULT 'DEFAULT',
             text      TEXT NOT NULL,
             keywords  TEXT[] NOT NULL DEFAULT '{{}}',
             embedding vector({dimensions}) NOT NULL
         )"
    ))
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS chunks_embedding_idx
         ON chunks USING hnsw (embedding vector_cosine_ops)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS chunks_file_path_idx ON chunks (file_path)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS inverted_index (
             keyword  TEXT NOT NULL,
             chunk_id BIGINT NOT NULL REFERENCES chunks(id) ON DELETE CASCADE
         )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS inverted_index_keyword_chunk_idx
         ON inverted_index (keyword, chunk_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS agentic_memories (
             id           BIGSERIAL PRIMARY KEY,
             workflow_id  UUID NOT NULL DEFAULT '00000000-0000-0000-0000-000000000000',
             content      TEXT NOT NULL,
             note_context TEXT NOT NULL DEFAULT '',
             keywords     TEXT[] NOT NULL DEFAULT '{{}}',
             tags         TEXT[] NOT NULL DEFAULT '{{}}',
             timestamp    TIMESTAMPTZ NOT NULL DEFAULT now(),
             embedding    vector({dimensions}) NOT NULL,
             links        BIGINT[] NOT NULL DEFAULT '{{}}'
         )"
    ))
    .execute(pool)
    .await?;

    // Upgrade path for pre-session-scoping deployments.
    sqlx::query(
        "ALTER TABLE agentic_memories
         ADD COLUMN IF NOT EXISTS workflow_id UUID NOT NULL
         DEFAULT '00000000-0000-0000-0000-000000000000'",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS agentic_memories_embedding_idx
         ON agentic_memories USING hnsw (embedding vector_cosine_ops)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS agentic_memories_workflow_ts_idx
         ON agentic_memories (workflow_id, timestamp DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Connect to the test database named by QUARRY_TEST_DATABASE_URL, or
    /// skip (return None) when the variable is unset.
    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("QUARRY_TEST_DATABASE_URL").ok()?;
        crate::connect(&url, 2).await.ok()
    }

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let Some(pool) = test_pool().await else {
            return;
        };
        ensure_schema(&pool, 8).await.unwrap();
        // Second call must be a no-op, not an error.
        ensure_schema(&pool, 8).await.unwrap();
    }
}
