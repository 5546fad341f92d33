// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Row-level access to the shared vector database.
//!
//! This crate owns the connection pool, the idempotent schema bootstrap,
//! and the SQL for the three tables (`chunks`, `inverted_index`,
//! `agentic_memories`).  Domain logic (fusion, summarization, linking
//! policy) lives in `quarry-index` and `quarry-memory`; this crate only
//! moves rows.

mod chunks;
mod error;
mod memories;
mod schema;

pub use chunks::{ChunkRecord, ChunkStore, NewChunk};
pub use error::StoreError;
pub use memories::{MemoryNoteRecord, MemoryRowStore, NewMemoryNote};
pub use schema::ensure_schema;

pub use sqlx::PgPool;

use sqlx::postgres::PgPoolOptions;

/// Connect a pool to the vector database.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}

/// Build a pool without establishing a connection.  Queries fail at use
/// time if the database is unreachable; useful for wiring components in
/// tests that never touch the store.
pub fn connect_lazy(url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_lazy(url)?;
    Ok(pool)
}

/// The nil workflow id means "global" — notes that belong to no session.
pub fn global_workflow_id() -> uuid::Uuid {
    uuid::Uuid::nil()
}
