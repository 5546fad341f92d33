// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use pgvector::Vector;
use sqlx::{PgPool, Row};

use crate::StoreError;

/// A chunk row as stored.  `distance` is populated only by similarity
/// queries (cosine distance to the query embedding, in `[0, 2]`).
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: i64,
    pub file_path: String,
    pub doc_title: String,
    pub language: String,
    pub text: String,
    pub keywords: Vec<String>,
    pub distance: Option<f64>,
}

/// A chunk about to be inserted.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub file_path: String,
    pub doc_title: String,
    pub language: String,
    pub text: String,
    pub keywords: Vec<String>,
    pub embedding: Vec<f32>,
}

/// SQL access to `chunks` and `inverted_index`.
#[derive(Clone)]
pub struct ChunkStore {
    pool: PgPool,
}

impl ChunkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one chunk row and return its id.  The caller writes
    /// postings afterwards so every posting references a committed chunk.
    pub async fn insert_chunk(&self, chunk: &NewChunk) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO chunks (file_path, doc_title, language, text, keywords, embedding)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(&chunk.file_path)
        .bind(&chunk.doc_title)
        .bind(&chunk.language)
        .bind(&chunk.text)
        .bind(&chunk.keywords)
        .bind(Vector::from(chunk.embedding.clone()))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Insert one posting per keyword for an already-committed chunk.
    pub async fn insert_postings(
        &self,
        chunk_id: i64,
        keywords: &[String],
    ) -> Result<(), StoreError> {
        for keyword in keywords {
            sqlx::query("INSERT INTO inverted_index (keyword, chunk_id) VALUES ($1, $2)")
                .bind(keyword)
                .bind(chunk_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// K nearest chunks by cosine distance, optionally restricted to one
    /// document path.
    pub async fn nearest(
        &self,
        embedding: &[f32],
        limit: i64,
        file_path: Option<&str>,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let query_vec = Vector::from(embedding.to_vec());
        let rows = match file_path {
            Some(path) => {
                sqlx::query(
                    "SELECT id, file_path, doc_title, language, text, keywords,
                            embedding <=> $1 AS distance
                     FROM chunks
                     WHERE file_path = $2
                     ORDER BY embedding <=> $1
                     LIMIT $3",
                )
                .bind(&query_vec)
                .bind(path)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, file_path, doc_title, language, text, keywords,
                            embedding <=> $1 AS distance
                     FROM chunks
                     ORDER BY embedding <=> $1
                     LIMIT $2",
                )
                .bind(&query_vec)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(record_with_distance).collect())
    }

    /// Posting match counts per chunk for the given query terms.
    pub async fn posting_matches(
        &self,
        terms: &[String],
        file_path: Option<&str>,
    ) -> Result<HashMap<i64, usize>, StoreError> {
        if terms.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = match file_path {
            Some(path) => {
                sqlx::query(
                    "SELECT i.chunk_id, COUNT(*) AS matches
                     FROM inverted_index i
                     JOIN chunks c ON c.id = i.chunk_id
                     WHERE i.keyword = ANY($1) AND c.file_path = $2
                     GROUP BY i.chunk_id",
                )
                .bind(terms)
                .bind(path)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT chunk_id, COUNT(*) AS matches
                     FROM inverted_index
                     WHERE keyword = ANY($1)
                     GROUP BY chunk_id",
                )
                .bind(terms)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.get::<i64, _>("chunk_id"),
                    r.get::<i64, _>("matches") as usize,
                )
            })
            .collect())
    }

    /// Fetch chunk rows by id.  Order follows ascending id, not input order.
    pub async fn by_ids(&self, ids: &[i64]) -> Result<Vec<ChunkRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, file_path, doc_title, language, text, keywords
             FROM chunks
             WHERE id = ANY($1)
             ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(record_without_distance).collect())
    }

    /// All chunks of every listed document path, ordered by insertion id.
    pub async fn by_file_paths(&self, paths: &[String]) -> Result<Vec<ChunkRecord>, StoreError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, file_path, doc_title, language, text, keywords
             FROM chunks
             WHERE file_path = ANY($1)
             ORDER BY id",
        )
        .bind(paths)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(record_without_distance).collect())
    }
}

fn record_with_distance(row: sqlx::postgres::PgRow) -> ChunkRecord {
    ChunkRecord {
        id: row.get("id"),
        file_path: row.get("file_path"),
        doc_title: row.get("doc_title"),
        language: row.get("language"),
        text: row.get("text"),
        keywords: row.get("keywords"),
        distance: Some(row.get::<f64, _>("distance")),
    }
}

fn record_without_distance(row: sqlx::postgres::PgRow) -> ChunkRecord {
    ChunkRecord {
        id: row.get("id"),
        file_path: row.get("file_path"),
        doc_title: row.get("doc_title"),
        language: row.get("language"),
        text: row.get("text"),
        keywords: row.get("keywords"),
        distance: None,
    }
}

// ─── Integration tests ───────────────────────────────────────────────────────
