// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use quarry_model::EmbeddingClient;
use quarry_store::{ChunkStore, NewChunk};

use crate::{
    fuse, split, tokenize_query, IndexError, MergeMode, SplitLanguage, Summarizer,
};

#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    pub file_path: String,
    #[serde(default)]
    pub doc_title: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default)]
    pub file_path_filter: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub use_inverted_index: bool,
    pub use_vector_search: bool,
    #[serde(default)]
    pub merge_mode: MergeMode,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default)]
    pub rerank: bool,
}

fn default_limit() -> usize {
    10
}
fn default_alpha() -> f64 {
    0.7
}
fn default_beta() -> f64 {
    0.3
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub id: i64,
    pub file_path: String,
    pub doc_title: String,
    pub text: String,
    pub score: f64,
}

/// The hybrid retrieval engine.  Owns the ingestion pipeline and both
/// retrieval lanes; shares the vector database through [`ChunkStore`].
pub struct SefiiEngine {
    chunks: ChunkStore,
    embedder: Arc<dyn EmbeddingClient>,
    summarizer: Summarizer,
    embed_prefix: String,
    search_prefix: String,
    rerank_url: Option<String>,
    http: reqwest::Client,
}

impl SefiiEngine {
    pub fn new(
        chunks: ChunkStore,
        embedder: Arc<dyn EmbeddingClient>,
        summarizer: Summarizer,
        embed_prefix: String,
        search_prefix: String,
        rerank_url: Option<String>,
    ) -> Self {
        Self {
            chunks,
            embedder,
            summarizer,
            embed_prefix,
            search_prefix,
            rerank_url,
            http: reqwest::Client::new(),
        }
    }

    /// Ingest one document: split, summarize each chunk, embed the whole
    /// document as a single batch, then persist chunk rows followed by
    /// their postings (so every posting references a committed chunk).
    ///
    /// Summarization failures degrade per chunk (empty summary, first
    /// line as pseudo-keyword).  Embedding failure fails the whole call;
    /// nothing has been written at that point.
    pub async fn ingest(&self, req: IngestRequest) -> Result<usize, IndexError> {
        let language = SplitLanguage::parse(req.language.as_deref().unwrap_or(""));
        let doc_title = req.doc_title.unwrap_or_default();
        let pieces = split(&req.text, language, req.chunk_size, req.chunk_overlap);

        // Summarize every chunk up front; the fallback path keeps short
        // legitimate chunks ingestible even when the model balks.
        let mut prepared: Vec<(String, String, Vec<String>)> = Vec::new();
        for piece in pieces {
            if piece.trim().is_empty() {
                continue;
            }
            let (summary, extracted) = match self.summarizer.summarize(&piece).await {
                Ok(s) => (s.summary, s.keywords),
                Err(e) => {
                    warn!(file_path = %req.file_path, "chunk summarization failed: {e}; using fallback");
                    let first_line = piece
                        .lines()
                        .find(|l| !l.trim().is_empty())
                        .unwrap_or("untitled")
                        .trim()
                        .to_string();
                    (String::new(), vec![first_line])
                }
            };
            let mut keywords = req.keywords.clone();
            for kw in extracted {
                if !keywords.iter().any(|k| k.eq_ignore_ascii_case(&kw)) {
                    keywords.push(kw);
                }
            }
            prepared.push((piece, summary, keywords));
        }

        if prepared.is_empty() {
            return Ok(0);
        }

        let inputs: Vec<String> = prepared
            .iter()
            .map(|(text, summary, keywords)| {
                format!(
                    "{}{}\n{}\n{}\n{}",
                    self.embed_prefix,
                    doc_title,
                    text,
                    summary,
                    keywords.join(", ")
                )
            })
            .collect();
        let embeddings = self.embedder.embed(&inputs).await?;

        let mut written = 0usize;
        for ((text, _summary, keywords), embedding) in prepared.into_iter().zip(embeddings) {
            let id = self
                .chunks
                .insert_chunk(&NewChunk {
                    file_path: req.file_path.clone(),
                    doc_title: doc_title.clone(),
                    language: language.as_str().to_string(),
                    text,
                    keywords: keywords.clone(),
                    embedding,
                })
                .await?;
            // Postings are lowercased to match keyword-lane tokenization.
            let mut posting_keywords: Vec<String> =
                keywords.iter().map(|k| k.to_lowercase()).collect();
            posting_keywords.dedup();
            self.chunks.insert_postings(id, &posting_keywords).await?;
            written += 1;
        }

        debug!(file_path = %req.file_path, chunks = written, "document ingested");
        Ok(written)
    }

    /// Hybrid retrieval: run the enabled lanes, fuse, optionally rerank.
    pub async fn retrieve(&self, req: RetrieveRequest) -> Result<Vec<RetrievedChunk>, IndexError> {
        let file_filter = req.file_path_filter.as_deref();

        // Vector lane: cosine distance d ∈ [0,2] → similarity 1 − d/2.
        let mut vector_lane: Vec<(i64, f64)> = Vec::new();
        let mut records: HashMap<i64, quarry_store::ChunkRecord> = HashMap::new();
        if req.use_vector_search {
            let query_text = format!("{}{}", self.search_prefix, req.query);
            let embeddings = self.embedder.embed(&[query_text]).await?;
            let embedding = embeddings.into_iter().next().ok_or_else(|| {
                quarry_model::ModelError::ProviderMalformed("empty embedding batch".into())
            })?;
            let hits = self
                .chunks
                .nearest(&embedding, req.limit as i64, file_filter)
                .await?;
            for hit in hits {
                let similarity = 1.0 - hit.distance.unwrap_or(2.0) / 2.0;
                vector_lane.push((hit.id, similarity));
                records.insert(hit.id, hit);
            }
        }

        // Keyword lane: posting matches normalized by query term count.
        let mut keyword_lane: Vec<(i64, f64)> = Vec::new();
        if req.use_inverted_index {
            let terms = tokenize_query(&req.query);
            if !terms.is_empty() {
                let matches = self.chunks.posting_matches(&terms, file_filter).await?;
                let denom = terms.len() as f64;
                for (id, count) in matches {
                    keyword_lane.push((id, count as f64 / denom));
                }
            }
        }

        let fused = fuse(
            &vector_lane,
            &keyword_lane,
            req.merge_mode,
            req.alpha,
            req.beta,
            req.limit,
        );
        if fused.is_empty() {
            return Ok(Vec::new());
        }

        // Keyword-lane hits carry no row data yet; fetch what is missing.
        let missing: Vec<i64> = fused
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| !records.contains_key(id))
            .collect();
        for rec in self.chunks.by_ids(&missing).await? {
            records.insert(rec.id, rec);
        }

        let mut results: Vec<RetrievedChunk> = fused
            .into_iter()
            .filter_map(|(id, score)| {
                records.get(&id).map(|rec| RetrievedChunk {
                    id,
                    file_path: rec.file_path.clone(),
                    doc_title: rec.doc_title.clone(),
                    text: rec.text.clone(),
                    score,
                })
            })
            .collect();

        if req.rerank {
            self.rerank(&req.query, &mut results).await;
        }

        Ok(results)
    }

    /// Second-pass rerank through a cross-encoder endpoint.  Failure is
    /// never fatal: the lane-fusion ordering is returned unchanged.
    async fn rerank(&self, query: &str, results: &mut [RetrievedChunk]) {
        let Some(url) = &self.rerank_url else {
            warn!("rerank requested but no rerank_url configured");
            return;
        };
        let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        let body = json!({ "query": query, "texts": texts });

        let scores: Result<Vec<(usize, f64)>, String> = async {
            let resp = self
                .http
                .post(url)
                .json(&body)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            if !resp.status().is_success() {
                return Err(format!("rerank endpoint returned {}", resp.status()));
            }
            let items: Vec<serde_json::Value> = resp.json().await.map_err(|e| e.to_string())?;
            Ok(items
                .iter()
                .filter_map(|v| {
                    Some((
                        v["index"].as_u64()? as usize,
                        v["score"].as_f64()?,
                    ))
                })
                .collect())
        }
        .await;

        match scores {
            Ok(scores) => {
                for (index, score) in scores {
                    if let Some(r) = results.get_mut(index) {
                        r.score = score;
                    }
                }
                results.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.id.cmp(&b.id))
                });
            }
            Err(e) => warn!("rerank failed, returning fusion order: {e}"),
        }
    }

    /// Reassemble whole documents for a set of chunk ids: every chunk of
    /// each distinct `file_path`, ordered by insertion id.
    pub async fn documents_for_chunks(
        &self,
        chunk_ids: &[i64],
    ) -> Result<BTreeMap<String, Vec<String>>, IndexError> {
        let seeds = self.chunks.by_ids(chunk_ids).await?;
        let mut paths: Vec<String> = seeds.into_iter().map(|c| c.file_path).collect();
        paths.sort();
        paths.dedup();

        let mut documents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for chunk in self.chunks.by_file_paths(&paths).await? {
            documents.entry(chunk.file_path).or_default().push(chunk.text);
        }
        Ok(documents)
    }
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use quarry_model::mock::{HashEmbeddingClient, ScriptedChatClient};

    use super::*;

    const DIM: usize = 8;

    /// Engine wired to the test database, or None to skip.
    async fn test_engine(summarizer_replies: Vec<&str>) -> Option<SefiiEngine> {
        let url = std::env::var("QUARRY_TEST_DATABASE_URL").ok()?;
        let pool = quarry_store::connect(&url, 2).await.ok()?;
        quarry_store::ensure_schema(&pool, DIM).await.ok()?;
        Some(SefiiEngine::new(
            ChunkStore::new(pool),
            Arc::new(HashEmbeddingClient::new(DIM)),
            Summarizer::new(
                Arc::new(ScriptedChatClient::new(summarizer_replies)),
                None,
            ),
            "search_document: ".into(),
            "search_query: ".into(),
            None,
        ))
    }

    fn unique_path(tag: &str) -> String {
        format!("{tag}-{}.txt", uuid_like())
    }

    fn uuid_like() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("{}-{nanos}", std::process::id())
    }

    #[tokio::test]
    async fn ingest_then_keyword_retrieve() {
        let Some(engine) = test_engine(vec!["About greek letters.", "alpha, beta, gamma"]).await
        else {
            return;
        };
        let path = unique_path("sefii-kw");
        let written = engine
            .ingest(IngestRequest {
                text: "alpha beta gamma".into(),
                language: Some("DEFAULT".into()),
                file_path: path.clone(),
                doc_title: None,
                keywords: vec![],
                chunk_size: 100,
                chunk_overlap: 0,
            })
            .await
            .unwrap();
        assert_eq!(written, 1);

        let hits = engine
            .retrieve(RetrieveRequest {
                query: "beta".into(),
                file_path_filter: Some(path),
                limit: 5,
                use_inverted_index: true,
                use_vector_search: false,
                merge_mode: MergeMode::Union,
                alpha: 0.7,
                beta: 0.3,
                rerank: false,
            })
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert!(hits[0].text.contains("beta"));
    }

    #[tokio::test]
    async fn ingest_then_vector_retrieve() {
        let Some(engine) = test_engine(vec!["Letters.", "alpha, beta"]).await else {
            return;
        };
        let path = unique_path("sefii-vec");
        engine
            .ingest(IngestRequest {
                text: "alpha beta gamma".into(),
                language: None,
                file_path: path.clone(),
                doc_title: None,
                keywords: vec![],
                chunk_size: 100,
                chunk_overlap: 0,
            })
            .await
            .unwrap();

        let hits = engine
            .retrieve(RetrieveRequest {
                query: "beta".into(),
                file_path_filter: Some(path),
                limit: 5,
                use_inverted_index: false,
                use_vector_search: true,
                merge_mode: MergeMode::Union,
                alpha: 1.0,
                beta: 0.0,
                rerank: false,
            })
            .await
            .unwrap();
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn both_lanes_disabled_returns_empty() {
        let Some(engine) = test_engine(vec![]).await else {
            return;
        };
        let hits = engine
            .retrieve(RetrieveRequest {
                query: "anything".into(),
                file_path_filter: None,
                limit: 5,
                use_inverted_index: false,
                use_vector_search: false,
                merge_mode: MergeMode::Union,
                alpha: 0.7,
                beta: 0.3,
                rerank: false,
            })
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn summarizer_failure_falls_back_to_first_line() {
        // Scripted client returns a reply whose keyword pass yields only
        // an unreadable marker → summarize() errors → fallback kicks in.
        let Some(engine) = test_engine(vec!["blob", "encoded data"]).await else {
            return;
        };
        let path = unique_path("sefii-fallback");
        let written = engine
            .ingest(IngestRequest {
                text: "quixotic\nmore text".into(),
                language: None,
                file_path: path.clone(),
                doc_title: None,
                keywords: vec![],
                chunk_size: 100,
                chunk_overlap: 0,
            })
            .await
            .unwrap();
        assert_eq!(written, 1, "fallback must keep the chunk ingestible");

        // The pseudo-keyword is the first non-empty line.
        let hits = engine
            .retrieve(RetrieveRequest {
                query: "quixotic".into(),
                file_path_filter: Some(path),
                limit: 5,
                use_inverted_index: true,
                use_vector_search: false,
                merge_mode: MergeMode::Union,
                alpha: 0.0,
                beta: 1.0,
                rerank: false,
            })
            .await
            .unwrap();
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn documents_for_chunks_reassembles_in_id_order() {
        let Some(engine) =
            test_engine(vec!["s1", "k1", "s2", "k2", "s3", "k3", "s4", "k4"]).await
        else {
            return;
        };
        let path = unique_path("sefii-docs");
        engine
            .ingest(IngestRequest {
                text: format!("{}\n\n{}", "first part ".repeat(10), "second part ".repeat(10)),
                language: None,
                file_path: path.clone(),
                doc_title: None,
                keywords: vec![],
                chunk_size: 120,
                chunk_overlap: 0,
            })
            .await
            .unwrap();

        let hits = engine
            .retrieve(RetrieveRequest {
                query: "first part".into(),
                file_path_filter: Some(path.clone()),
                limit: 10,
                use_inverted_index: false,
                use_vector_search: true,
                merge_mode: MergeMode::Union,
                alpha: 1.0,
                beta: 0.0,
                rerank: false,
            })
            .await
            .unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
        let docs = engine.documents_for_chunks(&ids).await.unwrap();
        let texts = docs.get(&path).unwrap();
        assert!(texts.len() >= 2);
        // Union of returned texts must cover every retrieved chunk.
        for hit in &hits {
            assert!(texts.iter().any(|t| t == &hit.text));
        }
    }
}
