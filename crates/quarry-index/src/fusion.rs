// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Pure score-fusion across the two retrieval lanes.
//!
//! Kept free of I/O so the merge semantics (union / intersect /
//! weighted, tie-breaking, top-K truncation) are testable without a
//! database.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How the two lanes are combined.
///
/// `Weighted` scores like `Union` but is the caller's signal that
/// `alpha + beta` is intentionally not normalized to 1 — lanes of
/// unequal confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    #[default]
    Union,
    Intersect,
    Weighted,
}

/// Fuse lane scores.  Inputs are `(chunk_id, lane_score)` pairs with
/// scores already normalized to `[0, 1]`; a chunk missing from a lane
/// scores 0 there.  Output is sorted by combined score descending, ties
/// broken by chunk id ascending, truncated to `k`.
pub fn fuse(
    vector: &[(i64, f64)],
    keyword: &[(i64, f64)],
    mode: MergeMode,
    alpha: f64,
    beta: f64,
    k: usize,
) -> Vec<(i64, f64)> {
    let v: HashMap<i64, f64> = vector.iter().copied().collect();
    let kw: HashMap<i64, f64> = keyword.iter().copied().collect();

    let ids: Vec<i64> = match mode {
        MergeMode::Union | MergeMode::Weighted => {
            let mut ids: Vec<i64> = v.keys().chain(kw.keys()).copied().collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        }
        MergeMode::Intersect => {
            let mut ids: Vec<i64> = v.keys().filter(|id| kw.contains_key(id)).copied().collect();
            ids.sort_unstable();
            ids
        }
    };

    let mut scored: Vec<(i64, f64)> = ids
        .into_iter()
        .map(|id| {
            let s_v = v.get(&id).copied().unwrap_or(0.0);
            let s_k = kw.get(&id).copied().unwrap_or(0.0);
            (id, alpha * s_v + beta * s_k)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}

/// Stopwords dropped from keyword-lane queries.  The classic small
/// English list; anything longer hurts recall on code-heavy text.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Tokenize a query for the keyword lane: lowercase, split on
/// non-alphanumerics, keep terms of length ≥ 2, drop stopwords,
/// deduplicate preserving order.
pub fn tokenize_query(query: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !STOPWORDS.contains(t))
        .filter(|t| seen.insert(t.to_string()))
        .map(String::from)
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_includes_both_lanes() {
        let out = fuse(&[(1, 0.8)], &[(2, 0.5)], MergeMode::Union, 0.7, 0.3, 10);
        let ids: Vec<i64> = out.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn union_missing_lane_scores_zero() {
        let out = fuse(&[(1, 1.0)], &[], MergeMode::Union, 0.7, 0.3, 10);
        assert!((out[0].1 - 0.7).abs() < 1e-9);
    }

    #[test]
    fn intersect_keeps_only_shared_ids() {
        let out = fuse(
            &[(1, 0.9), (2, 0.8)],
            &[(2, 0.5), (3, 0.4)],
            MergeMode::Intersect,
            0.5,
            0.5,
            10,
        );
        let ids: Vec<i64> = out.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn intersect_disjoint_lanes_is_empty() {
        let out = fuse(&[(1, 0.9)], &[(2, 0.9)], MergeMode::Intersect, 0.5, 0.5, 10);
        assert!(out.is_empty());
    }

    #[test]
    fn both_lanes_empty_is_empty() {
        assert!(fuse(&[], &[], MergeMode::Union, 0.7, 0.3, 10).is_empty());
    }

    #[test]
    fn combined_score_is_weighted_sum() {
        let out = fuse(&[(1, 0.5)], &[(1, 1.0)], MergeMode::Union, 0.6, 0.4, 10);
        assert!((out[0].1 - (0.6 * 0.5 + 0.4 * 1.0)).abs() < 1e-9);
    }

    #[test]
    fn weighted_mode_allows_unnormalized_weights() {
        let out = fuse(&[(1, 1.0)], &[(1, 1.0)], MergeMode::Weighted, 1.0, 1.0, 10);
        assert!((out[0].1 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn ties_break_by_ascending_id() {
        let out = fuse(
            &[(7, 0.5), (3, 0.5)],
            &[],
            MergeMode::Union,
            1.0,
            0.0,
            10,
        );
        let ids: Vec<i64> = out.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![3, 7]);
    }

    #[test]
    fn results_sorted_by_score_descending() {
        let out = fuse(
            &[(1, 0.2), (2, 0.9), (3, 0.5)],
            &[],
            MergeMode::Union,
            1.0,
            0.0,
            10,
        );
        let ids: Vec<i64> = out.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn top_k_truncates() {
        let vector: Vec<(i64, f64)> = (0..20).map(|i| (i, i as f64 / 20.0)).collect();
        let out = fuse(&vector, &[], MergeMode::Union, 1.0, 0.0, 5);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn merge_mode_deserializes_lowercase() {
        let m: MergeMode = serde_json::from_str("\"intersect\"").unwrap();
        assert_eq!(m, MergeMode::Intersect);
    }

    // ── tokenize_query ────────────────────────────────────────────────────────

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize_query("Beta-Gamma DELTA"),
            vec!["beta", "gamma", "delta"]
        );
    }

    #[test]
    fn tokenize_drops_short_terms_and_stopwords() {
        assert_eq!(
            tokenize_query("a note on the I/O subsystem"),
            vec!["note", "subsystem"]
        );
    }

    #[test]
    fn tokenize_dedupes_preserving_order() {
        assert_eq!(tokenize_query("beta beta alpha beta"), vec!["beta", "alpha"]);
    }

    #[test]
    fn tokenize_empty_query_is_empty() {
        assert!(tokenize_query("  !! ").is_empty());
    }
}
