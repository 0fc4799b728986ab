//! Retrieval engine: lexical, semantic, and hybrid search over stored chunks.
//!
//! - **Lexical** — FTS5 BM25 ranking via `chunks_fts`.
//! - **Semantic** — cosine similarity over stored embedding vectors.
//! - **Hybrid** — true Reciprocal Rank Fusion (RRF) over both candidate
//!   lists: `score = sum(1 / (k + rank))` across whichever branches ran,
//!   not a normalized weighted blend. `k` is `retrieval.rrf_constant`
//!   (default 60, the standard RRF constant).
//!
//! Both branches run concurrently and each carries its own deadline
//! (`retrieval.per_query_timeout_seconds`). If one branch times out or
//! errors under hybrid mode, the other branch's results are still
//! returned with a `warning` noting the degradation — only when both
//! branches fail does hybrid mode return an error.

use std::collections::HashMap;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::time::timeout;

use crate::config::Config;
use crate::embedding;
use crate::error::AppError;
use crate::models::{CorpusFilter, HydratedChunk, SearchMode};
use crate::store;

/// Runs a search and returns hydrated, scored results sorted best-first,
/// truncated to `match_count` (or `retrieval.default_match_count`).
pub async fn search(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    mode: SearchMode,
    filter: &CorpusFilter,
    match_count: Option<i64>,
) -> Result<Vec<HydratedChunk>, AppError> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let match_count = match_count
        .unwrap_or(config.retrieval.default_match_count)
        .min(config.retrieval.max_match_count)
        .max(1);

    if matches!(mode, SearchMode::Semantic | SearchMode::Hybrid) && !config.embedding.is_enabled() {
        return Err(AppError::dependency_unavailable(format!(
            "mode '{mode:?}' requires embeddings, but embedding.provider is disabled"
        )));
    }

    let candidate_k = (match_count * 4).max(20);
    let deadline = Duration::from_secs(config.retrieval.per_query_timeout_seconds);

    let want_text = matches!(mode, SearchMode::Lexical | SearchMode::Hybrid);
    let want_vector = matches!(mode, SearchMode::Semantic | SearchMode::Hybrid);

    let text_fut = async {
        if !want_text {
            return Ok(Vec::new());
        }
        match timeout(deadline, store::text_search(pool, query, filter, candidate_k)).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::deadline_exceeded("text_search")),
        }
    };

    let vector_fut = async {
        if !want_vector {
            return Ok(Vec::new());
        }
        let provider = embedding::create_provider(&config.embedding).map_err(AppError::from)?;
        let query_vec = embedding::embed_query(provider.as_ref(), &config.embedding, query)
            .await
            .map_err(AppError::from)?;
        match timeout(
            deadline,
            store::vector_search(pool, &query_vec, filter, candidate_k),
        )
        .await
        {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::deadline_exceeded("vector_search")),
        }
    };

    let (text_result, vector_result) = tokio::join!(text_fut, vector_fut);

    let mut degraded: Option<String> = None;

    let text_ranked = match (mode, text_result) {
        (SearchMode::Lexical, Err(e)) => return Err(e),
        (_, Err(e)) => {
            tracing::warn!(error = %e, "lexical branch failed in hybrid mode");
            degraded = Some(format!("lexical search failed: {e}"));
            None
        }
        (_, Ok(v)) => Some(v),
    };

    let vector_ranked = match (mode, vector_result) {
        (SearchMode::Semantic, Err(e)) => return Err(e),
        (_, Err(e)) => {
            tracing::warn!(error = %e, "semantic branch failed in hybrid mode");
            degraded = Some(match degraded {
                Some(prev) => format!("{prev}; semantic search failed: {e}"),
                None => format!("semantic search failed: {e}"),
            });
            None
        }
        (_, Ok(v)) => Some(v),
    };

    if mode == SearchMode::Hybrid && text_ranked.is_none() && vector_ranked.is_none() {
        return Err(AppError::dependency_unavailable(
            degraded.unwrap_or_else(|| "both hybrid branches failed".to_string()),
        ));
    }

    let text_ranked = text_ranked.unwrap_or_default();
    let vector_ranked = vector_ranked.unwrap_or_default();

    let fused = rrf_fuse(&text_ranked, &vector_ranked, config.retrieval.rrf_constant);
    let top: Vec<(String, f64)> = fused.into_iter().take(match_count as usize).collect();

    let mut hydrated = store::hydrate_chunks(pool, &top).await?;
    if let Some(reason) = &degraded {
        for h in &mut hydrated {
            h.warning = Some(reason.clone());
        }
    }
    hydrated.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });

    Ok(hydrated)
}

/// Reciprocal Rank Fusion: `score(d) = sum over lists containing d of 1 / (k + rank(d))`.
/// A chunk present in both lists accumulates both terms. Monotonic in rank:
/// a better (lower-numbered) rank in either list can only raise the score.
fn rrf_fuse(
    text_ranked: &[store::RankedChunkId],
    vector_ranked: &[store::RankedChunkId],
    k: f64,
) -> Vec<(String, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for r in text_ranked {
        *scores.entry(r.chunk_id.clone()).or_insert(0.0) += 1.0 / (k + r.rank as f64);
    }
    for r in vector_ranked {
        *scores.entry(r.chunk_id.clone()).or_insert(0.0) += 1.0 / (k + r.rank as f64);
    }
    let mut out: Vec<(String, f64)> = scores.into_iter().collect();
    out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RankedChunkId;

    fn ranked(ids: &[(&str, i64)]) -> Vec<RankedChunkId> {
        ids.iter()
            .map(|(id, rank)| RankedChunkId {
                chunk_id: id.to_string(),
                rank: *rank,
            })
            .collect()
    }

    #[test]
    fn rrf_score_monotonic_in_rank() {
        let text = ranked(&[("a", 1), ("b", 2), ("c", 3)]);
        let fused = rrf_fuse(&text, &[], 60.0);
        let score = |id: &str| fused.iter().find(|(c, _)| c == id).unwrap().1;
        assert!(score("a") > score("b"));
        assert!(score("b") > score("c"));
    }

    #[test]
    fn rrf_rewards_presence_in_both_lists() {
        let text = ranked(&[("a", 1), ("b", 2)]);
        let vector = ranked(&[("b", 1), ("c", 2)]);
        let fused = rrf_fuse(&text, &vector, 60.0);
        let score = |id: &str| fused.iter().find(|(c, _)| c == id).unwrap().1;
        assert!(score("b") > score("a"));
        assert!(score("b") > score("c"));
    }

    #[test]
    fn rrf_empty_lists_produce_no_candidates() {
        let fused = rrf_fuse(&[], &[], 60.0);
        assert!(fused.is_empty());
    }

    #[test]
    fn rrf_constant_dampens_top_rank_advantage() {
        let text = ranked(&[("a", 1)]);
        let fused_small_k = rrf_fuse(&text, &[], 1.0);
        let fused_large_k = rrf_fuse(&text, &[], 1000.0);
        assert!(fused_small_k[0].1 > fused_large_k[0].1);
    }

    #[tokio::test]
    async fn lexical_search_on_empty_store_returns_empty() {
        let config = crate::config::tests_support::minimal_config();
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let filter = CorpusFilter::default();
        let results = search(&pool, &config, "anything", SearchMode::Lexical, &filter, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn semantic_mode_with_disabled_embeddings_is_dependency_unavailable() {
        let config = crate::config::tests_support::minimal_config();
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let filter = CorpusFilter::default();
        let err = search(&pool, &config, "anything", SearchMode::Semantic, &filter, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::DependencyUnavailable);
    }
}
