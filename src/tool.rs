//! The agent-facing retrieval tool.
//!
//! `search_knowledge_base` is a plain async function — there is no tool
//! registry in this crate. It never raises: every failure path, including a
//! malformed mode string or a backend error, is folded into the returned
//! string.

use sqlx::SqlitePool;

use crate::config::Config;
use crate::models::{CorpusFilter, SearchMode};
use crate::search;

/// Renders the top matches for `query` as a human-readable string: one
/// block per result separated by a blank line, `"No relevant information
/// found in the knowledge base."` when there are no matches, or a one-line
/// `"Error searching knowledge base: "` message on failure.
pub async fn search_knowledge_base(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    match_count: Option<i64>,
    search_type: Option<&str>,
) -> String {
    let mode = match search_type.unwrap_or("semantic") {
        "semantic" => SearchMode::Semantic,
        "hybrid" => SearchMode::Hybrid,
        other => {
            return format!(
                "Error searching knowledge base: unknown search_type '{other}', expected 'semantic' or 'hybrid'"
            )
        }
    };

    let filter = CorpusFilter::default();

    let results = match search::search(pool, config, query, mode, &filter, match_count).await {
        Ok(r) => r,
        Err(e) => return format!("Error searching knowledge base: {}", e.message),
    };

    if results.is_empty() {
        return "No relevant information found in the knowledge base.".to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let title = r.document_title.as_deref().unwrap_or("(untitled)");
            format!(
                "--- Document {}: {} (relevance: {:.4}) ---\n{}",
                i + 1,
                title,
                r.score,
                r.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_search_type_never_panics() {
        let config = crate::config::tests_support::minimal_config();
        let pool = crate::db::tests_support::memory_pool().await;
        let msg = search_knowledge_base(&pool, &config, "anything", None, Some("bogus")).await;
        assert!(msg.starts_with("Error searching knowledge base: "));
    }

    #[tokio::test]
    async fn disabled_embeddings_surface_as_error_string_not_panic() {
        let config = crate::config::tests_support::minimal_config();
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let msg = search_knowledge_base(&pool, &config, "anything", None, Some("semantic")).await;
        assert!(msg.starts_with("Error searching knowledge base: "));
    }
}
