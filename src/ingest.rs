//! Ingestion Pipeline: fetch → convert → fingerprint → chunk → embed →
//! upsert → report.
//!
//! `web_url` sources with a crawl depth enumerate same-origin linked URLs
//! breadth-first, each becoming a separate sub-source inheriting the
//! parent's `tenant`/`source_group`.

use std::collections::{HashSet, VecDeque};

use anyhow::anyhow;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::convert::{self, MIME_HTML};
use crate::chunk::chunk_document;
use crate::embedding;
use crate::error::AppError;
use crate::fetch;
use crate::models::{DocumentRecord, IngestReport, SourceDescriptor, SourceKind};
use crate::store;

/// Runs the full pipeline for one Source Descriptor, expanding `web_url`
/// crawls into sub-sources first. Returns an aggregate report; a source
/// that fails to fetch/convert contributes a warning rather than aborting
/// the whole job.
pub async fn ingest(pool: &SqlitePool, config: &Config, source: &SourceDescriptor) -> anyhow::Result<IngestReport> {
    let sub_sources = expand_sources(source).await;

    let mut documents_ingested = 0u64;
    let mut chunks_ingested = 0u64;
    let mut warnings = Vec::new();

    for sub in &sub_sources {
        match ingest_one(pool, config, sub).await {
            Ok(Some((docs, chunks))) => {
                documents_ingested += docs;
                chunks_ingested += chunks;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(locator = %sub.locator, error = %e, "source failed, recording warning");
                warnings.push(format!("{}: {}", sub.locator, e));
            }
        }
    }

    if documents_ingested == 0 && !sub_sources.is_empty() && !warnings.is_empty() && warnings.len() == sub_sources.len() {
        return Err(anyhow!(warnings.join("; ")));
    }

    Ok(IngestReport {
        documents_ingested,
        chunks_ingested,
        warnings,
    })
}

/// Expands a `web_url` source with `deep_crawl()` set into itself plus its
/// same-origin breadth-first discoveries, up to `crawl_depth()`. All other
/// kinds, and non-deep web sources, expand to themselves only.
async fn expand_sources(source: &SourceDescriptor) -> Vec<SourceDescriptor> {
    if source.kind != SourceKind::WebUrl || !source.deep_crawl() || source.crawl_depth() == 0 {
        return vec![source.clone()];
    }

    let origin = match url_origin(&source.locator) {
        Some(o) => o,
        None => return vec![source.clone()],
    };

    let mut seen: HashSet<String> = HashSet::from([source.locator.clone()]);
    let mut queue: VecDeque<(String, u32)> = VecDeque::from([(source.locator.clone(), 0)]);
    let mut out = Vec::new();

    while let Some((locator, depth)) = queue.pop_front() {
        let mut child = source.clone();
        child.locator = locator.clone();
        let fetched = match fetch::fetch(&child).await {
            Ok(f) => f,
            Err(_) => continue,
        };
        out.push(child);

        if depth >= source.crawl_depth() {
            continue;
        }
        if fetched.content_type != MIME_HTML {
            continue;
        }

        for link in extract_same_origin_links(&fetched.bytes, &origin) {
            if seen.insert(link.clone()) {
                queue.push_back((link, depth + 1));
            }
        }
    }

    if out.is_empty() {
        vec![source.clone()]
    } else {
        out
    }
}

fn url_origin(locator: &str) -> Option<String> {
    let url = reqwest::Url::parse(locator).ok()?;
    Some(format!("{}://{}", url.scheme(), url.host_str()?))
}

fn extract_same_origin_links(html_bytes: &[u8], origin: &str) -> Vec<String> {
    let doc = scraper::Html::parse_document(&String::from_utf8_lossy(html_bytes));
    let Ok(selector) = scraper::Selector::parse("a[href]") else {
        return Vec::new();
    };
    doc.select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| {
            let base = reqwest::Url::parse(origin).ok()?;
            base.join(href).ok()
        })
        .filter(|url| format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default()) == origin)
        .map(|url| url.to_string())
        .collect()
}

/// Runs fetch→convert→fingerprint→chunk→embed→upsert for a single source.
/// Returns `None` when the fingerprint short-circuit fires (document
/// already ingested for this tenant/source_group).
async fn ingest_one(
    pool: &SqlitePool,
    config: &Config,
    source: &SourceDescriptor,
) -> anyhow::Result<Option<(u64, u64)>> {
    let fetched = fetch::fetch(source).await?;

    let canonical = convert::convert(&fetched.bytes, &fetched.content_type, fetched.title.as_deref())?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.text.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    let (tenant, source_group) = source.partition();

    let already_present: Option<String> = sqlx::query_scalar(
        "SELECT document_id FROM documents WHERE content_hash = ? AND tenant = ? AND source_group = ?",
    )
    .bind(&content_hash)
    .bind(&tenant)
    .bind(&source_group)
    .fetch_optional(pool)
    .await?;

    if already_present.is_some() {
        tracing::debug!(locator = %source.locator, "fingerprint matches existing document, short-circuiting");
        return Ok(None);
    }

    let mut chunks = chunk_document(
        &Uuid::new_v4().to_string(),
        &canonical,
        config.chunking.max_tokens_per_chunk,
        &tenant,
        &source_group,
    );

    if config.embedding.is_enabled() && !chunks.is_empty() {
        let provider = embedding::create_provider(&config.embedding)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embedding::embed_texts(provider.as_ref(), &config.embedding, &texts).await?;
        if vectors.len() != chunks.len() {
            return Err(anyhow!("embedder returned {} vectors for {} chunks", vectors.len(), chunks.len()));
        }
        for (chunk, vector) in chunks.iter_mut().zip(vectors.into_iter()) {
            chunk.embedding = Some(vector);
        }
    }

    let document = DocumentRecord {
        document_id: Uuid::new_v4().to_string(),
        title: canonical.title.clone(),
        source_locator: source.locator.clone(),
        source_kind: source.kind.as_str().to_string(),
        content: canonical.text.clone(),
        frontmatter: serde_json::json!({}),
        ingested_at: chrono::Utc::now(),
        content_hash,
        tenant,
        source_group,
    };

    let document_id = store::upsert_document(pool, &document).await?;

    let mut chunks_written = 0u64;
    for chunk in &mut chunks {
        chunk.document_id = document_id.clone();
        match store::upsert_chunk(pool, &document_id, chunk).await {
            Ok(true) => chunks_written += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(chunk_id = %chunk.chunk_id, error = %e, "chunk upsert failed, continuing"),
        }
    }

    Ok(Some((1, chunks_written)))
}

/// Synchronous CLI entry point (`ctx ingest`), bypassing the job queue.
pub async fn run_ingest_cli(config: &Config, source: &SourceDescriptor) -> Result<(), AppError> {
    let pool = crate::db::connect(config).await?;
    let report = ingest(&pool, config, source).await.map_err(AppError::from)?;
    pool.close().await;

    println!("documents ingested: {}", report.documents_ingested);
    println!("chunks ingested: {}", report.chunks_ingested);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn local_source(locator: &str) -> SourceDescriptor {
        SourceDescriptor {
            kind: SourceKind::LocalFile,
            locator: locator.to_string(),
            tenant: Some("acme".to_string()),
            source_group: Some("wiki".to_string()),
            options: json!({}),
            inline_bytes: None,
        }
    }

    #[tokio::test]
    async fn ingest_same_source_twice_is_idempotent() {
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let config = crate::config::tests_support::minimal_config();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "# Hello\nSome body text.").unwrap();
        let source = local_source(path.to_str().unwrap());

        let first = ingest(&pool, &config, &source).await.unwrap();
        assert_eq!(first.documents_ingested, 1);
        assert!(first.chunks_ingested >= 1);

        let second = ingest(&pool, &config, &source).await.unwrap();
        assert_eq!(second.documents_ingested, 0, "fingerprint short-circuit should skip re-ingest");
        assert_eq!(second.chunks_ingested, 0);

        let doc_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(doc_count, 1);
    }

    #[tokio::test]
    async fn missing_source_is_recorded_as_warning_not_panic() {
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let config = crate::config::tests_support::minimal_config();

        let source = local_source("/nonexistent/path/never/exists.md");
        let result = ingest(&pool, &config, &source).await;
        assert!(result.is_err(), "sole source failing should surface as an error for the job");
    }

    #[tokio::test]
    async fn different_tenants_do_not_short_circuit_each_other() {
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let config = crate::config::tests_support::minimal_config();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "# Hello\nSame body text everywhere.").unwrap();

        let mut source_a = local_source(path.to_str().unwrap());
        source_a.tenant = Some("tenant-a".to_string());
        let mut source_b = local_source(path.to_str().unwrap());
        source_b.tenant = Some("tenant-b".to_string());

        ingest(&pool, &config, &source_a).await.unwrap();
        let second = ingest(&pool, &config, &source_b).await.unwrap();
        assert_eq!(second.documents_ingested, 1, "different tenant partition must not short-circuit");
    }
}
