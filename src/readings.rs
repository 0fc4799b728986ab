//! Reading Record ingestion: a user-saved URL that is fetched, classified
//! (`web` vs `youtube`), optionally ingested into the document store, and
//! optionally summarized.
//!
//! Summarization needs a reasoning LLM, which sits outside this crate's
//! retrieval core — so it is an opaque seam here, the same shape as
//! `convert::AudioTranscriber`: a trait plus an unimplemented default,
//! gated behind the `reasoning_llm_reachable` validator capability rather
//! than a concrete integration.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::convert::CanonicalDocument;
use crate::error::AppError;
use crate::fetch::{self, FetchedSource};
use crate::models::{RelatedLink, SourceDescriptor, SourceKind, UrlKind};
use crate::models::ReadingRecord;

/// Output of a summarization pass over a fetched Reading's canonical text.
pub struct SummaryOutput {
    pub summary: String,
    pub key_points: Vec<String>,
    pub related_links: Vec<RelatedLink>,
}

pub trait Summarizer: Send + Sync {
    fn summarize(&self, canonical: &CanonicalDocument) -> Result<SummaryOutput>;
}

/// Default summarizer: no reasoning LLM is wired in this deployment.
/// `save_reading` treats its error as a degrade, not a failure — the
/// Reading Record is still saved with an empty summary.
pub struct UnimplementedSummarizer;

impl Summarizer for UnimplementedSummarizer {
    fn summarize(&self, _canonical: &CanonicalDocument) -> Result<SummaryOutput> {
        anyhow::bail!("no reasoning LLM configured; set validator.reasoning_llm_url and wire a Summarizer")
    }
}

fn classify_url(url: &str) -> UrlKind {
    match reqwest::Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) if host.contains("youtube.com") || host.contains("youtu.be") => UrlKind::Youtube,
            _ => UrlKind::Web,
        },
        Err(_) => UrlKind::Web,
    }
}

fn youtube_video_id(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    if parsed.host_str()? == "youtu.be" {
        return parsed.path_segments()?.next().map(str::to_string);
    }
    parsed
        .query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.to_string())
}

/// Fetches and saves a Reading Record for `url`. Best-effort ingestion into
/// the document store and best-effort summarization: either failing only
/// degrades the saved record (no title/summary, or no `document_id`), it
/// never prevents the save.
pub async fn save_reading(
    pool: &SqlitePool,
    config: &crate::config::Config,
    url: &str,
    tenant: Option<String>,
    summarizer: &dyn Summarizer,
) -> Result<ReadingRecord, AppError> {
    let url_kind = classify_url(url);

    let source = SourceDescriptor {
        kind: SourceKind::WebUrl,
        locator: url.to_string(),
        tenant: tenant.clone(),
        source_group: Some("readings".to_string()),
        options: serde_json::json!({}),
        inline_bytes: None,
    };

    let fetched: Option<FetchedSource> = fetch::fetch(&source).await.ok();

    let canonical = fetched
        .as_ref()
        .and_then(|f| crate::convert::convert(&f.bytes, &f.content_type, f.title.as_deref()).ok());

    let document_id = if canonical.is_some() {
        match crate::ingest::ingest(pool, config, &source).await {
            Ok(report) if report.documents_ingested > 0 => document_id_for_locator(pool, url, &source).await,
            Ok(_) => document_id_for_locator(pool, url, &source).await,
            Err(e) => {
                tracing::warn!(url, error = %e, "reading content ingest failed, saving reading without a document");
                None
            }
        }
    } else {
        None
    };

    let kind_specific = match url_kind {
        UrlKind::Youtube => serde_json::json!({ "video_id": youtube_video_id(url) }),
        UrlKind::Web => serde_json::json!({}),
    };

    let (summary, key_points, related_links) = match canonical.as_ref().map(|c| summarizer.summarize(c)) {
        Some(Ok(out)) => (Some(out.summary), out.key_points, out.related_links),
        Some(Err(e)) => {
            tracing::debug!(url, error = %e, "no summarizer available, saving reading without a summary");
            (None, Vec::new(), Vec::new())
        }
        None => (None, Vec::new(), Vec::new()),
    };

    let record = ReadingRecord {
        reading_id: Uuid::new_v4().to_string(),
        url: url.to_string(),
        url_kind,
        title: canonical.as_ref().and_then(|c| c.title.clone()),
        summary,
        key_points,
        related_links,
        kind_specific,
        document_id,
        created_at: chrono::Utc::now(),
    };

    persist(pool, &record, &tenant.unwrap_or_default()).await?;
    Ok(record)
}

async fn document_id_for_locator(pool: &SqlitePool, _url: &str, source: &SourceDescriptor) -> Option<String> {
    let (tenant, source_group) = source.partition();
    sqlx::query_scalar::<_, String>(
        "SELECT document_id FROM documents WHERE source_locator = ? AND tenant = ? AND source_group = ? \
         ORDER BY ingested_at DESC LIMIT 1",
    )
    .bind(&source.locator)
    .bind(tenant)
    .bind(source_group)
    .fetch_optional(pool)
    .await
    .ok()
    .flatten()
}

async fn persist(pool: &SqlitePool, record: &ReadingRecord, tenant: &str) -> Result<(), AppError> {
    let key_points = serde_json::to_string(&record.key_points).map_err(|e| AppError::internal(e.to_string()))?;
    let related_links = serde_json::to_string(&record.related_links).map_err(|e| AppError::internal(e.to_string()))?;
    let kind_specific = serde_json::to_string(&record.kind_specific).map_err(|e| AppError::internal(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO readings
            (reading_id, url, url_kind, title, summary, key_points, related_links, kind_specific, document_id, tenant, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.reading_id)
    .bind(&record.url)
    .bind(record.url_kind.as_str())
    .bind(&record.title)
    .bind(&record.summary)
    .bind(key_points)
    .bind(related_links)
    .bind(kind_specific)
    .bind(&record.document_id)
    .bind(tenant)
    .bind(record.created_at.timestamp())
    .execute(pool)
    .await?;

    Ok(())
}

/// Summary row for the `GET /readings` listing.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingSummary {
    pub reading_id: String,
    pub url: String,
    pub url_kind: String,
    pub title: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn list_readings(pool: &SqlitePool, tenant: Option<&str>, limit: i64) -> Result<Vec<ReadingSummary>, AppError> {
    let tenant = tenant.unwrap_or("");
    let rows = sqlx::query(
        "SELECT reading_id, url, url_kind, title, created_at FROM readings \
         WHERE (? = '' OR tenant = ?) ORDER BY created_at DESC LIMIT ?",
    )
    .bind(tenant)
    .bind(tenant)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ReadingSummary {
            reading_id: row.get("reading_id"),
            url: row.get("url"),
            url_kind: row.get("url_kind"),
            title: row.get("title"),
            created_at: chrono::DateTime::from_timestamp(row.get("created_at"), 0).unwrap_or_default(),
        })
        .collect())
}

pub async fn get_reading(pool: &SqlitePool, reading_id: &str) -> Result<Option<ReadingRecord>, AppError> {
    let row = sqlx::query(
        "SELECT reading_id, url, url_kind, title, summary, key_points, related_links, kind_specific, document_id, created_at \
         FROM readings WHERE reading_id = ?",
    )
    .bind(reading_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else { return Ok(None) };

    let url_kind_text: String = row.get("url_kind");
    let url_kind = if url_kind_text == "youtube" { UrlKind::Youtube } else { UrlKind::Web };

    let key_points_text: String = row.get("key_points");
    let related_links_text: String = row.get("related_links");
    let kind_specific_text: String = row.get("kind_specific");

    Ok(Some(ReadingRecord {
        reading_id: row.get("reading_id"),
        url: row.get("url"),
        url_kind,
        title: row.get("title"),
        summary: row.get("summary"),
        key_points: serde_json::from_str(&key_points_text).unwrap_or_default(),
        related_links: serde_json::from_str(&related_links_text).unwrap_or_default(),
        kind_specific: serde_json::from_str(&kind_specific_text).unwrap_or_default(),
        document_id: row.get("document_id"),
        created_at: chrono::DateTime::from_timestamp(row.get("created_at"), 0).unwrap_or_default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_url_recognizes_youtube_hosts() {
        assert_eq!(classify_url("https://www.youtube.com/watch?v=abc123"), UrlKind::Youtube);
        assert_eq!(classify_url("https://youtu.be/abc123"), UrlKind::Youtube);
        assert_eq!(classify_url("https://example.com/article"), UrlKind::Web);
    }

    #[test]
    fn youtube_video_id_extracted_from_both_url_shapes() {
        assert_eq!(
            youtube_video_id("https://www.youtube.com/watch?v=abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(youtube_video_id("https://youtu.be/xyz789").as_deref(), Some("xyz789"));
    }

    #[tokio::test]
    async fn save_reading_on_unreachable_url_still_persists_a_record() {
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let config = crate::config::tests_support::minimal_config();

        let record = save_reading(
            &pool,
            &config,
            "https://this-host-does-not-resolve.invalid/page",
            Some("acme".to_string()),
            &UnimplementedSummarizer,
        )
        .await
        .unwrap();

        assert!(record.document_id.is_none());
        assert!(record.summary.is_none());

        let fetched = get_reading(&pool, &record.reading_id).await.unwrap().unwrap();
        assert_eq!(fetched.url, record.url);
    }

    #[tokio::test]
    async fn list_readings_filters_by_tenant() {
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let config = crate::config::tests_support::minimal_config();

        save_reading(&pool, &config, "https://a.invalid/one", Some("tenant-a".to_string()), &UnimplementedSummarizer)
            .await
            .unwrap();
        save_reading(&pool, &config, "https://b.invalid/two", Some("tenant-b".to_string()), &UnimplementedSummarizer)
            .await
            .unwrap();

        let only_a = list_readings(&pool, Some("tenant-a"), 10).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].url, "https://a.invalid/one");

        let all = list_readings(&pool, None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
