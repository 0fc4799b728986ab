//! Database schema migrations.
//!
//! Creates all required tables (documents, chunks, jobs, readings,
//! chunks_fts, chunk_vectors) idempotently. Run via `ctx init`.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations_on_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Same schema creation, against an already-open pool. Used directly by
/// tests that spin up an in-memory database rather than a file-backed one.
pub async fn run_migrations_on_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            document_id TEXT PRIMARY KEY,
            title TEXT,
            source_locator TEXT NOT NULL,
            source_kind TEXT NOT NULL,
            content TEXT NOT NULL,
            frontmatter TEXT NOT NULL DEFAULT '{}',
            ingested_at INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            tenant TEXT NOT NULL DEFAULT '',
            source_group TEXT NOT NULL DEFAULT '',
            UNIQUE(content_hash, tenant, source_group)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            token_count INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            context TEXT NOT NULL DEFAULT '[]',
            chunker_method TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            tenant TEXT NOT NULL DEFAULT '',
            source_group TEXT NOT NULL DEFAULT '',
            UNIQUE(content_hash, tenant, source_group),
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(document_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(chunk_id),
            FOREIGN KEY (document_id) REFERENCES documents(document_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                document_id UNINDEXED,
                tenant UNINDEXED,
                source_group UNINDEXED,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL,
            enqueued_at INTEGER NOT NULL,
            started_at INTEGER,
            finished_at INTEGER,
            error TEXT,
            result TEXT,
            visibility_deadline INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            reading_id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            url_kind TEXT NOT NULL,
            title TEXT,
            summary TEXT,
            key_points TEXT NOT NULL DEFAULT '[]',
            related_links TEXT NOT NULL DEFAULT '[]',
            kind_specific TEXT NOT NULL DEFAULT '{}',
            document_id TEXT,
            tenant TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_partition ON documents(tenant, source_group)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_ingested_at ON documents(ingested_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_partition ON chunks(tenant, source_group)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, enqueued_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_readings_tenant ON readings(tenant, created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
