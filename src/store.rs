//! Storage adapter: all SQL lives here. `ingest.rs`, `search.rs`, and
//! `get.rs` go through these functions rather than querying the pool
//! directly, so the partition filter and content-hash semantics stay in
//! one place.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::embedding::vec_to_blob;
use crate::models::{ChunkRecord, ChunkerMethod, CorpusFilter, DocumentRecord, HydratedChunk};

/// Inserts a document, or returns the existing row's id when a document
/// with the same `(content_hash, tenant, source_group)` already exists,
/// so re-ingesting an unchanged source is a no-op.
pub async fn upsert_document(pool: &SqlitePool, doc: &DocumentRecord) -> Result<String> {
    let existing: Option<String> = sqlx::query_scalar(
        "SELECT document_id FROM documents WHERE content_hash = ? AND tenant = ? AND source_group = ?",
    )
    .bind(&doc.content_hash)
    .bind(&doc.tenant)
    .bind(&doc.source_group)
    .fetch_optional(pool)
    .await?;

    if let Some(document_id) = existing {
        return Ok(document_id);
    }

    sqlx::query(
        r#"
        INSERT INTO documents
            (document_id, title, source_locator, source_kind, content, frontmatter,
             ingested_at, content_hash, tenant, source_group)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&doc.document_id)
    .bind(&doc.title)
    .bind(&doc.source_locator)
    .bind(&doc.source_kind)
    .bind(&doc.content)
    .bind(doc.frontmatter.to_string())
    .bind(doc.ingested_at.timestamp())
    .bind(&doc.content_hash)
    .bind(&doc.tenant)
    .bind(&doc.source_group)
    .execute(pool)
    .await?;

    Ok(doc.document_id.clone())
}

/// Inserts a chunk (and its vector, if embedded), skipping it when a chunk
/// with the same `(content_hash, tenant, source_group)` already belongs to
/// a *different* document (conservative coexist, never steals ownership —
/// see DESIGN.md's resolution of the content-hash-collision Open Question).
pub async fn upsert_chunk(pool: &SqlitePool, document_id: &str, chunk: &ChunkRecord) -> Result<bool> {
    let existing_owner: Option<String> = sqlx::query_scalar(
        "SELECT document_id FROM chunks WHERE content_hash = ? AND tenant = ? AND source_group = ?",
    )
    .bind(&chunk.content_hash)
    .bind(&chunk.tenant)
    .bind(&chunk.source_group)
    .fetch_optional(pool)
    .await?;

    if let Some(owner) = existing_owner {
        if owner != document_id {
            tracing::debug!(
                chunk_id = %chunk.chunk_id,
                existing_owner = %owner,
                "content_hash collision across documents; leaving existing chunk in place"
            );
            return Ok(false);
        }
    }

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO chunks
            (chunk_id, document_id, chunk_index, content, token_count, content_hash,
             context, chunker_method, metadata, tenant, source_group)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&chunk.chunk_id)
    .bind(document_id)
    .bind(chunk.chunk_index)
    .bind(&chunk.content)
    .bind(chunk.token_count)
    .bind(&chunk.content_hash)
    .bind(serde_json::to_string(&chunk.context)?)
    .bind(chunk.chunker_method.as_str())
    .bind(chunk.metadata.to_string())
    .bind(&chunk.tenant)
    .bind(&chunk.source_group)
    .execute(pool)
    .await?;

    sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
        .bind(&chunk.chunk_id)
        .execute(pool)
        .await?;
    sqlx::query(
        "INSERT INTO chunks_fts (chunk_id, document_id, tenant, source_group, content) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&chunk.chunk_id)
    .bind(document_id)
    .bind(&chunk.tenant)
    .bind(&chunk.source_group)
    .bind(&chunk.content)
    .execute(pool)
    .await?;

    if let Some(embedding) = &chunk.embedding {
        sqlx::query(
            "INSERT OR REPLACE INTO chunk_vectors (chunk_id, document_id, dims, embedding) VALUES (?, ?, ?, ?)",
        )
        .bind(&chunk.chunk_id)
        .bind(document_id)
        .bind(embedding.len() as i64)
        .bind(vec_to_blob(embedding))
        .execute(pool)
        .await?;
    }

    Ok(true)
}

pub async fn get_document(pool: &SqlitePool, document_id: &str) -> Result<Option<DocumentRecord>> {
    let row = sqlx::query(
        "SELECT document_id, title, source_locator, source_kind, content, frontmatter, \
                ingested_at, content_hash, tenant, source_group FROM documents WHERE document_id = ?",
    )
    .bind(document_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(document_from_row))
}

fn document_from_row(row: sqlx::sqlite::SqliteRow) -> DocumentRecord {
    let frontmatter_text: String = row.get("frontmatter");
    DocumentRecord {
        document_id: row.get("document_id"),
        title: row.get("title"),
        source_locator: row.get("source_locator"),
        source_kind: row.get("source_kind"),
        content: row.get("content"),
        frontmatter: serde_json::from_str(&frontmatter_text).unwrap_or(serde_json::json!({})),
        ingested_at: chrono::DateTime::from_timestamp(row.get("ingested_at"), 0).unwrap_or_default(),
        content_hash: row.get("content_hash"),
        tenant: row.get("tenant"),
        source_group: row.get("source_group"),
    }
}

/// One scored candidate from either search branch, before hydration.
pub struct RankedChunkId {
    pub chunk_id: String,
    pub rank: i64,
}

/// FTS5 BM25 lexical candidates, best rank first.
pub async fn text_search(
    pool: &SqlitePool,
    query: &str,
    filter: &CorpusFilter,
    candidate_k: i64,
) -> Result<Vec<RankedChunkId>> {
    let rows = sqlx::query(
        r#"
        SELECT chunk_id, rank
        FROM chunks_fts
        WHERE chunks_fts MATCH ?
          AND (? = '' OR tenant = ?)
          AND (? = '' OR source_group = ?)
        ORDER BY rank
        LIMIT ?
        "#,
    )
    .bind(query)
    .bind(filter.tenant.clone().unwrap_or_default())
    .bind(filter.tenant.clone().unwrap_or_default())
    .bind(filter.source_group.clone().unwrap_or_default())
    .bind(filter.source_group.clone().unwrap_or_default())
    .bind(candidate_k)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .enumerate()
        .map(|(i, row)| RankedChunkId {
            chunk_id: row.get("chunk_id"),
            rank: i as i64 + 1,
        })
        .collect())
}

/// Brute-force cosine-similarity candidates, best similarity first.
///
/// This is a full scan over `chunk_vectors`, a deliberate execution-strategy
/// choice for the store backend this crate ships (see DESIGN.md): it does
/// not change what `index_missing` means, since a vector index is still a
/// distinct, independently-configurable capability the Validator checks for.
pub async fn vector_search(
    pool: &SqlitePool,
    query_vector: &[f32],
    filter: &CorpusFilter,
    candidate_k: i64,
) -> Result<Vec<RankedChunkId>> {
    let rows = sqlx::query(
        r#"
        SELECT cv.chunk_id, cv.embedding
        FROM chunk_vectors cv
        JOIN chunks c ON c.chunk_id = cv.chunk_id
        WHERE (? = '' OR c.tenant = ?) AND (? = '' OR c.source_group = ?)
        "#,
    )
    .bind(filter.tenant.clone().unwrap_or_default())
    .bind(filter.tenant.clone().unwrap_or_default())
    .bind(filter.source_group.clone().unwrap_or_default())
    .bind(filter.source_group.clone().unwrap_or_default())
    .fetch_all(pool)
    .await?;

    let mut scored: Vec<(String, f32)> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = crate::embedding::blob_to_vec(&blob);
            let sim = crate::embedding::cosine_similarity(query_vector, &vec);
            (row.get("chunk_id"), sim)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(candidate_k as usize);

    Ok(scored
        .into_iter()
        .enumerate()
        .map(|(i, (chunk_id, _))| RankedChunkId {
            chunk_id,
            rank: i as i64 + 1,
        })
        .collect())
}

/// Joins chunk ids (in caller-supplied order, with caller-supplied scores)
/// against `chunks`/`documents` to build display-ready results.
pub async fn hydrate_chunks(
    pool: &SqlitePool,
    ranked: &[(String, f64)],
) -> Result<Vec<HydratedChunk>> {
    let mut out = Vec::with_capacity(ranked.len());
    for (chunk_id, score) in ranked {
        let row = sqlx::query(
            r#"
            SELECT c.chunk_id, c.document_id, c.chunk_index, c.content, c.token_count,
                   c.content_hash, c.context, c.chunker_method, c.metadata, c.tenant, c.source_group,
                   d.title, d.source_locator
            FROM chunks c
            JOIN documents d ON d.document_id = c.document_id
            WHERE c.chunk_id = ?
            "#,
        )
        .bind(chunk_id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else { continue };

        let context_text: String = row.get("context");
        let method_text: String = row.get("chunker_method");
        let metadata_text: String = row.get("metadata");

        let chunk = ChunkRecord {
            chunk_id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            chunk_index: row.get("chunk_index"),
            content: row.get("content"),
            token_count: row.get("token_count"),
            embedding: None,
            content_hash: row.get("content_hash"),
            context: serde_json::from_str(&context_text).unwrap_or_default(),
            chunker_method: method_text.parse::<ChunkerMethod>().unwrap_or(ChunkerMethod::Fallback),
            metadata: serde_json::from_str(&metadata_text).unwrap_or(serde_json::json!({})),
            tenant: row.get("tenant"),
            source_group: row.get("source_group"),
        };

        out.push(HydratedChunk {
            chunk,
            document_title: row.get("title"),
            source_locator: row.get("source_locator"),
            score: *score,
            warning: None,
        });
    }
    Ok(out)
}
