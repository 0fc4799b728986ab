//! Document retrieval by ID, used by the `ctx get` CLI command and
//! `GET /documents/{id}` endpoint (both internal to this crate; the wire
//! surface proper is the eight routes in `server.rs`).

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::models::{ChunkerMethod, ChunkRecord};
use crate::store;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub document_id: String,
    pub title: Option<String>,
    pub source_locator: String,
    pub source_kind: String,
    pub content: String,
    pub frontmatter: serde_json::Value,
    pub ingested_at: String,
    pub tenant: String,
    pub source_group: String,
    pub chunks: Vec<ChunkResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub chunk_index: i64,
    pub content: String,
    pub context: Vec<String>,
    pub chunker_method: String,
}

impl From<ChunkRecord> for ChunkResponse {
    fn from(c: ChunkRecord) -> Self {
        ChunkResponse {
            chunk_index: c.chunk_index,
            content: c.content,
            context: c.context,
            chunker_method: c.chunker_method.as_str().to_string(),
        }
    }
}

pub async fn get_document(pool: &SqlitePool, document_id: &str) -> Result<DocumentResponse> {
    let doc = match store::get_document(pool, document_id).await? {
        Some(d) => d,
        None => bail!("document not found: {document_id}"),
    };

    let rows = sqlx::query_as::<_, ChunkRow>(
        "SELECT chunk_index, content, context, chunker_method FROM chunks \
         WHERE document_id = ? ORDER BY chunk_index ASC",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    let chunks = rows
        .into_iter()
        .map(|r| ChunkResponse {
            chunk_index: r.chunk_index,
            content: r.content,
            context: serde_json::from_str(&r.context).unwrap_or_default(),
            chunker_method: r
                .chunker_method
                .parse::<ChunkerMethod>()
                .map(|m| m.as_str().to_string())
                .unwrap_or(r.chunker_method),
        })
        .collect();

    Ok(DocumentResponse {
        document_id: doc.document_id,
        title: doc.title,
        source_locator: doc.source_locator,
        source_kind: doc.source_kind,
        content: doc.content,
        frontmatter: doc.frontmatter,
        ingested_at: doc.ingested_at.to_rfc3339(),
        tenant: doc.tenant,
        source_group: doc.source_group,
        chunks,
    })
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    chunk_index: i64,
    content: String,
    context: String,
    chunker_method: String,
}
