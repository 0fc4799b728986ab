//! Core data model: Source Descriptor, Document/Chunk/Job/Reading Records.
//!
//! These types flow through ingestion (`ingest.rs`), the job queue
//! (`queue.rs`), and retrieval (`search.rs`, `store.rs`). Open maps
//! (`frontmatter`, `metadata`, `kind_specific`, `options`) are plain
//! `serde_json::Value`s serialized into `TEXT` columns rather than given
//! their own tables, since their shape varies per source kind and isn't
//! queried on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// What kind of thing a Source Descriptor points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LocalFile,
    WebUrl,
    DriveFile,
    UploadedBlob,
    AudioTranscript,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::LocalFile => "local_file",
            SourceKind::WebUrl => "web_url",
            SourceKind::DriveFile => "drive_file",
            SourceKind::UploadedBlob => "uploaded_blob",
            SourceKind::AudioTranscript => "audio_transcript",
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_file" => Ok(SourceKind::LocalFile),
            "web_url" => Ok(SourceKind::WebUrl),
            "drive_file" => Ok(SourceKind::DriveFile),
            "uploaded_blob" => Ok(SourceKind::UploadedBlob),
            "audio_transcript" => Ok(SourceKind::AudioTranscript),
            other => anyhow::bail!("unknown source kind: {other}"),
        }
    }
}

/// A request to ingest. Owned by the caller until enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    /// Path, URL, drive file id, or upload handle, depending on `kind`.
    pub locator: String,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub source_group: Option<String>,
    /// Kind-specific options: crawl depth, credentials reference, chunker profile.
    #[serde(default = "default_options")]
    pub options: Json,
    /// Raw bytes, present only for `uploaded_blob` (and populated in-memory
    /// for `local_file`/`drive_file` once fetched; never persisted).
    #[serde(skip)]
    pub inline_bytes: Option<Vec<u8>>,
}

fn default_options() -> Json {
    serde_json::json!({})
}

impl SourceDescriptor {
    /// The corpus partition key with empty-string defaults (DESIGN.md decision).
    pub fn partition(&self) -> (String, String) {
        (
            self.tenant.clone().unwrap_or_default(),
            self.source_group.clone().unwrap_or_default(),
        )
    }

    pub fn crawl_depth(&self) -> u32 {
        self.options
            .get("max_depth")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    }

    pub fn deep_crawl(&self) -> bool {
        self.options
            .get("deep")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn credentials_ref(&self) -> Option<String> {
        self.options
            .get("credentials_ref")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// One ingested source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub title: Option<String>,
    pub source_locator: String,
    pub source_kind: String,
    pub content: String,
    pub frontmatter: Json,
    pub ingested_at: DateTime<Utc>,
    pub content_hash: String,
    pub tenant: String,
    pub source_group: String,
}

/// How a chunk's boundaries were decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkerMethod {
    StructureAware,
    Fallback,
}

impl ChunkerMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkerMethod::StructureAware => "structure_aware",
            ChunkerMethod::Fallback => "fallback",
        }
    }
}

impl std::str::FromStr for ChunkerMethod {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structure_aware" => Ok(ChunkerMethod::StructureAware),
            "fallback" => Ok(ChunkerMethod::Fallback),
            other => anyhow::bail!("unknown chunker_method: {other}"),
        }
    }
}

/// One fragment of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub token_count: i64,
    /// `None` before embedding; `Some` with length == configured embedder dimension after.
    pub embedding: Option<Vec<f32>>,
    pub content_hash: String,
    /// Heading path establishing this chunk's position in the outline.
    pub context: Vec<String>,
    pub chunker_method: ChunkerMethod,
    pub metadata: Json,
    pub tenant: String,
    pub source_group: String,
}

/// Job lifecycle state. Transitions only forward; terminal
/// states are immutable (enforced in `queue.rs`, not here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "finished" => Ok(JobStatus::Finished),
            "failed" => Ok(JobStatus::Failed),
            other => anyhow::bail!("unknown job status: {other}"),
        }
    }
}

/// Summary written to a finished job's `result` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub documents_ingested: u64,
    pub chunks_ingested: u64,
    pub warnings: Vec<String>,
}

/// One durable ingestion submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub source_type: String,
    pub payload: SourceDescriptor,
    pub status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<IngestReport>,
}

/// What kind of URL a saved Reading points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlKind {
    Web,
    Youtube,
}

impl UrlKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UrlKind::Web => "web",
            UrlKind::Youtube => "youtube",
        }
    }
}

/// A link surfaced in a Reading's `related_links`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedLink {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// One user-saved URL — a specialised ingestion variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub reading_id: String,
    pub url: String,
    pub url_kind: UrlKind,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub related_links: Vec<RelatedLink>,
    pub kind_specific: Json,
    /// Set when the URL's content was successfully ingested into the store.
    pub document_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Which search mode a query should execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Semantic,
    Lexical,
    Hybrid,
}

impl std::str::FromStr for SearchMode {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "semantic" => Ok(SearchMode::Semantic),
            "lexical" => Ok(SearchMode::Lexical),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => anyhow::bail!("unknown search mode: {other}"),
        }
    }
}

/// A scoped filter on a search or listing call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusFilter {
    pub tenant: Option<String>,
    pub source_group: Option<String>,
}

/// A chunk joined with its document's title and locator.
#[derive(Debug, Clone, Serialize)]
pub struct HydratedChunk {
    pub chunk: ChunkRecord,
    pub document_title: Option<String>,
    pub source_locator: String,
    pub score: f64,
    /// Set when a hybrid search produced this result with one of its two
    /// branches (lexical or vector) having failed rather than legitimately
    /// come back empty. `None` means both branches that ran succeeded.
    pub warning: Option<String>,
}

/// Raw bytes plus discovered content-type, the output of a fetch step
/// before conversion.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub locator: String,
    pub title: Option<String>,
}
