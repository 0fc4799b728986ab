//! Configuration parsing and validation.
//!
//! The system is configured via a TOML file with `[store]`/`[chunking]`/
//! `[retrieval]`/`[embedding]`/`[server]`/`[queue]`/`[validator]` sections:
//! document store identifiers, queue tuning, validator-relevant flags, and
//! timeouts. Secrets (API keys, bearer tokens) are read from the
//! environment, never from this file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::AppError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
}

/// Document store identifiers.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// SQLite database path.
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub vector_index_configured: bool,
    #[serde(default = "default_true")]
    pub text_index_configured: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_chunk: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_rrf_constant")]
    pub rrf_constant: f64,
    #[serde(default = "default_match_count")]
    pub default_match_count: i64,
    #[serde(default = "default_max_match_count")]
    pub max_match_count: i64,
    #[serde(default = "default_query_timeout")]
    pub per_query_timeout_seconds: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_constant: default_rrf_constant(),
            default_match_count: default_match_count(),
            max_match_count: default_max_match_count(),
            per_query_timeout_seconds: default_query_timeout(),
        }
    }
}

fn default_rrf_constant() -> f64 {
    60.0
}
fn default_match_count() -> i64 {
    5
}
fn default_max_match_count() -> i64 {
    50
}
fn default_query_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_embedder_batch")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_batch_size: default_max_embedder_batch(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
/// Max embedder batch size.
fn default_max_embedder_batch() -> usize {
    100
}
/// Max retry attempts on transient embedder error.
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default)]
    pub browser_enabled: bool,
    #[serde(default)]
    pub metasearch_url: Option<String>,
}

/// Job queue & worker pool tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    #[serde(default = "default_queue_depth")]
    pub max_queue_depth: i64,
    #[serde(default = "default_job_timeout")]
    pub per_job_timeout_seconds: u64,
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_seconds: u64,
    #[serde(default = "default_chunk_concurrency")]
    pub max_concurrent_chunk_upserts: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
            max_queue_depth: default_queue_depth(),
            per_job_timeout_seconds: default_job_timeout(),
            visibility_timeout_seconds: default_visibility_timeout(),
            max_concurrent_chunk_upserts: default_chunk_concurrency(),
            worker_count: default_worker_count(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_queue_name() -> String {
    "ingest".to_string()
}
fn default_queue_depth() -> i64 {
    10_000
}
fn default_job_timeout() -> u64 {
    1800
}
fn default_visibility_timeout() -> u64 {
    900
}
fn default_chunk_concurrency() -> usize {
    4
}
fn default_worker_count() -> usize {
    1
}
fn default_poll_interval() -> u64 {
    500
}

/// Flags the Validator needs beyond what's implied by other sections.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub drive_credentials_env: Option<String>,
    #[serde(default)]
    pub audio_toolchain_configured: bool,
    #[serde(default)]
    pub reasoning_llm_url: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Parses and validates a TOML config file. Failures here are always
/// `ErrorKind::ConfigInvalid`: missing/unparseable settings at
/// startup are fatal everywhere this is called.
pub fn load_config(path: &Path) -> Result<Config, AppError> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))
        .map_err(|e| AppError::config_invalid(e.to_string()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| "failed to parse config file")
        .map_err(|e| AppError::config_invalid(e.to_string()))?;

    if config.chunking.max_tokens_per_chunk == 0 {
        return Err(AppError::config_invalid(
            "chunking.max_tokens_per_chunk must be > 0",
        ));
    }

    if config.retrieval.max_match_count < 1 {
        return Err(AppError::config_invalid(
            "retrieval.max_match_count must be >= 1",
        ));
    }

    if config.retrieval.rrf_constant <= 0.0 {
        return Err(AppError::config_invalid(
            "retrieval.rrf_constant must be > 0",
        ));
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            return Err(AppError::config_invalid(format!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            )));
        }
        if config.embedding.model.is_none() {
            return Err(AppError::config_invalid(format!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            )));
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => {
            return Err(AppError::config_invalid(format!(
                "unknown embedding provider: '{other}'. Must be disabled, openai, ollama, or local."
            )))
        }
    }

    if config.queue.max_queue_depth < 1 {
        return Err(AppError::config_invalid(
            "queue.max_queue_depth must be >= 1",
        ));
    }

    Ok(config)
}

#[cfg(test)]
pub mod tests_support {
    use super::*;

    /// A valid `Config` with embeddings disabled, for unit tests that only
    /// need a config to satisfy a function signature.
    pub fn minimal_config() -> Config {
        Config {
            store: StoreConfig {
                path: PathBuf::from(":memory:"),
                vector_index_configured: true,
                text_index_configured: true,
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                browser_enabled: false,
                metasearch_url: None,
            },
            queue: QueueConfig::default(),
            validator: ValidatorConfig::default(),
        }
    }
}
