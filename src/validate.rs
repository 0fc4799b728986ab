//! Validator: checks connectivity and capability of external dependencies
//! before a workflow accepts input.
//!
//! A capability-based contract: every entry point declares which named
//! capabilities it needs, the Validator runs all of them — concurrently,
//! at most one round-trip each — and returns a single aggregated error with
//! a per-capability diagnosis and remediation hint.

use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;

use crate::config::Config;
use crate::error::{AppError, ErrorKind};

/// A named external precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    DocumentStoreConnect,
    DocumentStoreSchema,
    EmbedderReachable,
    QueueReachable,
    QueueWorkersPresent,
    BrowserRuntime,
    DriveCredentials,
    AudioToolchain,
    WebMetasearch,
    ReasoningLlmReachable,
}

impl Capability {
    fn label(self) -> &'static str {
        match self {
            Capability::DocumentStoreConnect => "document_store_connect",
            Capability::DocumentStoreSchema => "document_store_schema",
            Capability::EmbedderReachable => "embedder_reachable",
            Capability::QueueReachable => "queue_reachable",
            Capability::QueueWorkersPresent => "queue_workers_present",
            Capability::BrowserRuntime => "browser_runtime",
            Capability::DriveCredentials => "drive_credentials",
            Capability::AudioToolchain => "audio_toolchain",
            Capability::WebMetasearch => "web_metasearch",
            Capability::ReasoningLlmReachable => "reasoning_llm_reachable",
        }
    }
}

/// Strict mode adds schema-level checks and treats failure as fatal;
/// lenient mode checks connectivity only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Strict,
    Lenient,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityDiagnosis {
    pub capability: String,
    pub ok: bool,
    pub detail: String,
    pub remediation: Option<String>,
    /// The `ErrorKind` this diagnosis would escalate to on failure. Most
    /// capabilities are hard requirements (`DependencyUnavailable`); a few,
    /// like `browser_runtime`, are optional features a deployment can run
    /// without, so their absence only degrades functionality.
    #[serde(skip)]
    pub kind: ErrorKind,
}

/// Runs every requested capability check and returns `Ok(())` when all
/// pass, or an aggregated `AppError` with a per-capability diagnosis
/// otherwise. At most one round trip per capability; checks run
/// concurrently via `futures::future::join_all`.
pub async fn validate(
    config: &Config,
    required: &[Capability],
    strictness: Strictness,
) -> Result<Vec<CapabilityDiagnosis>, AppError> {
    let checks = required
        .iter()
        .map(|cap| check_one(config, *cap, strictness));
    let diagnoses: Vec<CapabilityDiagnosis> = futures::future::join_all(checks).await;

    let failures: Vec<&CapabilityDiagnosis> = diagnoses.iter().filter(|d| !d.ok).collect();
    if failures.is_empty() {
        return Ok(diagnoses);
    }

    let message = failures
        .iter()
        .map(|d| {
            format!(
                "{}: {}{}",
                d.capability,
                d.detail,
                d.remediation
                    .as_ref()
                    .map(|r| format!(" ({r})"))
                    .unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("; ");

    // A run is only "degraded" overall when every failing capability is
    // individually degradable; one hard dependency missing still escalates
    // the whole validation to unavailable.
    let overall_kind = if failures.iter().all(|d| d.kind == ErrorKind::DependencyDegraded) {
        ErrorKind::DependencyDegraded
    } else {
        ErrorKind::DependencyUnavailable
    };

    Err(AppError::new(overall_kind, message))
}

async fn check_one(config: &Config, cap: Capability, strictness: Strictness) -> CapabilityDiagnosis {
    let (ok, detail, remediation) = match cap {
        Capability::DocumentStoreConnect => check_store_connect(config).await,
        Capability::DocumentStoreSchema => {
            if strictness == Strictness::Lenient {
                (true, "schema check skipped in lenient mode".to_string(), None)
            } else {
                check_store_schema(config).await
            }
        }
        Capability::EmbedderReachable => check_embedder(config).await,
        Capability::QueueReachable => check_store_connect(config).await,
        Capability::QueueWorkersPresent => (
            config.queue.worker_count > 0,
            format!("configured worker_count = {}", config.queue.worker_count),
            Some("set queue.worker_count >= 1".to_string()),
        ),
        Capability::BrowserRuntime => {
            if config.server.browser_enabled {
                (true, "browser_enabled = true".to_string(), None)
            } else {
                (
                    false,
                    "browser_enabled = false".to_string(),
                    Some("set server.browser_enabled = true to enable deep web crawling".to_string()),
                )
            }
        }
        Capability::DriveCredentials => (
            config.validator.drive_credentials_env.is_some(),
            "validator.drive_credentials_env".to_string(),
            Some("set validator.drive_credentials_env to the env var holding a Drive bearer token".to_string()),
        ),
        Capability::AudioToolchain => (
            config.validator.audio_toolchain_configured,
            "validator.audio_toolchain_configured".to_string(),
            Some("configure an AudioTranscriber and set validator.audio_toolchain_configured = true".to_string()),
        ),
        Capability::WebMetasearch => (
            config.server.metasearch_url.is_some(),
            "server.metasearch_url".to_string(),
            Some("set server.metasearch_url to enable metasearch-backed web discovery".to_string()),
        ),
        Capability::ReasoningLlmReachable => (
            config.validator.reasoning_llm_url.is_some(),
            "validator.reasoning_llm_url".to_string(),
            Some("set validator.reasoning_llm_url".to_string()),
        ),
    };

    // browser_runtime is the one capability a deployment can simply run
    // without (deep web crawling stays unavailable, nothing else breaks);
    // everything else is a hard dependency the rest of the pipeline needs.
    let kind = if !ok && cap == Capability::BrowserRuntime {
        ErrorKind::DependencyDegraded
    } else {
        ErrorKind::DependencyUnavailable
    };

    CapabilityDiagnosis {
        capability: cap.label().to_string(),
        ok,
        detail,
        remediation,
        kind,
    }
}

async fn check_store_connect(config: &Config) -> (bool, String, Option<String>) {
    match timeout(Duration::from_secs(5), crate::db::connect(config)).await {
        Ok(Ok(pool)) => {
            pool.close().await;
            (true, "connected".to_string(), None)
        }
        Ok(Err(e)) => (
            false,
            e.to_string(),
            Some("check store.path is writable and its parent directory exists".to_string()),
        ),
        Err(_) => (
            false,
            "connection timed out".to_string(),
            Some("check the database file isn't locked by another process".to_string()),
        ),
    }
}

async fn check_store_schema(config: &Config) -> (bool, String, Option<String>) {
    let pool = match crate::db::connect(config).await {
        Ok(p) => p,
        Err(e) => return (false, e.to_string(), Some("run `ctx init` first".to_string())),
    };

    let has_documents: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents'",
    )
    .fetch_one(&pool)
    .await
    .unwrap_or(false);

    pool.close().await;

    if has_documents {
        (true, "schema present".to_string(), None)
    } else {
        (
            false,
            "documents table missing".to_string(),
            Some("run `ctx init` to create the schema".to_string()),
        )
    }
}

async fn check_embedder(config: &Config) -> (bool, String, Option<String>) {
    if !config.embedding.is_enabled() {
        return (
            false,
            "embedding.provider = disabled".to_string(),
            Some("set embedding.provider to openai, ollama, or local".to_string()),
        );
    }

    match crate::embedding::create_provider(&config.embedding) {
        Ok(_) => (true, format!("provider '{}' configured", config.embedding.provider), None),
        Err(e) => (
            false,
            e.to_string(),
            Some("check embedder credentials and model/dims settings".to_string()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn strict_validation_fails_closed_on_missing_schema() {
        let config = crate::config::tests_support::minimal_config();
        let err = validate(&config, &[Capability::DocumentStoreSchema], Strictness::Strict)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DependencyUnavailable);
    }

    #[tokio::test]
    async fn lenient_validation_skips_schema_check() {
        let config = crate::config::tests_support::minimal_config();
        let diagnoses = validate(&config, &[Capability::DocumentStoreSchema], Strictness::Lenient)
            .await
            .unwrap();
        assert!(diagnoses[0].ok);
    }

    #[tokio::test]
    async fn disabled_embedder_fails_with_remediation() {
        let config = crate::config::tests_support::minimal_config();
        let err = validate(&config, &[Capability::EmbedderReachable], Strictness::Lenient)
            .await
            .unwrap_err();
        assert!(err.message.contains("embedder_reachable"));
    }

    #[tokio::test]
    async fn browser_runtime_failure_is_degraded_not_unavailable() {
        let config = crate::config::tests_support::minimal_config();
        let err = validate(&config, &[Capability::BrowserRuntime], Strictness::Lenient)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DependencyDegraded);
    }

    #[tokio::test]
    async fn zero_workers_fails_queue_workers_present() {
        let mut config = crate::config::tests_support::minimal_config();
        config.queue.worker_count = 0;
        let err = validate(&config, &[Capability::QueueWorkersPresent], Strictness::Lenient)
            .await
            .unwrap_err();
        assert!(err.message.contains("queue_workers_present"));
    }
}
