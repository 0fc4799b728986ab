//! Job Queue & Worker Pool.
//!
//! Ingestion submissions are durable rows in a `jobs` table rather than an
//! in-memory queue, so a restart never loses a pending job. Atomic claim is
//! a single `UPDATE ... RETURNING` so two workers polling concurrently never
//! claim the same row; tracing spans wrap claim/run/finish for each one.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{IngestReport, JobRecord, JobStatus, SourceDescriptor};

/// Enqueues a job. Rejects when the queue is at `max_queue_depth`
/// (backpressure), returning a `queue_full` error distinguishable from a
/// transient failure.
pub async fn enqueue(
    pool: &SqlitePool,
    config: &Config,
    source: &SourceDescriptor,
) -> Result<String, AppError> {
    let depth: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status IN ('queued', 'running')")
        .fetch_one(pool)
        .await?;

    if depth >= config.queue.max_queue_depth {
        return Err(AppError::queue_full(format!(
            "queue depth {depth} at or above ceiling {}",
            config.queue.max_queue_depth
        )));
    }

    let job_id = Uuid::new_v4().to_string();
    let payload = serde_json::to_string(source).map_err(|e| AppError::internal(e.to_string()))?;

    sqlx::query(
        "INSERT INTO jobs (job_id, source_type, payload, status, enqueued_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&job_id)
    .bind(source.kind.as_str())
    .bind(payload)
    .bind(JobStatus::Queued.as_str())
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(job_id)
}

pub async fn inspect(pool: &SqlitePool, job_id: &str) -> Result<Option<JobRecord>, AppError> {
    let row = sqlx::query(
        "SELECT job_id, source_type, payload, status, enqueued_at, started_at, finished_at, error, result \
         FROM jobs WHERE job_id = ?",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(job_from_row(row)?))
}

fn job_from_row(row: sqlx::sqlite::SqliteRow) -> Result<JobRecord, AppError> {
    let payload_text: String = row.get("payload");
    let payload: SourceDescriptor =
        serde_json::from_str(&payload_text).map_err(|e| AppError::internal(e.to_string()))?;
    let status_text: String = row.get("status");
    let status = status_text.parse::<JobStatus>().map_err(AppError::from)?;
    let result_text: Option<String> = row.get("result");
    let result = result_text
        .map(|t| serde_json::from_str::<IngestReport>(&t))
        .transpose()
        .map_err(|e| AppError::internal(e.to_string()))?;

    Ok(JobRecord {
        job_id: row.get("job_id"),
        source_type: row.get("source_type"),
        payload,
        status,
        enqueued_at: chrono::DateTime::from_timestamp(row.get("enqueued_at"), 0).unwrap_or_default(),
        started_at: row
            .get::<Option<i64>, _>("started_at")
            .and_then(|t| chrono::DateTime::from_timestamp(t, 0)),
        finished_at: row
            .get::<Option<i64>, _>("finished_at")
            .and_then(|t| chrono::DateTime::from_timestamp(t, 0)),
        error: row.get("error"),
        result,
    })
}

/// Atomically claims the oldest queued job (or a job whose visibility
/// deadline has passed, giving at-least-once reclamation of stuck jobs),
/// marking it `running`. Returns `None` when nothing is claimable.
pub async fn claim_next(pool: &SqlitePool, config: &Config) -> Result<Option<JobRecord>> {
    let now = chrono::Utc::now().timestamp();
    let deadline = now + config.queue.visibility_timeout_seconds as i64;

    let row = sqlx::query(
        r#"
        UPDATE jobs SET status = 'running', started_at = ?, visibility_deadline = ?
        WHERE job_id = (
            SELECT job_id FROM jobs
            WHERE status = 'queued'
               OR (status = 'running' AND visibility_deadline IS NOT NULL AND visibility_deadline < ?)
            ORDER BY enqueued_at ASC
            LIMIT 1
        )
        RETURNING job_id, source_type, payload, status, enqueued_at, started_at, finished_at, error, result
        "#,
    )
    .bind(now)
    .bind(deadline)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(job_from_row(row)?)),
        None => Ok(None),
    }
}

/// Marks a job finished. Guarded by `status NOT IN ('finished', 'failed')` so
/// a stale worker that reclaims and re-runs a job (at-least-once semantics,
/// see `claim_next`) can never overwrite a terminal row another worker
/// already wrote.
pub async fn mark_finished(pool: &SqlitePool, job_id: &str, report: &IngestReport) -> Result<()> {
    let result = serde_json::to_string(report)?;
    sqlx::query(
        "UPDATE jobs SET status = 'finished', finished_at = ?, result = ? \
         WHERE job_id = ? AND status NOT IN ('finished', 'failed')",
    )
    .bind(chrono::Utc::now().timestamp())
    .bind(result)
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Marks a job failed, guarded the same way as [`mark_finished`].
pub async fn mark_failed(pool: &SqlitePool, job_id: &str, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = 'failed', finished_at = ?, error = ? \
         WHERE job_id = ? AND status NOT IN ('finished', 'failed')",
    )
    .bind(chrono::Utc::now().timestamp())
    .bind(error)
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Runs the worker loop: validate once at startup, then poll-claim-run
/// until cancelled. One claim is active at a time per worker; horizontal
/// scaling is by adding workers, not per-worker parallelism over jobs.
/// Runs until its owning `JoinSet` aborts it (on server shutdown in
/// `server.rs`) or the process exits. There is no internal shutdown signal:
/// the task is cancelled at its next `.await` point, which only ever
/// happens between a finished claim and the next poll.
pub async fn run_worker(pool: SqlitePool, config: Config) {
    use crate::validate::{validate, Capability, Strictness};

    if let Err(e) = validate(
        &config,
        &[Capability::DocumentStoreConnect, Capability::DocumentStoreSchema],
        Strictness::Strict,
    )
    .await
    {
        tracing::error!(error = %e.message, "worker failed startup validation, not starting");
        return;
    }

    loop {
        match claim_next(&pool, &config).await {
            Ok(Some(job)) => run_claimed_job(&pool, &config, job).await,
            Ok(None) => {
                tokio::time::sleep(std::time::Duration::from_millis(config.queue.poll_interval_ms)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to claim job");
                tokio::time::sleep(std::time::Duration::from_millis(config.queue.poll_interval_ms)).await;
            }
        }
    }
}

async fn run_claimed_job(pool: &SqlitePool, config: &Config, job: JobRecord) {
    let span = tracing::info_span!("job", job_id = %job.job_id, source_type = %job.source_type);
    let _enter = span.enter();
    tracing::info!("job claimed");

    let deadline = std::time::Duration::from_secs(config.queue.per_job_timeout_seconds);
    let outcome = tokio::time::timeout(deadline, crate::ingest::ingest(pool, config, &job.payload)).await;

    match outcome {
        Ok(Ok(report)) => {
            tracing::info!(documents = report.documents_ingested, chunks = report.chunks_ingested, "job finished");
            if let Err(e) = mark_finished(pool, &job.job_id, &report).await {
                tracing::error!(error = %e, "failed to persist finished job");
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "job failed");
            if let Err(e) = mark_failed(pool, &job.job_id, &e.to_string()).await {
                tracing::error!(error = %e, "failed to persist failed job");
            }
        }
        Err(_) => {
            tracing::warn!("job exceeded per_job_timeout_seconds");
            if let Err(e) = mark_failed(pool, &job.job_id, "deadline exceeded").await {
                tracing::error!(error = %e, "failed to persist timed-out job");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> SourceDescriptor {
        SourceDescriptor {
            kind: crate::models::SourceKind::UploadedBlob,
            locator: "blob-1".to_string(),
            tenant: None,
            source_group: None,
            options: json!({}),
            inline_bytes: Some(b"hello".to_vec()),
        }
    }

    #[tokio::test]
    async fn enqueue_then_claim_transitions_to_running() {
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let config = crate::config::tests_support::minimal_config();

        let job_id = enqueue(&pool, &config, &source()).await.unwrap();
        let claimed = claim_next(&pool, &config).await.unwrap().unwrap();
        assert_eq!(claimed.job_id, job_id);
        assert_eq!(claimed.status, JobStatus::Running);

        let again = claim_next(&pool, &config).await.unwrap();
        assert!(again.is_none(), "a running job with a live visibility deadline must not be reclaimed");
    }

    #[tokio::test]
    async fn enqueue_rejects_above_max_queue_depth() {
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let mut config = crate::config::tests_support::minimal_config();
        config.queue.max_queue_depth = 1;

        enqueue(&pool, &config, &source()).await.unwrap();
        let err = enqueue(&pool, &config, &source()).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::QueueFull);
    }

    #[tokio::test]
    async fn job_lifecycle_with_dedup_rerun() {
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let config = crate::config::tests_support::minimal_config();

        let job_id = enqueue(&pool, &config, &source()).await.unwrap();
        let job = claim_next(&pool, &config).await.unwrap().unwrap();
        let report = IngestReport {
            documents_ingested: 1,
            chunks_ingested: 1,
            warnings: Vec::new(),
        };
        mark_finished(&pool, &job.job_id, &report).await.unwrap();

        let inspected = inspect(&pool, &job_id).await.unwrap().unwrap();
        assert_eq!(inspected.status, JobStatus::Finished);
        assert_eq!(inspected.result.unwrap().documents_ingested, 1);
    }

    #[tokio::test]
    async fn terminal_job_state_cannot_be_overwritten() {
        let pool = crate::db::tests_support::memory_pool().await;
        crate::migrate::run_migrations_on_pool(&pool).await.unwrap();
        let config = crate::config::tests_support::minimal_config();

        let job_id = enqueue(&pool, &config, &source()).await.unwrap();
        claim_next(&pool, &config).await.unwrap().unwrap();
        let report = IngestReport {
            documents_ingested: 1,
            chunks_ingested: 1,
            warnings: Vec::new(),
        };
        mark_finished(&pool, &job_id, &report).await.unwrap();

        // A stale worker reclaiming the same job and finishing late must not
        // clobber the already-terminal row.
        mark_failed(&pool, &job_id, "stale worker thinks this failed").await.unwrap();

        let inspected = inspect(&pool, &job_id).await.unwrap().unwrap();
        assert_eq!(inspected.status, JobStatus::Finished);
        assert!(inspected.error.is_none());
    }
}
