//! Wire Surface: HTTP endpoints for ingest submission, job inspection,
//! readings, and the query surface. Every handler returns `Result<_,
//! AppError>` so its status code is driven by `ErrorKind::status_code`
//! instead of being picked ad hoc per endpoint.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::Multipart;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::AppError;
use crate::models::{CorpusFilter, HydratedChunk, JobRecord, SearchMode, SourceDescriptor, SourceKind};
use crate::readings::{ReadingSummary, UnimplementedSummarizer};
use crate::validate::{Capability, Strictness};

#[derive(Clone)]
struct AppState {
    pool: SqlitePool,
    config: Arc<Config>,
}

/// Starts the HTTP wire surface and the worker pool side by side, since a
/// single process is the common deployment shape for this crate. Each
/// worker gets its own pool connection and runs inside the same
/// `JoinSet` as the HTTP server; when the server exits, every worker task
/// is aborted and the join set is drained before returning.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;

    if let Err(e) = crate::validate::validate(
        config,
        &[Capability::DocumentStoreConnect, Capability::DocumentStoreSchema],
        Strictness::Strict,
    )
    .await
    {
        anyhow::bail!("server failed startup validation: {}", e.message);
    }

    let mut workers = tokio::task::JoinSet::new();
    for _ in 0..config.queue.worker_count {
        let worker_pool = crate::db::connect(config).await?;
        let worker_config = config.clone();
        workers.spawn(async move {
            crate::queue::run_worker(worker_pool, worker_config).await;
        });
    }

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ingest/web", post(handle_ingest_web))
        .route("/ingest/drive", post(handle_ingest_drive))
        .route("/ingest/upload", post(handle_ingest_upload))
        .route("/ingest/jobs/{job_id}", get(handle_get_job))
        .route("/readings/save", post(handle_save_reading))
        .route("/readings", get(handle_list_readings))
        .route("/readings/{reading_id}", get(handle_get_reading))
        .route("/query", post(handle_query))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind = %config.server.bind, workers = config.queue.worker_count, "wire surface listening");

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    let result = axum::serve(listener, app).await;

    workers.abort_all();
    while workers.join_next().await.is_some() {}

    result.map_err(anyhow::Error::from)
}

#[derive(Serialize)]
struct JobAccepted {
    job_id: String,
    status: &'static str,
    status_url: String,
}

fn accepted(job_id: String) -> JobAccepted {
    JobAccepted {
        status_url: format!("/ingest/jobs/{job_id}"),
        job_id,
        status: "queued",
    }
}

#[derive(Deserialize)]
struct IngestWebRequest {
    url: String,
    #[serde(default)]
    deep: bool,
    #[serde(default)]
    max_depth: Option<u32>,
    #[serde(default)]
    source_group: Option<String>,
    #[serde(default)]
    tenant: Option<String>,
}

async fn handle_ingest_web(
    State(state): State<AppState>,
    Json(req): Json<IngestWebRequest>,
) -> Result<(axum::http::StatusCode, Json<JobAccepted>), AppError> {
    if req.url.trim().is_empty() {
        return Err(AppError::new(crate::error::ErrorKind::SourceUnreadable, "url must not be empty"));
    }

    let options = serde_json::json!({
        "deep": req.deep,
        "max_depth": req.max_depth.unwrap_or(0),
    });

    let source = SourceDescriptor {
        kind: SourceKind::WebUrl,
        locator: req.url,
        tenant: req.tenant,
        source_group: req.source_group,
        options,
        inline_bytes: None,
    };

    let job_id = crate::queue::enqueue(&state.pool, &state.config, &source).await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(accepted(job_id))))
}

#[derive(Deserialize)]
struct IngestDriveRequest {
    drive_file_id: String,
    #[serde(default)]
    source_group: Option<String>,
    #[serde(default)]
    tenant: Option<String>,
    #[serde(default)]
    credentials_ref: Option<String>,
}

async fn handle_ingest_drive(
    State(state): State<AppState>,
    Json(req): Json<IngestDriveRequest>,
) -> Result<(axum::http::StatusCode, Json<JobAccepted>), AppError> {
    if req.drive_file_id.trim().is_empty() {
        return Err(AppError::new(crate::error::ErrorKind::SourceUnreadable, "drive_file_id must not be empty"));
    }

    let options = serde_json::json!({
        "credentials_ref": req.credentials_ref.unwrap_or_else(|| "DRIVE_ACCESS_TOKEN".to_string()),
    });

    let source = SourceDescriptor {
        kind: SourceKind::DriveFile,
        locator: req.drive_file_id,
        tenant: req.tenant,
        source_group: req.source_group,
        options,
        inline_bytes: None,
    };

    let job_id = crate::queue::enqueue(&state.pool, &state.config, &source).await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(accepted(job_id))))
}

async fn handle_ingest_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(axum::http::StatusCode, Json<JobAccepted>), AppError> {
    let mut bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut tenant: Option<String> = None;
    let mut source_group: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::new(crate::error::ErrorKind::SourceUnreadable, e.to_string()))? {
        match field.name().map(str::to_string).as_deref() {
            Some("file") => {
                filename = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                bytes = Some(field.bytes().await.map_err(|e| AppError::new(crate::error::ErrorKind::SourceUnreadable, e.to_string()))?.to_vec());
            }
            Some("tenant") => {
                tenant = Some(field.text().await.unwrap_or_default());
            }
            Some("source_group") => {
                source_group = Some(field.text().await.unwrap_or_default());
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| AppError::new(crate::error::ErrorKind::SourceUnreadable, "multipart upload missing 'file' part"))?;
    let filename = filename.unwrap_or_else(|| "upload".to_string());

    let source = SourceDescriptor {
        kind: SourceKind::UploadedBlob,
        locator: filename.clone(),
        tenant,
        source_group,
        options: serde_json::json!({
            "content_type": content_type.unwrap_or_else(|| "text/plain".to_string()),
            "filename": filename,
        }),
        inline_bytes: Some(bytes),
    };

    let job_id = crate::queue::enqueue(&state.pool, &state.config, &source).await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(accepted(job_id))))
}

async fn handle_get_job(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<String>,
) -> Result<Json<JobRecord>, AppError> {
    let job = crate::queue::inspect(&state.pool, &job_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no job with id {job_id}")))?;
    Ok(Json(job))
}

#[derive(Deserialize)]
struct SaveReadingRequest {
    url: String,
    #[serde(default)]
    tenant: Option<String>,
}

async fn handle_save_reading(
    State(state): State<AppState>,
    Json(req): Json<SaveReadingRequest>,
) -> Result<Json<crate::models::ReadingRecord>, AppError> {
    if req.url.trim().is_empty() {
        return Err(AppError::new(crate::error::ErrorKind::SourceUnreadable, "url must not be empty"));
    }
    let record = crate::readings::save_reading(&state.pool, &state.config, &req.url, req.tenant, &UnimplementedSummarizer).await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct ListReadingsQuery {
    tenant: Option<String>,
    limit: Option<i64>,
}

async fn handle_list_readings(
    State(state): State<AppState>,
    Query(q): Query<ListReadingsQuery>,
) -> Result<Json<Vec<ReadingSummary>>, AppError> {
    let readings = crate::readings::list_readings(&state.pool, q.tenant.as_deref(), q.limit.unwrap_or(50)).await?;
    Ok(Json(readings))
}

async fn handle_get_reading(
    State(state): State<AppState>,
    AxumPath(reading_id): AxumPath<String>,
) -> Result<Json<crate::models::ReadingRecord>, AppError> {
    let reading = crate::readings::get_reading(&state.pool, &reading_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no reading with id {reading_id}")))?;
    Ok(Json(reading))
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    k: Option<i64>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    filter: Option<CorpusFilter>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Vec<HydratedChunk>>, AppError> {
    let mode = match req.mode.as_deref().unwrap_or("hybrid") {
        "semantic" => SearchMode::Semantic,
        "lexical" => SearchMode::Lexical,
        "hybrid" => SearchMode::Hybrid,
        other => {
            return Err(AppError::new(
                crate::error::ErrorKind::ConfigInvalid,
                format!("unknown search mode: {other}"),
            ))
        }
    };

    let filter = req.filter.unwrap_or_default();
    let results = crate::search::search(&state.pool, &state.config, &req.query, mode, &filter, req.k).await?;
    Ok(Json(results))
}
