//! # Context Harness RAG — CLI front door
//!
//! The operator-facing entry point for the same components the HTTP wire
//! surface uses: `ctx init` runs migrations, `ctx serve` starts the HTTP
//! server (which itself spins up the worker pool), `ctx validate` runs the
//! Validator standalone, `ctx ingest` enqueues (or runs inline with
//! `--now`), and `ctx search` prints the same rendering the retrieval tool
//! contract returns.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use context_harness::config;
use context_harness::models::{CorpusFilter, SearchMode, SourceDescriptor, SourceKind};
use context_harness::queue;
use context_harness::search;
use context_harness::validate::{validate, Capability, Strictness};

#[derive(Parser)]
#[command(
    name = "ctx",
    about = "Context Harness — ingestion and hybrid-retrieval core of a RAG knowledge base",
    version
)]
struct Cli {
    #[arg(long, global = true, default_value = "./config/ctx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Run the pre-flight Validator against the configured dependencies
    Validate {
        /// Only check connectivity, skip schema-level checks
        #[arg(long)]
        lenient: bool,
    },

    /// Submit a source for ingestion
    Ingest {
        /// local_file | web_url | drive_file | uploaded_blob
        kind: String,

        /// Path, URL, or drive file id
        locator: String,

        #[arg(long)]
        tenant: Option<String>,

        #[arg(long)]
        source_group: Option<String>,

        /// Run the pipeline inline instead of enqueuing a job
        #[arg(long)]
        now: bool,

        /// For web_url: crawl linked pages of the same origin
        #[arg(long)]
        deep: bool,

        #[arg(long)]
        max_depth: Option<u32>,
    },

    /// Run a hybrid/semantic/lexical search and print results
    Search {
        query: String,

        #[arg(long, default_value = "hybrid")]
        mode: String,

        #[arg(long)]
        match_count: Option<i64>,

        #[arg(long)]
        tenant: Option<String>,

        #[arg(long)]
        source_group: Option<String>,
    },

    /// Retrieve a document and its chunks by id
    Get { document_id: String },

    /// Start the HTTP wire surface and worker pool
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            context_harness::migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Validate { lenient } => {
            let strictness = if lenient { Strictness::Lenient } else { Strictness::Strict };
            let required = [
                Capability::DocumentStoreConnect,
                Capability::DocumentStoreSchema,
                Capability::EmbedderReachable,
                Capability::QueueWorkersPresent,
            ];
            match validate(&cfg, &required, strictness).await {
                Ok(diagnoses) => {
                    for d in diagnoses {
                        println!("[ok] {}: {}", d.capability, d.detail);
                    }
                }
                Err(e) => {
                    eprintln!("validation failed: {}", e.message);
                    std::process::exit(1);
                }
            }
        }
        Commands::Ingest {
            kind,
            locator,
            tenant,
            source_group,
            now,
            deep,
            max_depth,
        } => {
            let kind: SourceKind = kind.parse()?;
            let source = SourceDescriptor {
                kind,
                locator,
                tenant,
                source_group,
                options: serde_json::json!({
                    "deep": deep,
                    "max_depth": max_depth.unwrap_or(0),
                }),
                inline_bytes: None,
            };

            if now {
                context_harness::ingest::run_ingest_cli(&cfg, &source).await?;
            } else {
                let pool = context_harness::db::connect(&cfg).await?;
                let job_id = queue::enqueue(&pool, &cfg, &source).await?;
                pool.close().await;
                println!("enqueued job {job_id}");
            }
        }
        Commands::Search {
            query,
            mode,
            match_count,
            tenant,
            source_group,
        } => {
            let mode: SearchMode = mode.parse()?;
            let filter = CorpusFilter { tenant, source_group };
            let pool = context_harness::db::connect(&cfg).await?;
            let results = search::search(&pool, &cfg, &query, mode, &filter, match_count).await?;
            pool.close().await;

            if results.is_empty() {
                println!("No relevant information found in the knowledge base.");
            } else {
                for (i, r) in results.iter().enumerate() {
                    let title = r.document_title.as_deref().unwrap_or("(untitled)");
                    println!("--- Document {}: {} (relevance: {:.4}) ---", i + 1, title, r.score);
                    println!("{}\n", r.chunk.content);
                }
            }
        }
        Commands::Get { document_id } => {
            let pool = context_harness::db::connect(&cfg).await?;
            let doc = context_harness::get::get_document(&pool, &document_id).await?;
            pool.close().await;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::Serve => {
            context_harness::server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
