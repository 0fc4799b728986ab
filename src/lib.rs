//! # Context Harness RAG
//!
//! **The ingestion and hybrid-retrieval core of a Retrieval-Augmented
//! Generation knowledge base.**
//!
//! Given a heterogeneous corpus (PDF, Office documents, Markdown, HTML,
//! audio, web URLs, drive-hosted files), the system transforms inputs into
//! a searchable collection of embedded text fragments, and answers queries
//! by fusing semantic and lexical rankings with Reciprocal Rank Fusion.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌────────┐   ┌──────────┐
//! │  fetch   │──▶│  convert  │──▶│  chunk   │──▶│ embed  │──▶│  store   │
//! └──────────┘   └───────────┘   └──────────┘   └────────┘   └────┬─────┘
//!                                                                  │
//!                      ┌───────────────────────────────────────────┤
//!                      ▼                                           ▼
//!                 ┌──────────┐                                ┌──────────┐
//!                 │  queue   │                                │  search  │
//!                 │ (worker) │                                │  (RRF)   │
//!                 └──────────┘                                └────┬─────┘
//!                      ▲                                           │
//!                      │                                           ▼
//!                 ┌──────────┐                                ┌──────────┐
//!                 │  server  │                                │   tool   │
//!                 │  (HTTP)  │                                │ (agent)  │
//!                 └──────────┘                                └──────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. A [`models::SourceDescriptor`] enters via the wire surface ([`server`])
//!    or the CLI, and is validated ([`validate`]) before being enqueued
//!    ([`queue`]).
//! 2. A worker claims the job and drives [`ingest::ingest`]: fetch
//!    ([`fetch`]) → convert ([`convert`]) → fingerprint/short-circuit →
//!    chunk ([`chunk`]) → embed ([`embedding`]) → upsert ([`store`]).
//! 3. Queries enter through [`tool::search_knowledge_base`] or the HTTP
//!    `/query` route, fan out over [`search::search`]'s concurrent
//!    semantic/lexical branches, fuse by RRF, and hydrate with document
//!    metadata.
//! 4. User-saved URLs go through the specialised [`readings`] ingestion
//!    variant.
//!
//! ## Quick Start
//!
//! ```bash
//! ctx init                          # create the database schema
//! ctx validate                      # check configured dependencies
//! ctx ingest --local-file ./doc.md  # ingest one source synchronously
//! ctx search "deployment steps"     # hybrid search
//! ctx serve                         # start the HTTP wire surface
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: Source Descriptor, Document/Chunk/Job/Reading Records |
//! | [`error`] | Cross-component error taxonomy (`ErrorKind`, `AppError`) |
//! | [`fetch`] | Dispatches on Source Descriptor kind to produce raw bytes |
//! | [`extract`] | Binary-format (PDF/DOCX/PPTX/XLSX) text extraction |
//! | [`convert`] | Source bytes → canonical text + structural outline |
//! | [`chunk`] | Structure-aware chunker with paragraph/sentence fallback |
//! | [`embedding`] | Embedding provider trait, OpenAI/Ollama/local implementations |
//! | [`store`] | Storage adapter: upsert, text search, vector search, hydration |
//! | [`ingest`] | Ingestion pipeline: fetch → convert → chunk → embed → upsert |
//! | [`readings`] | Reading Record ingestion for user-saved URLs |
//! | [`queue`] | Durable job queue and worker pool |
//! | [`validate`] | Capability-based pre-flight dependency validation |
//! | [`search`] | Hybrid retrieval engine (concurrent RRF fusion) |
//! | [`get`] | Document retrieval by id, with its chunks |
//! | [`tool`] | Agent-facing `search_knowledge_base` tool contract |
//! | [`server`] | HTTP wire surface (Axum) with CORS |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//!
//! ## Configuration
//!
//! Configured via a TOML file (default: `config/ctx.toml`). See [`config`]
//! for all available options and [`config::load_config`] for validation
//! rules.

pub mod chunk;
pub mod config;
pub mod convert;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod queue;
pub mod readings;
pub mod search;
pub mod server;
pub mod store;
pub mod tool;
pub mod validate;
