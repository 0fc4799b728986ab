//! CLI-level integration tests against the `ctx` binary: init, ingest,
//! search, get. Covers the full lifecycle a source goes through: it
//! enters, gets fingerprinted and chunked, and becomes retrievable.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ctx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ctx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.\n\nDeep learning frameworks like PyTorch are covered.",
    )
    .unwrap();

    let config_content = format!(
        r#"[store]
path = "{}/data/ctx.sqlite"

[chunking]
max_tokens_per_chunk = 700

[retrieval]
default_match_count = 5

[server]
bind = "127.0.0.1:7331"
"#,
        root.display()
    );

    let config_path = config_dir.join("ctx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, files_dir)
}

fn run_ctx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ctx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run ctx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn init_creates_database() {
    let (_tmp, config_path, _files) = setup_test_env();

    let (stdout, stderr, success) = run_ctx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn init_is_idempotent() {
    let (_tmp, config_path, _files) = setup_test_env();

    let (_, _, success1) = run_ctx(&config_path, &["init"]);
    assert!(success1, "first init failed");

    let (_, _, success2) = run_ctx(&config_path, &["init"]);
    assert!(success2, "second init failed (not idempotent)");
}

#[test]
fn ingest_now_then_search_finds_the_document() {
    let (_tmp, config_path, files_dir) = setup_test_env();
    let alpha_path = files_dir.join("alpha.md");

    run_ctx(&config_path, &["init"]);
    let (stdout, stderr, success) = run_ctx(
        &config_path,
        &["ingest", "local_file", alpha_path.to_str().unwrap(), "--now"],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);

    let (stdout, _, success) = run_ctx(&config_path, &["search", "Rust programming", "--mode", "lexical"]);
    assert!(success, "search failed");
    assert!(
        stdout.contains("Alpha") || stdout.contains("alpha"),
        "expected alpha document in results, got: {}",
        stdout
    );
}

#[test]
fn ingesting_the_same_file_twice_does_not_duplicate_results() {
    let (_tmp, config_path, files_dir) = setup_test_env();
    let beta_path = files_dir.join("beta.md");

    run_ctx(&config_path, &["init"]);
    run_ctx(&config_path, &["ingest", "local_file", beta_path.to_str().unwrap(), "--now"]);
    run_ctx(&config_path, &["ingest", "local_file", beta_path.to_str().unwrap(), "--now"]);

    let (stdout, _, success) = run_ctx(&config_path, &["search", "Python machine learning", "--mode", "lexical"]);
    assert!(success);
    let occurrences = stdout.matches("Beta").count();
    assert!(
        occurrences <= 1,
        "re-ingesting the same source should not duplicate search hits, got: {}",
        stdout
    );
}

#[test]
fn search_on_empty_corpus_reports_no_results() {
    let (_tmp, config_path, _files) = setup_test_env();

    run_ctx(&config_path, &["init"]);
    let (stdout, _, success) = run_ctx(&config_path, &["search", "nonexistent topic entirely", "--mode", "lexical"]);
    assert!(success, "search on an empty corpus should not error");
    assert!(stdout.contains("No relevant information"));
}

#[test]
fn ingesting_a_missing_file_does_not_crash_the_cli() {
    let (_tmp, config_path, _files) = setup_test_env();

    run_ctx(&config_path, &["init"]);
    let (_, _, success) = run_ctx(
        &config_path,
        &["ingest", "local_file", "/nonexistent/path/for/real.md", "--now"],
    );
    assert!(!success, "ingesting a missing file should report failure, not crash");
}

#[test]
fn get_on_unknown_document_id_fails_with_not_found() {
    let (_tmp, config_path, _files) = setup_test_env();

    run_ctx(&config_path, &["init"]);
    let (_, stderr, success) = run_ctx(&config_path, &["get", "nonexistent-id"]);
    assert!(!success, "get with an unknown id should fail");
    assert!(
        stderr.contains("not found"),
        "expected a not-found message, got: {}",
        stderr
    );
}

#[test]
fn unknown_search_mode_is_rejected() {
    let (_tmp, config_path, _files) = setup_test_env();

    run_ctx(&config_path, &["init"]);
    let (_, _, success) = run_ctx(&config_path, &["search", "test", "--mode", "invalid"]);
    assert!(!success, "an unknown search mode should fail, not fall through silently");
}

#[test]
fn validate_reports_the_disabled_embedder_as_a_failing_capability() {
    let (_tmp, config_path, _files) = setup_test_env();

    run_ctx(&config_path, &["init"]);
    let (_, stderr, success) = run_ctx(&config_path, &["validate", "--lenient"]);
    assert!(!success, "validate should fail while embedding.provider is disabled");
    assert!(
        stderr.contains("embedder"),
        "expected the embedder capability to be named in the failure, got: {}",
        stderr
    );
}
