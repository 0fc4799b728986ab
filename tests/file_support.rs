//! Integration tests for multi-format ingest (PDF, DOCX) end to end through
//! the `ctx` binary: fetch -> convert -> chunk -> store -> search.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn ctx_binary() -> std::path::PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("ctx");
    path
}

/// Minimal valid PDF containing the text "spec test phrase".
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 44 >> stream\nBT /F1 12 Tf 100 700 Td (spec test phrase) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o1).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o2).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o3).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o4).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o5).as_bytes());
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn minimal_docx_with_text(phrase: &str) -> Vec<u8> {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            phrase
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn setup(root: &Path) -> std::path::PathBuf {
    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let config_content = format!(
        r#"[store]
path = "{}/data/ctx.sqlite"

[chunking]
max_tokens_per_chunk = 700

[retrieval]
default_match_count = 5

[server]
bind = "127.0.0.1:7332"
"#,
        root.display()
    );
    let config_path = root.join("config").join("ctx.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn run_ctx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ctx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run ctx: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn docx_ingest_and_search_finds_the_phrase() {
    let tmp = TempDir::new().unwrap();
    let config_path = setup(tmp.path());
    let docx_path = tmp.path().join("spec.docx");
    fs::write(&docx_path, minimal_docx_with_text("spec test phrase")).unwrap();

    run_ctx(&config_path, &["init"]);
    let (stdout, stderr, success) = run_ctx(
        &config_path,
        &["ingest", "local_file", docx_path.to_str().unwrap(), "--now"],
    );
    assert!(success, "docx ingest failed: stdout={}, stderr={}", stdout, stderr);

    let (search_out, _, success) = run_ctx(&config_path, &["search", "spec test phrase", "--mode", "lexical"]);
    assert!(success, "search failed");
    assert!(
        search_out.contains("spec test phrase") || search_out.contains("spec.docx"),
        "search should surface the phrase or the source filename, got: {}",
        search_out
    );
}

#[test]
fn ingesting_a_corrupt_pdf_is_reported_as_a_failure_not_a_panic() {
    let tmp = TempDir::new().unwrap();
    let config_path = setup(tmp.path());
    let bad_pdf = tmp.path().join("bad.pdf");
    fs::write(&bad_pdf, b"not a valid pdf").unwrap();

    run_ctx(&config_path, &["init"]);
    let (stdout, stderr, success) = run_ctx(
        &config_path,
        &["ingest", "local_file", bad_pdf.to_str().unwrap(), "--now"],
    );
    assert!(
        !success,
        "a corrupt pdf should be reported as a failed ingest, not silently accepted: stdout={} stderr={}",
        stdout, stderr
    );
}

#[test]
fn well_formed_pdf_ingests_and_is_retrievable_by_get() {
    let tmp = TempDir::new().unwrap();
    let config_path = setup(tmp.path());
    let pdf_path = tmp.path().join("spec.pdf");
    fs::write(&pdf_path, minimal_pdf_with_phrase()).unwrap();

    run_ctx(&config_path, &["init"]);
    let (_, stderr, success) = run_ctx(
        &config_path,
        &["ingest", "local_file", pdf_path.to_str().unwrap(), "--now"],
    );
    assert!(success, "well-formed pdf ingest should succeed: stderr={}", stderr);

    let (search_out, _, _) = run_ctx(&config_path, &["search", "spec test phrase", "--mode", "lexical"]);
    let id = search_out
        .lines()
        .find(|l| l.contains("Document 1:"))
        .map(|_| ());
    assert!(id.is_some(), "expected at least one result, got: {}", search_out);
}

#[test]
fn docx_resync_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config_path = setup(tmp.path());
    let docx_path = tmp.path().join("resync.docx");
    fs::write(&docx_path, minimal_docx_with_text("resync phrase here")).unwrap();

    run_ctx(&config_path, &["init"]);
    run_ctx(&config_path, &["ingest", "local_file", docx_path.to_str().unwrap(), "--now"]);
    run_ctx(&config_path, &["ingest", "local_file", docx_path.to_str().unwrap(), "--now"]);

    let (search_out, _, success) = run_ctx(&config_path, &["search", "resync phrase here", "--mode", "lexical"]);
    assert!(success);
    let occurrences = search_out.matches("Document ").count();
    assert!(
        occurrences <= 1,
        "re-ingesting the same docx should not produce duplicate hits, got: {}",
        search_out
    );
}
