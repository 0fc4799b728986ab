//! Converter: raw bytes + content-type -> canonical text + outline.
//!
//! Wraps [`crate::extract`] (binary office formats) and adds the text-native
//! formats the spec's opaque Converter interface requires: plain text,
//! Markdown, and HTML. `web_url` and `drive_file` sources are fetched
//! elsewhere (`fetch.rs`) and arrive here as bytes + content-type like
//! everything else; audio is a named seam with no built-in implementation.

use anyhow::{anyhow, Result};
use scraper::{Html, Selector};

use crate::extract::{self, MIME_DOCX, MIME_PDF, MIME_PPTX, MIME_XLSX};

pub const MIME_PLAIN_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_HTML: &str = "text/html";
/// Content-type `fetch.rs` attaches to `audio_transcript` sources: text
/// already produced by an `AudioTranscriber`, so it converts like plain text.
pub const MIME_AUDIO_TRANSCRIPT: &str = "audio/transcript";

/// One level of a document's heading outline, used by the chunker to build
/// each chunk's `context` (heading path).
#[derive(Debug, Clone)]
pub struct OutlineNode {
    pub level: u8,
    pub heading: String,
    /// Byte offset into `CanonicalDocument::text` where this section starts.
    pub start: usize,
}

/// A block-level unit of body text (a paragraph, list item, etc.), the grain
/// the chunker accumulates over when walking a document's outline.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub text: String,
    /// Byte offset into `CanonicalDocument::text` where this artifact starts.
    pub start: usize,
}

/// The output of conversion: plain text plus enough structure for the
/// chunker to do a structure-aware pass before falling back.
#[derive(Debug, Clone)]
pub struct CanonicalDocument {
    pub text: String,
    pub title: Option<String>,
    pub outline: Vec<OutlineNode>,
    pub artifacts: Vec<Artifact>,
}

/// Converts fetched bytes into a [`CanonicalDocument`]. Never panics;
/// unsupported or corrupt content surfaces as `Err` so the pipeline can
/// record `ErrorKind::SourceUnreadable` and move on.
pub fn convert(bytes: &[u8], content_type: &str, title_hint: Option<&str>) -> Result<CanonicalDocument> {
    match content_type {
        MIME_PLAIN_TEXT | MIME_AUDIO_TRANSCRIPT => convert_plain_text(bytes, title_hint),
        MIME_MARKDOWN => convert_markdown(bytes, title_hint),
        MIME_HTML => convert_html(bytes, title_hint),
        MIME_PDF | MIME_DOCX | MIME_PPTX | MIME_XLSX => {
            let text = extract::extract_text(bytes, content_type).map_err(|e| anyhow!(e))?;
            let artifacts = artifacts_from_paragraphs(&text);
            Ok(CanonicalDocument {
                text,
                title: title_hint.map(str::to_string),
                outline: Vec::new(),
                artifacts,
            })
        }
        other => Err(anyhow!("unsupported content-type for conversion: {other}")),
    }
}

fn convert_plain_text(bytes: &[u8], title_hint: Option<&str>) -> Result<CanonicalDocument> {
    let text = String::from_utf8_lossy(bytes).into_owned();
    let artifacts = artifacts_from_paragraphs(&text);
    Ok(CanonicalDocument {
        text,
        title: title_hint.map(str::to_string),
        outline: Vec::new(),
        artifacts,
    })
}

/// Splits block-level text into blank-line-delimited artifacts, recording
/// each one's byte offset in the source text. Used wherever a format's
/// conversion doesn't already walk block boundaries itself.
fn artifacts_from_paragraphs(text: &str) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    let mut offset = 0usize;
    let parts: Vec<&str> = text.split("\n\n").collect();
    for (i, part) in parts.iter().enumerate() {
        let leading_ws = part.len() - part.trim_start().len();
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            artifacts.push(Artifact {
                text: trimmed.to_string(),
                start: offset + leading_ws,
            });
        }
        offset += part.len();
        if i + 1 < parts.len() {
            offset += 2; // the "\n\n" separator consumed by split
        }
    }
    artifacts
}

/// Markdown outline via ATX (`#`) headings only; setext headings and
/// front matter are treated as body text. Good enough for structure-aware
/// chunking without pulling in a full CommonMark parser. Runs of
/// non-heading, non-blank lines become artifacts the chunker accumulates
/// under the heading path in effect at that point.
fn convert_markdown(bytes: &[u8], title_hint: Option<&str>) -> Result<CanonicalDocument> {
    let text = String::from_utf8_lossy(bytes).into_owned();
    let mut outline = Vec::new();
    let mut artifacts = Vec::new();
    let mut offset = 0usize;
    let mut title = title_hint.map(str::to_string);

    let mut para_start: Option<usize> = None;
    let mut para_buf = String::new();

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n');
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        let is_heading = level >= 1 && level <= 6 && trimmed.as_bytes().get(level) == Some(&b' ');

        if is_heading {
            flush_paragraph(&mut para_start, &mut para_buf, &mut artifacts);
            let heading = trimmed[level..].trim().to_string();
            if title.is_none() && level == 1 {
                title = Some(heading.clone());
            }
            outline.push(OutlineNode {
                level: level as u8,
                heading,
                start: offset,
            });
        } else if trimmed.trim().is_empty() {
            flush_paragraph(&mut para_start, &mut para_buf, &mut artifacts);
        } else {
            if para_start.is_none() {
                para_start = Some(offset);
            } else {
                para_buf.push('\n');
            }
            para_buf.push_str(trimmed);
        }

        offset += line.len();
    }
    flush_paragraph(&mut para_start, &mut para_buf, &mut artifacts);

    Ok(CanonicalDocument { text, title, outline, artifacts })
}

fn flush_paragraph(para_start: &mut Option<usize>, para_buf: &mut String, artifacts: &mut Vec<Artifact>) {
    if let Some(start) = para_start.take() {
        let trimmed = para_buf.trim();
        if !trimmed.is_empty() {
            artifacts.push(Artifact {
                text: trimmed.to_string(),
                start,
            });
        }
    }
    para_buf.clear();
}

/// Strips markup via `scraper`, keeping `h1`-`h6` boundaries as the outline
/// and every other block-level element (`p`, `li`, `blockquote`, `pre`) as
/// an artifact. `<title>` becomes the document title when no hint was
/// supplied.
fn convert_html(bytes: &[u8], title_hint: Option<&str>) -> Result<CanonicalDocument> {
    let raw = String::from_utf8_lossy(bytes);
    let doc = Html::parse_document(&raw);

    let title = title_hint.map(str::to_string).or_else(|| {
        let sel = Selector::parse("title").ok()?;
        doc.select(&sel)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
    });

    let block_sel = Selector::parse("h1, h2, h3, h4, h5, h6, p, li, blockquote, pre").expect("static selector");
    let body_sel = Selector::parse("body").ok();
    let root = body_sel
        .as_ref()
        .and_then(|s| doc.select(s).next())
        .unwrap_or_else(|| doc.root_element());

    let mut text = String::new();
    let mut outline = Vec::new();
    let mut artifacts = Vec::new();

    for el in root.select(&block_sel) {
        let content = el.text().collect::<String>().trim().to_string();
        if content.is_empty() {
            continue;
        }

        if !text.is_empty() {
            text.push_str("\n\n");
        }
        let start = text.len();
        text.push_str(&content);

        match el.value().name().strip_prefix('h').and_then(|n| n.parse::<u8>().ok()) {
            Some(level) => outline.push(OutlineNode { level, heading: content, start }),
            None => artifacts.push(Artifact { text: content, start }),
        }
    }

    Ok(CanonicalDocument { text, title, outline, artifacts })
}

/// Transcribes audio bytes to text. No default implementation ships in this
/// crate (spec's Converter is explicitly opaque here); a deployment wires in
/// a concrete transcriber and the Validator reports `audio_transcription` as
/// unavailable until one is configured.
pub trait AudioTranscriber: Send + Sync {
    fn transcribe(&self, bytes: &[u8], content_type: &str) -> Result<String>;
}

pub struct UnimplementedAudioTranscriber;

impl AudioTranscriber for UnimplementedAudioTranscriber {
    fn transcribe(&self, _bytes: &[u8], _content_type: &str) -> Result<String> {
        Err(anyhow!(
            "audio transcription is not configured on this deployment"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_roundtrips_verbatim() {
        let doc = convert(b"hello world", MIME_PLAIN_TEXT, None).unwrap();
        assert_eq!(doc.text, "hello world");
        assert!(doc.outline.is_empty());
    }

    #[test]
    fn markdown_outline_tracks_atx_headings() {
        let md = b"# Title\nIntro text.\n## Sub\nMore text.\n";
        let doc = convert(md, MIME_MARKDOWN, None).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Title"));
        assert_eq!(doc.outline.len(), 2);
        assert_eq!(doc.outline[0].level, 1);
        assert_eq!(doc.outline[1].heading, "Sub");
    }

    #[test]
    fn html_strips_tags_and_finds_title() {
        let html = b"<html><head><title>Page</title></head><body><h1>Hi</h1><p>Body text</p></body></html>";
        let doc = convert(html, MIME_HTML, None).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Page"));
        assert!(doc.text.contains("Body text"));
        assert_eq!(doc.outline.len(), 1);
    }

    #[test]
    fn unsupported_content_type_errors() {
        assert!(convert(b"x", "application/x-unknown", None).is_err());
    }

    #[test]
    fn unimplemented_audio_transcriber_errors() {
        let t = UnimplementedAudioTranscriber;
        assert!(t.transcribe(b"abc", "audio/wav").is_err());
    }
}
