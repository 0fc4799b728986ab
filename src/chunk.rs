//! Structure-aware chunker with a paragraph/sentence-boundary fallback.
//!
//! A document with an outline (Markdown/HTML headings) is split section by
//! section, carrying each chunk's heading path in `context`. A document with
//! no outline, or an individual section too large to fit in one chunk, falls
//! back to splitting on paragraph then sentence boundaries. Which path
//! produced a given chunk is recorded in `chunker_method`; the specific
//! reason a fallback was triggered is logged at debug level only, per a
//! decision recorded in DESIGN.md not to persist it as a third enum variant.

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::convert::{Artifact, CanonicalDocument, OutlineNode};
use crate::models::ChunkerMethod;
use crate::models::ChunkRecord;

/// Approximate chars-per-token ratio used to bound chunk size without a
/// real tokenizer in the loop.
const CHARS_PER_TOKEN: usize = 4;

/// Splits a converted document into chunks with strictly increasing,
/// zero-based `chunk_index`. `tenant`/`source_group` are stamped onto every
/// chunk so downstream upserts never need to look them up separately.
pub fn chunk_document(
    document_id: &str,
    doc: &CanonicalDocument,
    max_tokens: usize,
    tenant: &str,
    source_group: &str,
) -> Vec<ChunkRecord> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    let mut pieces: Vec<(Vec<String>, String, ChunkerMethod)> = if doc.outline.is_empty() || doc.artifacts.is_empty() {
        tracing::debug!(document_id, "no outline or no artifacts; using fallback chunker for whole document");
        split_fallback(&doc.text, max_chars)
            .into_iter()
            .map(|text| (Vec::new(), text, ChunkerMethod::Fallback))
            .collect()
    } else {
        accumulate_artifacts(document_id, &doc.outline, &doc.artifacts, max_chars)
    };

    if pieces.is_empty() {
        pieces.push((Vec::new(), doc.text.trim().to_string(), ChunkerMethod::Fallback));
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, (context, text, method))| {
            make_chunk(document_id, index as i64, &text, context, method, tenant, source_group)
        })
        .collect()
}

/// One entry in the depth-first walk over a document's headings and
/// artifacts, ordered by byte offset so heading boundaries interleave
/// correctly with the body text that falls under them.
enum WalkItem<'a> {
    Heading(&'a OutlineNode),
    Artifact(&'a Artifact),
}

/// Walks outline and artifacts together in document order, accumulating
/// artifacts under the heading path in effect at that point until the
/// running buffer would exceed `max_chars` or a heading boundary is
/// crossed. An artifact that alone exceeds `max_chars` is the only case
/// that falls back, and only for that one artifact.
fn accumulate_artifacts(
    document_id: &str,
    outline: &[OutlineNode],
    artifacts: &[Artifact],
    max_chars: usize,
) -> Vec<(Vec<String>, String, ChunkerMethod)> {
    let mut items: Vec<(usize, WalkItem)> = Vec::with_capacity(outline.len() + artifacts.len());
    items.extend(outline.iter().map(|n| (n.start, WalkItem::Heading(n))));
    items.extend(artifacts.iter().map(|a| (a.start, WalkItem::Artifact(a))));
    items.sort_by_key(|(start, _)| *start);

    let mut pieces: Vec<(Vec<String>, String, ChunkerMethod)> = Vec::new();
    let mut stack: Vec<(u8, String)> = Vec::new();
    let mut buf = String::new();
    let mut buf_context: Vec<String> = Vec::new();

    for (_, item) in items {
        match item {
            WalkItem::Heading(node) => {
                if !buf.is_empty() {
                    pieces.push((buf_context.clone(), std::mem::take(&mut buf), ChunkerMethod::StructureAware));
                }
                while stack.last().map(|(lvl, _)| *lvl >= node.level).unwrap_or(false) {
                    stack.pop();
                }
                stack.push((node.level, node.heading.clone()));
                buf_context = stack.iter().map(|(_, h)| h.clone()).collect();
            }
            WalkItem::Artifact(art) => {
                let trimmed = art.text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let context: Vec<String> = stack.iter().map(|(_, h)| h.clone()).collect();

                if trimmed.len() > max_chars {
                    if !buf.is_empty() {
                        pieces.push((buf_context.clone(), std::mem::take(&mut buf), ChunkerMethod::StructureAware));
                    }
                    tracing::debug!(
                        document_id,
                        heading = ?context.last(),
                        "artifact exceeds max_tokens; falling back to sub-split"
                    );
                    for text in split_fallback(trimmed, max_chars) {
                        pieces.push((context.clone(), text, ChunkerMethod::Fallback));
                    }
                    buf_context = context;
                    continue;
                }

                let would_be = if buf.is_empty() {
                    trimmed.len()
                } else {
                    buf.len() + 2 + trimmed.len()
                };
                if (would_be > max_chars || context != buf_context) && !buf.is_empty() {
                    pieces.push((buf_context.clone(), std::mem::take(&mut buf), ChunkerMethod::StructureAware));
                }
                buf_context = context;
                if !buf.is_empty() {
                    buf.push_str("\n\n");
                }
                buf.push_str(trimmed);
            }
        }
    }

    if !buf.is_empty() {
        pieces.push((buf_context, buf, ChunkerMethod::StructureAware));
    }

    pieces
}

/// Paragraph-then-sentence-then-hard-width split, used for documents with no
/// outline and for individual oversized sections.
fn split_fallback(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }

    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    let mut chunks = Vec::new();
    let mut buf = String::new();

    for para in paragraphs {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !buf.is_empty() {
            chunks.push(std::mem::take(&mut buf));
        }

        if trimmed.len() > max_chars {
            if !buf.is_empty() {
                chunks.push(std::mem::take(&mut buf));
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = remaining.len().min(max_chars);
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind(['.', '!', '?'])
                        .map(|pos| pos + 1)
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                chunks.push(remaining[..actual_split].trim().to_string());
                remaining = &remaining[actual_split..];
            }
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }

    if chunks.is_empty() {
        chunks.push(text.trim().to_string());
    }

    chunks
}

#[allow(clippy::too_many_arguments)]
fn make_chunk(
    document_id: &str,
    index: i64,
    text: &str,
    context: Vec<String>,
    method: ChunkerMethod,
    tenant: &str,
    source_group: &str,
) -> ChunkRecord {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    ChunkRecord {
        chunk_id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        content: text.to_string(),
        token_count: (text.len() / CHARS_PER_TOKEN).max(1) as i64,
        embedding: None,
        content_hash,
        context,
        chunker_method: method,
        metadata: json!({}),
        tenant: tenant.to_string(),
        source_group: source_group.to_string(),
    }
}

/// Timestamp helper kept here (rather than in every caller) since job and
/// document records all stamp `Utc::now()` the same way.
pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{convert, MIME_MARKDOWN};

    #[test]
    fn no_outline_uses_fallback_with_empty_context() {
        let doc = CanonicalDocument {
            text: "Hello, world!".to_string(),
            title: None,
            outline: Vec::new(),
            artifacts: Vec::new(),
        };
        let chunks = chunk_document("doc1", &doc, 700, "", "");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunker_method, ChunkerMethod::Fallback);
        assert!(chunks[0].context.is_empty());
    }

    #[test]
    fn chunk_indices_are_contiguous_from_zero() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let doc = CanonicalDocument {
            text,
            title: None,
            outline: Vec::new(),
            artifacts: Vec::new(),
        };
        let chunks = chunk_document("doc1", &doc, 10, "", "");
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn structure_aware_chunks_carry_heading_path() {
        let md = b"# Title\nIntro.\n## Sub\nDetails about sub.\n";
        let doc = convert(md, MIME_MARKDOWN, None).unwrap();
        let chunks = chunk_document("doc1", &doc, 700, "acme", "wiki");
        assert!(chunks
            .iter()
            .any(|c| c.chunker_method == ChunkerMethod::StructureAware));
        let sub_chunk = chunks
            .iter()
            .find(|c| c.content.contains("Details about sub"))
            .unwrap();
        assert_eq!(sub_chunk.context, vec!["Title".to_string(), "Sub".to_string()]);
        assert_eq!(sub_chunk.tenant, "acme");
        assert_eq!(sub_chunk.source_group, "wiki");
    }

    #[test]
    fn oversized_section_falls_back_internally() {
        let mut text = "# Big\n".to_string();
        for i in 0..200 {
            text.push_str(&format!("Sentence number {i} in a very long section. "));
        }
        let doc = convert(text.as_bytes(), MIME_MARKDOWN, None).unwrap();
        let chunks = chunk_document("doc1", &doc, 20, "", "");
        assert!(chunks.len() > 1);
        assert!(chunks
            .iter()
            .all(|c| c.chunker_method == ChunkerMethod::Fallback));
    }

    #[test]
    fn deterministic_content_hash() {
        let doc = CanonicalDocument {
            text: "Alpha\n\nBeta\n\nGamma\n\nDelta".to_string(),
            title: None,
            outline: Vec::new(),
            artifacts: Vec::new(),
        };
        let c1 = chunk_document("doc1", &doc, 5, "", "");
        let c2 = chunk_document("doc1", &doc, 5, "", "");
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.content, b.content);
            assert_eq!(a.content_hash, b.content_hash);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }
}
