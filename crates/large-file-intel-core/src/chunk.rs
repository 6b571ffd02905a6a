//! Boundary-aware text chunker with overlap.
//!
//! Splits document text into [`Chunk`]s of at most `max_chunk_size`
//! characters (overlap included). Each chunk after the first repeats up to
//! `overlap_size` trailing characters of the previous chunk so that
//! retrieval keeps cross-boundary context.
//!
//! # Algorithm
//!
//! 1. Start the next chunk `overlap_size` characters before the end of the
//!    previous one (never before the previous chunk's own content).
//! 2. Take a window of `max_chunk_size` characters from there.
//! 3. With `semantic_boundaries`, cut at the last paragraph break in the
//!    second half of the window, else the last sentence end in the second
//!    half, else the last whitespace. Otherwise, or if none is found, cut
//!    hard at the window end.
//! 4. Stop once `max_chunks_per_document` chunks exist; the rest of the
//!    text is dropped and the result is marked `truncated`.
//!
//! Offsets stored on each chunk are byte offsets into the source, always on
//! UTF-8 char boundaries. Concatenating [`Chunk::own_text`] over all chunks
//! reproduces the source (up to `truncated_at` when truncated).
//!
//! # Example
//!
//! ```rust
//! use large_file_intel_core::chunk::{chunk_text, ChunkingConfig, ChunkingStatus};
//!
//! let result = chunk_text("doc-1", "Hello world.\n\nSecond paragraph.", &ChunkingConfig::default()).unwrap();
//! assert_eq!(result.status, ChunkingStatus::Chunked);
//! assert_eq!(result.total_chunks, 1);
//! assert_eq!(result.chunks[0].chunk_index, 0);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancelSignal;
use crate::models::{chunk_id, sha256_hex, Chunk, Document};

/// Progress is reported every this many emitted chunks, plus once at the end.
pub const PROGRESS_EVERY: usize = 10;

/// Chunking parameters. Sizes are in characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
    #[serde(default = "default_semantic_boundaries")]
    pub semantic_boundaries: bool,
    #[serde(default = "default_max_chunks_per_document")]
    pub max_chunks_per_document: usize,
}

fn default_max_chunk_size() -> usize {
    4000
}
fn default_overlap_size() -> usize {
    200
}
fn default_semantic_boundaries() -> bool {
    true
}
fn default_max_chunks_per_document() -> usize {
    1000
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            overlap_size: default_overlap_size(),
            semantic_boundaries: default_semantic_boundaries(),
            max_chunks_per_document: default_max_chunks_per_document(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.max_chunk_size == 0 {
            return Err(ChunkError::InvalidConfig(
                "max_chunk_size must be > 0".to_string(),
            ));
        }
        if self.overlap_size >= self.max_chunk_size {
            return Err(ChunkError::InvalidConfig(format!(
                "overlap_size ({}) must be smaller than max_chunk_size ({})",
                self.overlap_size, self.max_chunk_size
            )));
        }
        if self.max_chunks_per_document == 0 {
            return Err(ChunkError::InvalidConfig(
                "max_chunks_per_document must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),
    #[error("chunking cancelled after {emitted} chunks")]
    Cancelled { emitted: usize },
}

/// Whether the document had any content to chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStatus {
    Chunked,
    /// Empty or whitespace-only input. Not an error.
    EmptyContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingResult {
    pub status: ChunkingStatus,
    #[serde(skip_serializing)]
    pub chunks: Vec<Chunk>,
    pub total_chunks: usize,
    pub total_words: usize,
    pub total_chars: usize,
    pub truncated: bool,
    /// Byte offset where dropped content begins, when truncated.
    pub truncated_at: Option<usize>,
}

/// Milestone reported while chunking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkProgress {
    pub chunks_emitted: usize,
    /// Fraction of the source consumed, in `[0.0, 1.0]`.
    pub fraction: f64,
}

/// Chunk a document without progress reporting or cancellation.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    config: &ChunkingConfig,
) -> Result<ChunkingResult, ChunkError> {
    chunk_text_with(document_id, text, config, &mut |_| {}, None)
}

/// Chunk an ingested [`Document`].
pub fn chunk_document(
    doc: &Document,
    config: &ChunkingConfig,
    on_progress: &mut dyn FnMut(ChunkProgress),
    cancel: Option<&CancelSignal>,
) -> Result<ChunkingResult, ChunkError> {
    chunk_text_with(&doc.id, &doc.content, config, on_progress, cancel)
}

/// Full chunking entry point.
///
/// `cancel` is checked before every chunk emission; a cancelled run returns
/// [`ChunkError::Cancelled`] and discards everything produced so far.
pub fn chunk_text_with(
    document_id: &str,
    text: &str,
    config: &ChunkingConfig,
    on_progress: &mut dyn FnMut(ChunkProgress),
    cancel: Option<&CancelSignal>,
) -> Result<ChunkingResult, ChunkError> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(ChunkingResult {
            status: ChunkingStatus::EmptyContent,
            chunks: Vec::new(),
            total_chunks: 0,
            total_words: 0,
            total_chars: text.chars().count(),
            truncated: false,
            truncated_at: None,
        });
    }

    let total = text.len();
    let headings = detect_headings(text);
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut pos = 0usize;
    let mut prev_content_start = 0usize;
    let mut truncated_at = None;

    while pos < total {
        if chunks.len() == config.max_chunks_per_document {
            truncated_at = Some(pos);
            break;
        }
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(ChunkError::Cancelled {
                emitted: chunks.len(),
            });
        }

        let start = if chunks.is_empty() {
            pos
        } else {
            overlap_start(text, prev_content_start, pos, config)
        };
        let hard_end = advance_chars(text, start, config.max_chunk_size);
        let end = if hard_end >= total {
            total
        } else if config.semantic_boundaries {
            find_split(text, start, pos, hard_end)
        } else {
            hard_end
        };

        let slice = &text[start..end];
        let index = chunks.len();
        chunks.push(Chunk {
            id: chunk_id(document_id, index),
            document_id: document_id.to_string(),
            chunk_index: index,
            text: slice.to_string(),
            start,
            end,
            content_start: pos,
            word_count: slice.split_whitespace().count(),
            heading: heading_for(&headings, pos, end),
            hash: sha256_hex(slice.as_bytes()),
        });

        prev_content_start = pos;
        pos = end;

        if chunks.len() % PROGRESS_EVERY == 0 {
            on_progress(ChunkProgress {
                chunks_emitted: chunks.len(),
                fraction: pos as f64 / total as f64,
            });
        }
    }

    on_progress(ChunkProgress {
        chunks_emitted: chunks.len(),
        fraction: 1.0,
    });

    Ok(ChunkingResult {
        status: ChunkingStatus::Chunked,
        total_chunks: chunks.len(),
        total_words: text.split_whitespace().count(),
        total_chars: text.chars().count(),
        truncated: truncated_at.is_some(),
        truncated_at,
        chunks,
    })
}

/// Byte index `n` chars after `from`, clamped to the text end.
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

/// Byte index `n` chars before `from`, clamped to 0.
fn retreat_chars(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn overlap_start(text: &str, prev_content_start: usize, pos: usize, config: &ChunkingConfig) -> usize {
    let start = retreat_chars(text, pos, config.overlap_size).max(prev_content_start);
    if !config.semantic_boundaries || start == prev_content_start || start == pos {
        return start;
    }
    let prev_is_space = text[..start]
        .chars()
        .next_back()
        .is_some_and(char::is_whitespace);
    if prev_is_space {
        return start;
    }
    // Mid-word: skip past the next whitespace, or drop the overlap entirely.
    match text[start..pos].char_indices().find(|(_, c)| c.is_whitespace()) {
        Some((i, c)) => start + i + c.len_utf8(),
        None => pos,
    }
}

/// Pick a semantic cut in `(pos, hard_end]`.
fn find_split(text: &str, start: usize, pos: usize, hard_end: usize) -> usize {
    let window = &text[pos..hard_end];
    let half = start + (hard_end - start) / 2;
    let min = half.saturating_sub(pos).max(1);

    if let Some(i) = window.rfind("\n\n") {
        let cut = i + 2;
        if cut >= min {
            return pos + cut;
        }
    }

    for (i, c) in window.char_indices().rev() {
        let cut = i + c.len_utf8();
        if cut < min {
            break;
        }
        if c.is_whitespace()
            && matches!(window[..i].chars().next_back(), Some('.' | '!' | '?'))
        {
            return pos + cut;
        }
    }

    if let Some((i, c)) = window.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
        let cut = i + c.len_utf8();
        if cut >= min {
            return pos + cut;
        }
    }

    hard_end
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Heading {
    offset: usize,
    title: String,
}

/// ATX (`# Title`) and setext (`Title` / `=====`) headings, in source order.
/// Lines inside fenced code blocks are ignored.
fn detect_headings(text: &str) -> Vec<Heading> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    let mut prev: Option<(usize, &str)> = None;
    let mut fence: Option<(char, usize)> = None;

    for line in text.split_inclusive('\n') {
        let t = line.trim();
        if let Some(marker) = fence_marker(t) {
            match fence {
                None => fence = Some(marker),
                Some((ch, len)) => {
                    let closes = marker.0 == ch && marker.1 >= len && t[marker.1..].trim().is_empty();
                    if closes {
                        fence = None;
                    }
                }
            }
            prev = None;
            offset += line.len();
            continue;
        }
        if fence.is_some() {
            prev = None;
            offset += line.len();
            continue;
        }
        if t.starts_with('#') {
            let hashes = t.chars().take_while(|c| *c == '#').count();
            let rest = &t[hashes..];
            if hashes <= 6 && (rest.is_empty() || rest.starts_with(' ')) {
                let title = rest.trim().trim_end_matches('#').trim();
                if !title.is_empty() {
                    out.push(Heading {
                        offset,
                        title: title.to_string(),
                    });
                }
            }
        } else if is_setext_underline(t) {
            if let Some((prev_offset, prev_text)) = prev {
                if !prev_text.is_empty() && !prev_text.starts_with('#') {
                    out.push(Heading {
                        offset: prev_offset,
                        title: prev_text.to_string(),
                    });
                }
            }
        }
        prev = Some((offset, t));
        offset += line.len();
    }

    out
}

/// Opening or closing code fence: three or more backticks or tildes.
fn fence_marker(t: &str) -> Option<(char, usize)> {
    let ch = t.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = t.chars().take_while(|c| *c == ch).count();
    (len >= 3).then_some((ch, len))
}

fn is_setext_underline(t: &str) -> bool {
    (t.len() >= 2 && t.chars().all(|c| c == '=')) || (t.len() >= 3 && t.chars().all(|c| c == '-'))
}

fn heading_for(headings: &[Heading], content_start: usize, end: usize) -> Option<String> {
    let idx = headings.partition_point(|h| h.offset <= content_start);
    if idx > 0 {
        return Some(headings[idx - 1].title.clone());
    }
    headings
        .first()
        .filter(|h| h.offset < end)
        .map(|h| h.title.clone())
}
