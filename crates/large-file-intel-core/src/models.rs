//! Core data models shared by the chunking, indexing, and retrieval stages.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A decoded, ingested document. Immutable after ingest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    #[serde(skip_serializing)]
    pub content: String,
    /// Size of the original upload in bytes (before text extraction).
    pub byte_len: usize,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
}

impl Document {
    /// Build a document, deriving its id from the file name and content.
    ///
    /// Identical uploads map to the same id, so re-ingesting them replaces
    /// the earlier index entries instead of duplicating them.
    pub fn new(file_name: &str, mime_type: &str, content: String, byte_len: usize) -> Self {
        let content_hash = sha256_hex(content.as_bytes());
        let id = derive_uuid(&[file_name.as_bytes(), b"\0", content_hash.as_bytes()]);
        Self {
            id,
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            content,
            byte_len,
            created_at: Utc::now(),
            content_hash,
        }
    }
}

/// A bounded, ordered segment of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// Ordinal within the document, contiguous from 0.
    pub chunk_index: usize,
    pub text: String,
    /// Byte offset of `text` in the source, overlap included.
    pub start: usize,
    /// Byte offset one past the end of `text` in the source.
    pub end: usize,
    /// Byte offset where this chunk's own (non-overlapping) content begins.
    pub content_start: usize,
    pub word_count: usize,
    pub heading: Option<String>,
    pub hash: String,
}

impl Chunk {
    /// The part of the chunk that is not shared with the previous chunk.
    pub fn own_text(&self) -> &str {
        &self.text[self.content_start - self.start..]
    }

    /// Number of leading bytes repeated from the previous chunk.
    pub fn overlap_len(&self) -> usize {
        self.content_start - self.start
    }
}

/// Deterministic chunk id from its document id and ordinal.
pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
    derive_uuid(&[
        document_id.as_bytes(),
        b"#",
        chunk_index.to_string().as_bytes(),
    ])
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn derive_uuid(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}
