//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the only surface the context assembler and
//! orchestrator see, so an external vector database can replace the
//! built-in [`memory::InMemoryVectorStore`] without touching retrieval code.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::SimilarityMetric;
use crate::models::Chunk;

/// A chunk and its embedding vector, as stored in the index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A chunk returned from a similarity search.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkCandidate {
    pub chunk: Chunk,
    /// Similarity under the store's metric; higher is more similar.
    pub score: f32,
}

/// Abstract vector index backend.
///
/// All operations are async (via `async-trait`) so remote backends fit the
/// same shape. In-memory implementations return immediately-ready futures.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`index`](VectorStore::index) | Insert or replace a single entry |
/// | [`replace_document`](VectorStore::replace_document) | Atomically swap all entries of a document |
/// | [`search`](VectorStore::search) | k nearest entries under the configured metric |
/// | [`get_chunk`](VectorStore::get_chunk) | Look up a chunk by document and ordinal |
/// | [`delete_document`](VectorStore::delete_document) | Remove a document's entries |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The metric fixed at construction time.
    fn metric(&self) -> SimilarityMetric;

    /// Insert or replace one entry, keyed by chunk id.
    async fn index(&self, entry: VectorEntry) -> Result<()>;

    /// Replace every entry of `document_id` with `entries` in one step.
    ///
    /// Readers observe either the previous set or the complete new set.
    async fn replace_document(&self, document_id: &str, entries: Vec<VectorEntry>) -> Result<()>;

    /// Return up to `k` entries ordered by non-increasing score, ties broken
    /// by insertion order. `document_ids` restricts the search when given.
    async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Fetch the chunk with ordinal `chunk_index` of a document.
    async fn get_chunk(&self, document_id: &str, chunk_index: usize) -> Result<Option<Chunk>>;

    /// Delete all entries of a document, returning how many were removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// Number of entries stored for a document.
    async fn document_entry_count(&self, document_id: &str) -> Result<usize>;

    /// Total number of entries.
    async fn entry_count(&self) -> Result<usize>;
}
