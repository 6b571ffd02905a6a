//! The processing and query orchestrator.
//!
//! [`LargeFileIntelligence`] ties the pipeline together:
//!
//! ```text
//! InputFile ─▶ size check ─▶ extract ─▶ chunk ─▶ embed (batched) ─▶ replace_document
//!                                                                        │
//!            query / stream_query ◀── rank + assemble ◀── VectorStore ◀──┘
//! ```
//!
//! At most `processing.max_concurrent_files` files are processed at once;
//! further calls wait in FIFO order on a semaphore. A document's entries
//! are published to the store in a single `replace_document` call, so a
//! failed or cancelled run never leaves partial state behind and
//! re-processing identical content replaces instead of duplicating.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use futures::Stream;
use serde::Serialize;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, warn};

use large_file_intel_core::assemble::{self, AssembleOptions, Context};
use large_file_intel_core::cancel::CancelSignal;
use large_file_intel_core::chunk::{
    chunk_document, ChunkError, ChunkProgress, ChunkingResult, ChunkingStatus,
};
use large_file_intel_core::embedding::{Embedder, TermFrequencyEmbedder};
use large_file_intel_core::models::Document;
use large_file_intel_core::store::memory::InMemoryVectorStore;
use large_file_intel_core::store::{VectorEntry, VectorStore};

use crate::config::{Config, RetrievalConfig};
use crate::error::ProcessingError;
use crate::extract::{detect_mime, extract_text, is_supported, ExtractError};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter, Stage};

/// Emits progress events for one file.
#[derive(Clone)]
struct Progress {
    reporter: Arc<dyn ProgressReporter>,
    file_name: String,
}

impl Progress {
    fn new(file_name: &str, reporter: Option<Arc<dyn ProgressReporter>>) -> Self {
        Self {
            reporter: reporter.unwrap_or_else(|| Arc::new(NoProgress)),
            file_name: file_name.to_string(),
        }
    }

    fn emit(&self, stage: Stage, progress: f64, document_id: Option<&str>) {
        self.reporter.report(&ProgressEvent {
            file_name: self.file_name.clone(),
            document_id: document_id.map(str::to_string),
            stage,
            progress,
        })
    }
}

/// An uploaded file: raw bytes plus what the caller knows about them.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub file_name: String,
    /// Declared MIME type; detected from the extension when absent.
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Read a file from disk, using its final path component as the name.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(file_name, bytes))
    }
}

/// Per-call processing hooks.
#[derive(Clone, Default)]
pub struct ProcessOptions {
    pub reporter: Option<Arc<dyn ProgressReporter>>,
    pub cancel: Option<CancelSignal>,
}

impl ProcessOptions {
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Chunked, embedded and searchable.
    Indexed,
    /// Chunked only; the vector store is disabled.
    Chunked,
    /// Nothing to chunk. Not an error.
    EmptyContent,
}

/// Chunking statistics without the chunk payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingSummary {
    pub total_chunks: usize,
    pub total_words: usize,
    pub total_chars: usize,
    pub truncated: bool,
    pub truncated_at: Option<usize>,
}

impl From<&ChunkingResult> for ChunkingSummary {
    fn from(r: &ChunkingResult) -> Self {
        Self {
            total_chunks: r.total_chunks,
            total_words: r.total_words,
            total_chars: r.total_chars,
            truncated: r.truncated,
            truncated_at: r.truncated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub document_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub status: ProcessingStatus,
    pub chunking_result: ChunkingSummary,
    /// Entries written to the vector store for this document.
    pub indexed_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub query: String,
    pub context: Context,
}

/// One item of a streamed query, emitted best-first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialResult {
    pub query: String,
    /// Zero-based position in the ranking.
    pub rank: usize,
    pub total: usize,
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub heading: Option<String>,
    pub text: String,
    pub score: f32,
}

/// What the orchestrator remembers about a processed document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub document: Document,
    pub status: ProcessingStatus,
    pub chunking: ChunkingSummary,
    pub indexed_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub documents: usize,
    pub indexed_entries: usize,
    pub embedding_model: String,
    pub dimensions: usize,
    pub similarity_metric: String,
    /// Concurrency slots currently free.
    pub available_slots: usize,
}

/// Build the vector store named by `retrieval.vector_store_type`.
pub fn create_store(retrieval: &RetrievalConfig) -> Result<Arc<dyn VectorStore>> {
    match retrieval.vector_store_type.as_str() {
        "memory" => Ok(Arc::new(InMemoryVectorStore::new(
            retrieval.similarity_metric,
        ))),
        other => bail!("Unknown vector store type: '{}'", other),
    }
}

pub struct LargeFileIntelligence {
    config: Config,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    documents: RwLock<HashMap<String, DocumentInfo>>,
    slots: Semaphore,
}

impl LargeFileIntelligence {
    /// Build an orchestrator with the built-in store and embedder.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let store = create_store(&config.retrieval)?;
        let embedder: Arc<dyn Embedder> =
            Arc::new(TermFrequencyEmbedder::new(config.retrieval.dimensions));
        Self::with_backend(config, store, embedder)
    }

    /// Build an orchestrator around a caller-supplied store and embedder.
    pub fn with_backend(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dims() != config.retrieval.dimensions {
            warn!(
                configured = config.retrieval.dimensions,
                embedder = embedder.dims(),
                "embedder dimensionality differs from retrieval.dimensions"
            );
        }
        let slots = Semaphore::new(config.processing.max_concurrent_files);
        Ok(Self {
            config,
            store,
            embedder,
            documents: RwLock::new(HashMap::new()),
            slots,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Query defaults from the `[retrieval]` section.
    pub fn default_query_options(&self) -> AssembleOptions {
        self.config.retrieval.assemble_options()
    }

    /// Extract and chunk one file without indexing it.
    ///
    /// Shares the size limit, format checks, cancellation and concurrency
    /// slot of [`process_file`](Self::process_file). The document is not
    /// registered and nothing is written to the store.
    pub async fn chunk_file(
        &self,
        file: InputFile,
        opts: ProcessOptions,
    ) -> Result<(Document, ChunkingResult), ProcessingError> {
        let progress = Progress::new(&file.file_name, opts.reporter);
        let cancel = opts.cancel.unwrap_or_default();

        progress.emit(Stage::Queued, 0.0, None);
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|e| ProcessingError::internal(&file.file_name, e))?;
        let (doc, chunking) = self.extract_and_chunk(file, &progress, &cancel).await?;
        progress.emit(Stage::Done, 1.0, Some(&doc.id));
        Ok((doc, chunking))
    }

    /// Chunk, embed and index one file.
    pub async fn process_file(
        &self,
        file: InputFile,
        opts: ProcessOptions,
    ) -> Result<ProcessingResult, ProcessingError> {
        let file_name = file.file_name.clone();
        let progress = Progress::new(&file_name, opts.reporter);
        let cancel = opts.cancel.unwrap_or_default();

        progress.emit(Stage::Queued, 0.0, None);
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|e| ProcessingError::internal(&file_name, e))?;
        let (doc, chunking) = self.extract_and_chunk(file, &progress, &cancel).await?;
        let summary = ChunkingSummary::from(&chunking);

        if chunking.status == ChunkingStatus::EmptyContent {
            info!(file = %file_name, "empty content, nothing to index");
            return Ok(self
                .finish(doc, ProcessingStatus::EmptyContent, summary, 0, &progress)
                .await);
        }
        if cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled { file_name });
        }
        if !self.config.processing.enable_vector_store {
            return Ok(self
                .finish(doc, ProcessingStatus::Chunked, summary, 0, &progress)
                .await);
        }

        progress.emit(Stage::Indexing, 0.0, Some(&doc.id));
        let chunks = chunking.chunks;
        let total = chunks.len();
        let mut entries = Vec::with_capacity(total);
        let mut batches = chunks.into_iter().peekable();
        while batches.peek().is_some() {
            for chunk in batches.by_ref().take(self.config.processing.batch_size) {
                if cancel.is_cancelled() {
                    warn!(file = %file_name, indexed = entries.len(), "indexing cancelled");
                    return Err(ProcessingError::Cancelled { file_name });
                }
                let vector = self.embedder.embed(&chunk.text);
                entries.push(VectorEntry { chunk, vector });
            }
            progress.emit(
                Stage::Indexing,
                entries.len() as f64 / total as f64,
                Some(&doc.id),
            );
            tokio::task::yield_now().await;
        }

        if cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled { file_name });
        }
        self.store
            .replace_document(&doc.id, entries)
            .await
            .map_err(|e| ProcessingError::internal(&file_name, e))?;

        info!(
            file = %file_name,
            document_id = %doc.id,
            chunks = total,
            words = summary.total_words,
            "document indexed"
        );
        Ok(self
            .finish(doc, ProcessingStatus::Indexed, summary, total, &progress)
            .await)
    }

    /// Size check, extraction and chunking. The caller holds a slot.
    async fn extract_and_chunk(
        &self,
        file: InputFile,
        progress: &Progress,
        cancel: &CancelSignal,
    ) -> Result<(Document, ChunkingResult), ProcessingError> {
        let InputFile {
            file_name,
            mime_type,
            bytes,
        } = file;

        let size = bytes.len() as u64;
        let limit = self.config.processing.max_file_size;
        if size > limit {
            warn!(file = %file_name, size, limit, "file exceeds size limit");
            return Err(ProcessingError::SizeExceeded {
                file_name,
                size,
                limit,
            });
        }
        if cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled { file_name });
        }

        let mime = detect_mime(&file_name, mime_type.as_deref());
        if !is_supported(&mime) {
            warn!(file = %file_name, mime = %mime, "unsupported content type");
            return Err(ProcessingError::UnsupportedFormat {
                file_name,
                reason: ExtractError::UnsupportedContentType(mime).to_string(),
            });
        }
        let byte_len = bytes.len();
        let extract_mime = mime.clone();
        let text = tokio::task::spawn_blocking(move || extract_text(&bytes, &extract_mime))
            .await
            .map_err(|e| ProcessingError::internal(&file_name, e))?
            .map_err(|e: ExtractError| ProcessingError::UnsupportedFormat {
                file_name: file_name.clone(),
                reason: e.to_string(),
            })?;

        let doc = Document::new(&file_name, &mime, text, byte_len);
        debug!(file = %file_name, document_id = %doc.id, mime = %mime, "extracted");
        progress.emit(Stage::Chunking, 0.0, Some(&doc.id));

        let chunking_config = self.config.chunking.clone();
        let chunk_progress = progress.clone();
        let chunk_cancel = cancel.clone();
        let (doc, chunking) = tokio::task::spawn_blocking(move || {
            let mut on_progress = |p: ChunkProgress| {
                chunk_progress.emit(Stage::Chunking, p.fraction, Some(&doc.id))
            };
            let result = chunk_document(
                &doc,
                &chunking_config,
                &mut on_progress,
                Some(&chunk_cancel),
            );
            (doc, result)
        })
        .await
        .map_err(|e| ProcessingError::internal(&file_name, e))?;

        let chunking = chunking.map_err(|e| match e {
            ChunkError::Cancelled { emitted } => {
                warn!(file = %file_name, emitted, "chunking cancelled");
                ProcessingError::Cancelled {
                    file_name: file_name.clone(),
                }
            }
            ChunkError::InvalidConfig(_) => ProcessingError::internal(&file_name, e),
        })?;
        if chunking.truncated {
            warn!(
                file = %file_name,
                chunks = chunking.total_chunks,
                truncated_at = ?chunking.truncated_at,
                "document truncated at max_chunks_per_document"
            );
        }
        Ok((doc, chunking))
    }

    async fn finish(
        &self,
        doc: Document,
        status: ProcessingStatus,
        chunking: ChunkingSummary,
        indexed_entries: usize,
        progress: &Progress,
    ) -> ProcessingResult {
        let result = ProcessingResult {
            document_id: doc.id.clone(),
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.clone(),
            status,
            chunking_result: chunking.clone(),
            indexed_entries,
        };
        self.documents.write().await.insert(
            doc.id.clone(),
            DocumentInfo {
                document: doc,
                status,
                chunking,
                indexed_entries,
            },
        );
        progress.emit(Stage::Done, 1.0, Some(&result.document_id));
        result
    }

    /// Process several files concurrently, bounded by
    /// `processing.max_concurrent_files`. Results keep input order.
    pub async fn process_files(
        &self,
        files: Vec<InputFile>,
        opts: ProcessOptions,
    ) -> Vec<Result<ProcessingResult, ProcessingError>> {
        let jobs = files
            .into_iter()
            .map(|file| self.process_file(file, opts.clone()));
        futures::future::join_all(jobs).await
    }

    /// Assemble a bounded context for `text`.
    ///
    /// An empty `document_ids` searches every indexed document.
    pub async fn query(
        &self,
        text: &str,
        document_ids: &[String],
        opts: &AssembleOptions,
    ) -> Result<QueryResult> {
        let context = assemble::assemble(
            self.store.as_ref(),
            self.embedder.as_ref(),
            text,
            document_ids,
            opts,
        )
        .await?;
        debug!(
            query = text,
            chunks = context.total_chunks,
            evicted = context.evicted,
            "query assembled"
        );
        Ok(QueryResult {
            query: text.to_string(),
            context,
        })
    }

    /// Stream ranked chunks one at a time, best first.
    ///
    /// Fails up front when `processing.enable_streaming` is off.
    pub fn stream_query<'a>(
        &'a self,
        text: &str,
        document_ids: &[String],
        opts: &AssembleOptions,
    ) -> Result<impl Stream<Item = Result<PartialResult>> + Send + 'a> {
        if !self.config.processing.enable_streaming {
            bail!("streaming queries are disabled (processing.enable_streaming = false)");
        }
        let query = text.to_string();
        let document_ids = document_ids.to_vec();
        let opts = opts.clone();
        Ok(async_stream::try_stream! {
            let hits = assemble::rank(
                self.store.as_ref(),
                self.embedder.as_ref(),
                &query,
                &document_ids,
                &opts,
            )
            .await?;
            let total = hits.len();
            for (rank, hit) in hits.into_iter().enumerate() {
                yield PartialResult {
                    query: query.clone(),
                    rank,
                    total,
                    chunk_id: hit.chunk.id,
                    document_id: hit.chunk.document_id,
                    chunk_index: hit.chunk.chunk_index,
                    heading: hit.chunk.heading,
                    text: hit.chunk.text,
                    score: hit.score,
                };
            }
        })
    }

    /// Forget a document and drop its index entries. Returns whether it was known.
    pub async fn remove_document(&self, document_id: &str) -> Result<bool> {
        let removed_entries = self.store.delete_document(document_id).await?;
        let known = self.documents.write().await.remove(document_id).is_some();
        if known || removed_entries > 0 {
            info!(document_id, removed_entries, "document removed");
        }
        Ok(known || removed_entries > 0)
    }

    pub async fn document(&self, document_id: &str) -> Option<DocumentInfo> {
        self.documents.read().await.get(document_id).cloned()
    }

    /// All processed documents, oldest first.
    pub async fn documents(&self) -> Vec<DocumentInfo> {
        let mut docs: Vec<DocumentInfo> = self.documents.read().await.values().cloned().collect();
        docs.sort_by(|a, b| {
            a.document
                .created_at
                .cmp(&b.document.created_at)
                .then_with(|| a.document.file_name.cmp(&b.document.file_name))
        });
        docs
    }

    pub async fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            documents: self.documents.read().await.len(),
            indexed_entries: self.store.entry_count().await?,
            embedding_model: self.embedder.model_name().to_string(),
            dimensions: self.embedder.dims(),
            similarity_metric: self.store.metric().to_string(),
            available_slots: self.slots.available_permits(),
        })
    }
}
