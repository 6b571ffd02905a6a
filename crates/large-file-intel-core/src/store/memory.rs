//! In-memory [`VectorStore`] implementation.
//!
//! Uses `HashMap`s behind a single `std::sync::RwLock`, so a document's
//! entries are published in one write. Search is brute-force scoring over
//! all stored vectors. Nothing survives a process restart.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::SimilarityMetric;
use crate::models::Chunk;

use super::{ChunkCandidate, VectorEntry, VectorStore};

struct StoredEntry {
    /// Insertion sequence, used as the search tie-breaker.
    seq: u64,
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, StoredEntry>,
    /// document id -> chunk index -> chunk id
    by_document: HashMap<String, BTreeMap<usize, String>>,
    next_seq: u64,
}

impl Inner {
    fn insert(&mut self, entry: VectorEntry, keep_seq: bool) {
        let chunk_id = entry.chunk.id.clone();
        let seq = match self.entries.get(&chunk_id) {
            Some(existing) if keep_seq => existing.seq,
            _ => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.by_document
            .entry(entry.chunk.document_id.clone())
            .or_default()
            .insert(entry.chunk.chunk_index, chunk_id.clone());
        self.entries.insert(
            chunk_id,
            StoredEntry {
                seq,
                chunk: entry.chunk,
                vector: entry.vector,
            },
        );
    }

    fn remove_document(&mut self, document_id: &str) -> usize {
        match self.by_document.remove(document_id) {
            Some(ids) => {
                for id in ids.values() {
                    self.entries.remove(id);
                }
                ids.len()
            }
            None => 0,
        }
    }
}

/// In-memory vector store.
pub struct InMemoryVectorStore {
    metric: SimilarityMetric,
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    pub fn new(metric: SimilarityMetric) -> Self {
        Self {
            metric,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("vector store lock poisoned"))
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(SimilarityMetric::default())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    async fn index(&self, entry: VectorEntry) -> Result<()> {
        self.write()?.insert(entry, true);
        Ok(())
    }

    async fn replace_document(&self, document_id: &str, entries: Vec<VectorEntry>) -> Result<()> {
        if let Some(stray) = entries.iter().find(|e| e.chunk.document_id != document_id) {
            bail!(
                "chunk {} belongs to document {}, not {}",
                stray.chunk.id,
                stray.chunk.document_id,
                document_id
            );
        }
        let mut inner = self.write()?;
        inner.remove_document(document_id);
        for entry in entries {
            inner.insert(entry, false);
        }
        Ok(())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<ChunkCandidate>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let filter: Option<HashSet<&str>> =
            document_ids.map(|ids| ids.iter().map(String::as_str).collect());

        let inner = self.read()?;
        let mut scored: Vec<(f32, u64, &Chunk)> = inner
            .entries
            .values()
            .filter(|e| {
                filter
                    .as_ref()
                    .map_or(true, |f| f.contains(e.chunk.document_id.as_str()))
            })
            .map(|e| (self.metric.score(query_vec, &e.vector), e.seq, &e.chunk))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, _, chunk)| ChunkCandidate {
                chunk: chunk.clone(),
                score,
            })
            .collect())
    }

    async fn get_chunk(&self, document_id: &str, chunk_index: usize) -> Result<Option<Chunk>> {
        let inner = self.read()?;
        Ok(inner
            .by_document
            .get(document_id)
            .and_then(|ids| ids.get(&chunk_index))
            .and_then(|id| inner.entries.get(id))
            .map(|e| e.chunk.clone()))
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        Ok(self.write()?.remove_document(document_id))
    }

    async fn document_entry_count(&self, document_id: &str) -> Result<usize> {
        Ok(self
            .read()?
            .by_document
            .get(document_id)
            .map_or(0, BTreeMap::len))
    }

    async fn entry_count(&self) -> Result<usize> {
        Ok(self.read()?.entries.len())
    }
}
