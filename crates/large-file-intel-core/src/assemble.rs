//! Context assembly: turn a query into a bounded context window.
//!
//! Operates entirely through the [`VectorStore`] trait and an [`Embedder`];
//! the caller passes the same embedder that was used at indexing time.
//!
//! # Algorithm
//!
//! 1. Embed the query and fetch the `max_chunks` nearest chunks.
//! 2. Drop hits scoring below `similarity_threshold`.
//! 3. With `include_neighbors`, add the chunks right before and after each
//!    hit (same document), inheriting the hit's score.
//! 4. While the rendered text exceeds `max_context_size` characters, evict
//!    the lowest-priority chunk: lowest score, then neighbors before direct
//!    hits, then later-ranked before earlier-ranked.
//! 5. Order the survivors: document order when neighbors were requested,
//!    ranked order otherwise. Adjacent chunks are joined without repeating
//!    their overlap; anything else is separated by a blank line.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;

use crate::embedding::Embedder;
use crate::models::Chunk;
use crate::store::{ChunkCandidate, VectorStore};

/// Placed between non-adjacent chunks in the rendered context.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Per-query retrieval parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembleOptions {
    /// Number of nearest chunks fetched from the store.
    pub max_chunks: usize,
    /// Hits scoring below this are discarded.
    pub similarity_threshold: f32,
    /// Pull in the chunks adjacent to each hit.
    pub include_neighbors: bool,
    /// Upper bound on the rendered context, in characters.
    pub max_context_size: usize,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            max_chunks: 5,
            similarity_threshold: 0.1,
            include_neighbors: false,
            max_context_size: 16_000,
        }
    }
}

/// One chunk of an assembled context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub heading: Option<String>,
    pub text: String,
    pub score: f32,
    /// Included as a neighbor of a hit rather than as a hit itself.
    pub neighbor: bool,
}

/// The bounded context produced for one query.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub query: String,
    pub chunks: Vec<ContextChunk>,
    pub total_chunks: usize,
    pub text: String,
    /// Chunks dropped to respect `max_context_size`.
    pub evicted: usize,
}

impl Context {
    pub fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Ranked hits above the threshold, best first.
///
/// An empty `document_ids` searches every indexed document. An empty query
/// or unknown ids yield no hits, never an error.
pub async fn rank<S, E>(
    store: &S,
    embedder: &E,
    query: &str,
    document_ids: &[String],
    opts: &AssembleOptions,
) -> Result<Vec<ChunkCandidate>>
where
    S: VectorStore + ?Sized,
    E: Embedder + ?Sized,
{
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    let query_vec = embedder.embed(query);
    let filter = if document_ids.is_empty() {
        None
    } else {
        Some(document_ids)
    };
    let hits = store.search(&query_vec, opts.max_chunks, filter).await?;
    Ok(hits
        .into_iter()
        .filter(|h| h.score >= opts.similarity_threshold)
        .collect())
}

struct Selected {
    chunk: Chunk,
    score: f32,
    neighbor: bool,
    /// Rank of the hit that brought this chunk in.
    rank: usize,
}

/// Assemble the context window for `query`.
pub async fn assemble<S, E>(
    store: &S,
    embedder: &E,
    query: &str,
    document_ids: &[String],
    opts: &AssembleOptions,
) -> Result<Context>
where
    S: VectorStore + ?Sized,
    E: Embedder + ?Sized,
{
    let hits = rank(store, embedder, query, document_ids, opts).await?;
    if hits.is_empty() {
        return Ok(Context::empty(query));
    }

    let mut selected: Vec<Selected> = Vec::with_capacity(hits.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for (rank, hit) in hits.iter().enumerate() {
        seen.insert(hit.chunk.id.clone(), selected.len());
        selected.push(Selected {
            chunk: hit.chunk.clone(),
            score: hit.score,
            neighbor: false,
            rank,
        });
    }

    if opts.include_neighbors {
        for (rank, hit) in hits.iter().enumerate() {
            let index = hit.chunk.chunk_index;
            let around = [index.checked_sub(1), index.checked_add(1)];
            for ordinal in around.into_iter().flatten() {
                let Some(chunk) = store.get_chunk(&hit.chunk.document_id, ordinal).await? else {
                    continue;
                };
                match seen.get(&chunk.id) {
                    Some(&i) => {
                        if selected[i].score < hit.score {
                            selected[i].score = hit.score;
                        }
                    }
                    None => {
                        seen.insert(chunk.id.clone(), selected.len());
                        selected.push(Selected {
                            chunk,
                            score: hit.score,
                            neighbor: true,
                            rank,
                        });
                    }
                }
            }
        }
    }

    // Highest priority first.
    selected.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.neighbor.cmp(&b.neighbor))
            .then(a.rank.cmp(&b.rank))
            .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });

    let doc_position = document_positions(document_ids, &hits);
    let mut keep = selected.len();
    let mut evicted = 0;
    let (chunks, text) = loop {
        let ordered = output_order(&selected[..keep], opts.include_neighbors, &doc_position);
        let text = render(&ordered, opts.include_neighbors);
        if keep == 0 || text.chars().count() <= opts.max_context_size {
            break (ordered, text);
        }
        keep -= 1;
        evicted += 1;
    };

    let chunks: Vec<ContextChunk> = chunks
        .into_iter()
        .map(|s| ContextChunk {
            chunk_id: s.chunk.id.clone(),
            document_id: s.chunk.document_id.clone(),
            chunk_index: s.chunk.chunk_index,
            heading: s.chunk.heading.clone(),
            text: s.chunk.text.clone(),
            score: s.score,
            neighbor: s.neighbor,
        })
        .collect();

    Ok(Context {
        query: query.to_string(),
        total_chunks: chunks.len(),
        chunks,
        text,
        evicted,
    })
}

/// Document ordering key: position in the request, else first-hit rank.
fn document_positions(document_ids: &[String], hits: &[ChunkCandidate]) -> HashMap<String, usize> {
    let mut positions = HashMap::new();
    if document_ids.is_empty() {
        for (i, hit) in hits.iter().enumerate() {
            positions.entry(hit.chunk.document_id.clone()).or_insert(i);
        }
    } else {
        for (i, id) in document_ids.iter().enumerate() {
            positions.entry(id.clone()).or_insert(i);
        }
    }
    positions
}

fn output_order<'a>(
    selected: &'a [Selected],
    document_order: bool,
    doc_position: &HashMap<String, usize>,
) -> Vec<&'a Selected> {
    let mut ordered: Vec<&Selected> = selected.iter().collect();
    if document_order {
        ordered.sort_by_key(|s| {
            (
                doc_position
                    .get(&s.chunk.document_id)
                    .copied()
                    .unwrap_or(usize::MAX),
                s.chunk.document_id.clone(),
                s.chunk.chunk_index,
            )
        });
    }
    ordered
}

fn render(ordered: &[&Selected], document_order: bool) -> String {
    let mut out = String::new();
    let mut prev: Option<&Chunk> = None;
    for s in ordered {
        let chunk = &s.chunk;
        let adjacent = document_order
            && prev.is_some_and(|p| {
                p.document_id == chunk.document_id && p.chunk_index + 1 == chunk.chunk_index
            });
        if adjacent {
            out.push_str(chunk.own_text());
        } else {
            if prev.is_some() {
                out.push_str(CHUNK_SEPARATOR);
            }
            out.push_str(&chunk.text);
        }
        prev = Some(chunk);
    }
    out
}
