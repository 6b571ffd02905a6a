//! Embedding trait, the built-in term-frequency embedder, and similarity
//! metrics.
//!
//! The same [`Embedder`] instance must be used for indexing chunks and for
//! embedding queries; the context assembler takes it as a parameter for
//! exactly that reason.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Trait for embedding backends.
///
/// Implementations must be deterministic: equal inputs yield bit-identical
/// vectors of length [`dims`](Embedder::dims).
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"term-frequency-v1"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a single text.
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Words too common to carry meaning for retrieval.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "into", "is", "it", "its", "of", "on", "or", "that", "the", "their", "this", "to", "was",
    "were", "which", "with",
];

/// Hashed, sublinear term-frequency embedding.
///
/// Each term is hashed (SHA-256) into one of `dims` buckets; bucket weights
/// are `1 + ln(tf)` and the vector is L2-normalized. Texts without any
/// usable term embed to the zero vector.
#[derive(Debug, Clone)]
pub struct TermFrequencyEmbedder {
    dims: usize,
}

impl TermFrequencyEmbedder {
    pub const MODEL_NAME: &'static str = "term-frequency-v1";

    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for TermFrequencyEmbedder {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Embedder for TermFrequencyEmbedder {
    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        // BTreeMap keeps accumulation order fixed, so float sums are reproducible.
        let mut tf: BTreeMap<String, u32> = BTreeMap::new();
        for term in tokenize(text) {
            *tf.entry(term).or_insert(0) += 1;
        }

        let mut v = vec![0f32; self.dims];
        for (term, count) in &tf {
            let bucket = (term_hash(term) % self.dims as u64) as usize;
            v[bucket] += 1.0 + (*count as f32).ln();
        }
        l2_normalize_in_place(&mut v);
        v
    }
}

/// Lowercased alphanumeric terms, minus stopwords and single characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

fn term_hash(term: &str) -> u64 {
    let digest = Sha256::digest(term.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

pub fn l2_normalize_in_place(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Similarity metric used by a vector store. Higher is always more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    /// Euclidean distance mapped to `1 / (1 + d)`.
    Euclidean,
    #[serde(rename = "dot", alias = "dot_product")]
    DotProduct,
}

impl SimilarityMetric {
    /// Score two vectors. Mismatched or empty vectors score `0.0`.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        match self {
            SimilarityMetric::Cosine => cosine_similarity(a, b),
            SimilarityMetric::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
            SimilarityMetric::DotProduct => dot_product(a, b),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::Euclidean => "euclidean",
            SimilarityMetric::DotProduct => "dot",
        };
        f.write_str(name)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
