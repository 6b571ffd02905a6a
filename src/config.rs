//! TOML configuration.
//!
//! Every section and field is optional; omitted values fall back to the
//! defaults below. [`load_config`] parses and validates in one step.
//!
//! ```toml
//! [chunking]
//! max_chunk_size = 4000
//! overlap_size = 200
//! semantic_boundaries = true
//! max_chunks_per_document = 1000
//!
//! [retrieval]
//! vector_store_type = "memory"
//! dimensions = 100
//! similarity_metric = "cosine"   # cosine | euclidean | dot
//!
//! [processing]
//! enable_vector_store = true
//! enable_streaming = true
//! batch_size = 10
//! max_concurrent_files = 5
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use large_file_intel_core::assemble::AssembleOptions;
use large_file_intel_core::chunk::ChunkingConfig;
use large_file_intel_core::embedding::SimilarityMetric;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_store_type")]
    pub vector_store_type: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default)]
    pub similarity_metric: SimilarityMetric,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default)]
    pub include_neighbors: bool,
    #[serde(default = "default_max_context_size")]
    pub max_context_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_store_type: default_vector_store_type(),
            dimensions: default_dimensions(),
            similarity_metric: SimilarityMetric::default(),
            max_chunks: default_max_chunks(),
            similarity_threshold: default_similarity_threshold(),
            include_neighbors: false,
            max_context_size: default_max_context_size(),
        }
    }
}

fn default_vector_store_type() -> String {
    "memory".to_string()
}
fn default_dimensions() -> usize {
    100
}
fn default_max_chunks() -> usize {
    AssembleOptions::default().max_chunks
}
fn default_similarity_threshold() -> f32 {
    AssembleOptions::default().similarity_threshold
}
fn default_max_context_size() -> usize {
    AssembleOptions::default().max_context_size
}

impl RetrievalConfig {
    /// Per-query defaults derived from this section.
    pub fn assemble_options(&self) -> AssembleOptions {
        AssembleOptions {
            max_chunks: self.max_chunks,
            similarity_threshold: self.similarity_threshold,
            include_neighbors: self.include_neighbors,
            max_context_size: self.max_context_size,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    #[serde(default = "default_true")]
    pub enable_vector_store: bool,
    #[serde(default = "default_true")]
    pub enable_streaming: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
    /// Uploads larger than this many bytes are rejected.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            enable_vector_store: true,
            enable_streaming: true,
            batch_size: default_batch_size(),
            max_concurrent_files: default_max_concurrent_files(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_batch_size() -> usize {
    10
}
fn default_max_concurrent_files() -> usize {
    5
}
fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.chunking
            .validate()
            .map_err(|e| anyhow::anyhow!("chunking: {}", e))?;

        match self.retrieval.vector_store_type.as_str() {
            "memory" => {}
            other => bail!(
                "Unknown retrieval.vector_store_type: '{}'. Supported: memory.",
                other
            ),
        }
        if self.retrieval.dimensions == 0 {
            bail!("retrieval.dimensions must be > 0");
        }
        if self.retrieval.max_chunks == 0 {
            bail!("retrieval.max_chunks must be >= 1");
        }
        if !self.retrieval.similarity_threshold.is_finite() {
            bail!("retrieval.similarity_threshold must be a finite number");
        }

        if self.processing.batch_size == 0 {
            bail!("processing.batch_size must be >= 1");
        }
        if self.processing.max_concurrent_files == 0 {
            bail!("processing.max_concurrent_files must be >= 1");
        }
        if self.processing.max_file_size == 0 {
            bail!("processing.max_file_size must be > 0");
        }

        Ok(())
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
