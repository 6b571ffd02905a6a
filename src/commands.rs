//! CLI command implementations.
//!
//! Each `run_*` function drives [`LargeFileIntelligence`] and prints to
//! stdout, either human-readable or as JSON. Progress and logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use futures::{pin_mut, StreamExt};

use large_file_intel_core::assemble::AssembleOptions;

use crate::config::Config;
use crate::intel::{InputFile, LargeFileIntelligence, ProcessOptions, ProcessingResult};
use crate::progress::ProgressReporter;

/// Query flags shared by `query` and `stream`.
#[derive(Debug, Clone, Default)]
pub struct QueryOverrides {
    pub max_chunks: Option<usize>,
    pub threshold: Option<f32>,
    pub neighbors: bool,
    pub max_context_size: Option<usize>,
}

impl QueryOverrides {
    pub fn apply(&self, mut opts: AssembleOptions) -> AssembleOptions {
        if let Some(k) = self.max_chunks {
            opts.max_chunks = k;
        }
        if let Some(t) = self.threshold {
            opts.similarity_threshold = t;
        }
        if self.neighbors {
            opts.include_neighbors = true;
        }
        if let Some(size) = self.max_context_size {
            opts.max_context_size = size;
        }
        opts
    }
}

/// `lfi chunk <file>`: chunk a single file and print the summary (no indexing).
pub async fn run_chunk(
    config: &Config,
    path: &Path,
    reporter: Arc<dyn ProgressReporter>,
    json: bool,
) -> Result<()> {
    let intel = LargeFileIntelligence::new(config.clone())?;
    let file = InputFile::from_path(path).await?;
    let opts = ProcessOptions::default().with_reporter(reporter);
    let (doc, result) = match intel.chunk_file(file, opts).await {
        Ok(chunked) => chunked,
        Err(e) => bail!("[{}] {}", e.kind().as_str(), e),
    };

    if json {
        let out = serde_json::json!({
            "documentId": doc.id,
            "fileName": doc.file_name,
            "mimeType": doc.mime_type,
            "chunkingResult": result,
            "chunks": result.chunks,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("chunk {}", doc.file_name);
    println!("  document:     {}", doc.id);
    println!("  mime type:    {}", doc.mime_type);
    println!("  total chunks: {}", result.total_chunks);
    println!("  words:        {}", result.total_words);
    println!("  characters:   {}", result.total_chars);
    if let Some(at) = result.truncated_at {
        println!("  truncated:    yes (at byte {})", at);
    } else {
        println!("  truncated:    no");
    }
    for chunk in &result.chunks {
        let heading = chunk.heading.as_deref().unwrap_or("-");
        println!(
            "  #{:<4} bytes {}..{}  {} words  {}",
            chunk.chunk_index, chunk.start, chunk.end, chunk.word_count, heading
        );
    }
    Ok(())
}

/// Process every path concurrently. Fails if any file failed.
async fn ingest_paths(
    intel: &LargeFileIntelligence,
    paths: &[PathBuf],
    reporter: Arc<dyn ProgressReporter>,
) -> Result<Vec<ProcessingResult>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(InputFile::from_path(path).await?);
    }
    let opts = ProcessOptions::default().with_reporter(reporter);
    let mut processed = Vec::with_capacity(files.len());
    let mut failed = 0usize;
    for outcome in intel.process_files(files, opts).await {
        match outcome {
            Ok(result) => processed.push(result),
            Err(e) => {
                failed += 1;
                eprintln!("error [{}]: {}", e.kind().as_str(), e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} files failed", failed, paths.len());
    }
    Ok(processed)
}

/// `lfi ingest <files...>`: process files and print per-file results.
pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    reporter: Arc<dyn ProgressReporter>,
    json: bool,
) -> Result<()> {
    let intel = LargeFileIntelligence::new(config.clone())?;
    let results = ingest_paths(&intel, paths, reporter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    for r in &results {
        println!(
            "{}  {}  {:?}  chunks: {}  words: {}  indexed: {}",
            r.document_id,
            r.file_name,
            r.status,
            r.chunking_result.total_chunks,
            r.chunking_result.total_words,
            r.indexed_entries
        );
    }
    let stats = intel.stats().await?;
    println!(
        "ok: {} documents, {} index entries ({} / {} dims / {})",
        stats.documents,
        stats.indexed_entries,
        stats.embedding_model,
        stats.dimensions,
        stats.similarity_metric
    );
    Ok(())
}

/// `lfi query <query> --file ...`: ingest the files, then assemble a context.
pub async fn run_query(
    config: &Config,
    query: &str,
    paths: &[PathBuf],
    overrides: &QueryOverrides,
    reporter: Arc<dyn ProgressReporter>,
    json: bool,
) -> Result<()> {
    let intel = LargeFileIntelligence::new(config.clone())?;
    let results = ingest_paths(&intel, paths, reporter).await?;
    let ids: Vec<String> = results.into_iter().map(|r| r.document_id).collect();
    let opts = overrides.apply(intel.default_query_options());
    let result = intel.query(query, &ids, &opts).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    if result.context.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for c in &result.context.chunks {
        println!(
            "{:.4}  {} #{}{}",
            c.score,
            c.document_id,
            c.chunk_index,
            if c.neighbor { "  (neighbor)" } else { "" }
        );
    }
    println!("---");
    println!("{}", result.context.text);
    Ok(())
}

/// `lfi stream <query> --file ...`: like `query`, but print hits as they arrive.
pub async fn run_stream(
    config: &Config,
    query: &str,
    paths: &[PathBuf],
    overrides: &QueryOverrides,
    reporter: Arc<dyn ProgressReporter>,
    json: bool,
) -> Result<()> {
    let intel = LargeFileIntelligence::new(config.clone())?;
    let results = ingest_paths(&intel, paths, reporter).await?;
    let ids: Vec<String> = results.into_iter().map(|r| r.document_id).collect();
    let opts = overrides.apply(intel.default_query_options());

    let stream = intel.stream_query(query, &ids, &opts)?;
    pin_mut!(stream);
    let mut seen = 0usize;
    while let Some(item) = stream.next().await {
        let item = item?;
        seen += 1;
        if json {
            println!("{}", serde_json::to_string(&item)?);
        } else {
            println!(
                "[{}/{}] {:.4}  {} #{}",
                item.rank + 1,
                item.total,
                item.score,
                item.document_id,
                item.chunk_index
            );
            println!("{}", item.text);
        }
    }
    if seen == 0 && !json {
        println!("No results.");
    }
    Ok(())
}
