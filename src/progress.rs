//! File-processing progress reporting.
//!
//! Each file moves through `queued -> chunking -> indexing -> done`, with a
//! fraction in `[0, 1]` for the active stage. Reporters used by the CLI write
//! to **stderr** so stdout stays parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;

/// Stage of the processing pipeline a file is in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for a concurrency slot.
    Queued,
    Chunking,
    /// Embedding chunks and staging them for the vector store.
    Indexing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Chunking => "chunking",
            Stage::Indexing => "indexing",
            Stage::Done => "done",
        }
    }
}

/// A single progress event for one file.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub file_name: String,
    /// Known once the file content has been extracted.
    pub document_id: Option<String>,
    pub stage: Stage,
    /// Fraction of the current stage completed, in `[0, 1]`.
    pub progress: f64,
}

/// Receives progress events. Called from the processing pipeline, possibly
/// from a blocking worker thread.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

impl<F> ProgressReporter for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn report(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Human-friendly progress on stderr: "process report.md  chunking  45%".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: &ProgressEvent) {
        let line = match event.stage {
            Stage::Queued => format!("process {}  queued\n", event.file_name),
            Stage::Done => format!("process {}  done\n", event.file_name),
            stage => format!(
                "process {}  {}  {}\n",
                event.file_name,
                stage.as_str(),
                format_percent(event.progress)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: &ProgressEvent) {
        let obj = serde_json::json!({
            "event": "progress",
            "file": event.file_name,
            "documentId": event.document_id,
            "stage": event.stage,
            "progress": event.progress,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

fn format_percent(fraction: f64) -> String {
    let pct = (fraction.clamp(0.0, 1.0) * 100.0).round() as u32;
    format!("{:>3}%", pct)
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
