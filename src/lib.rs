//! # Large File Intelligence
//!
//! Turns large uploaded files into retrievable context for language models.
//!
//! Files are decoded to text, split into bounded overlapping chunks, embedded
//! and indexed in a vector store. Queries are answered with a context window
//! of the most relevant chunks, assembled to fit a character budget.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────┐
//! │ InputFile │──▶│ Extract+Chunk│──▶│ VectorStore  │
//! │ PDF/DOCX/ │   │ Embed (batch)│   │ (in-memory)  │
//! │ text      │   └──────────────┘   └──────┬───────┘
//! └───────────┘                             │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │  query   │        │  stream  │
//!                 │ (context)│        │ (ranked) │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! The algorithms (chunking, embedding, vector store trait, context
//! assembly) live in the `large-file-intel-core` crate; this crate adds
//! configuration, file extraction, progress reporting, the orchestrator and
//! the `lfi` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | MIME detection and text extraction |
//! | [`progress`] | Per-file progress events and reporters |
//! | [`intel`] | The processing and query orchestrator |
//! | [`error`] | Processing failures |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod error;
pub mod extract;
pub mod intel;
pub mod progress;

pub use error::{FailureKind, ProcessingError};
pub use intel::{InputFile, LargeFileIntelligence, ProcessOptions, ProcessingResult, QueryResult};
