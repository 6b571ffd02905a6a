//! # Large File Intelligence Core
//!
//! Runtime-free logic for the large file intelligence layer: data models,
//! the chunking engine, the embedding trait and built-in term-frequency
//! embedder, the vector store abstraction, and the context assembler.
//!
//! This crate contains no tokio, filesystem I/O, or other native-only
//! dependencies. The async orchestrator that drives it lives in the
//! `large-file-intel` application crate.
//!
//! ```text
//! raw text ─▶ chunk ─▶ embed ─▶ VectorStore ─▶ assemble ─▶ Context
//! ```

pub mod assemble;
pub mod cancel;
pub mod chunk;
pub mod embedding;
pub mod models;
pub mod store;
