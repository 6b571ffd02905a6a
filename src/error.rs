//! Errors surfaced by file processing.

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a processing failure, stable for callers that
/// branch on it or serialize it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedFormat,
    SizeExceeded,
    Cancelled,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnsupportedFormat => "unsupported_format",
            FailureKind::SizeExceeded => "size_exceeded",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("unsupported format for {file_name}: {reason}")]
    UnsupportedFormat { file_name: String, reason: String },

    #[error("{file_name} is {size} bytes, above the {limit} byte limit")]
    SizeExceeded {
        file_name: String,
        size: u64,
        limit: u64,
    },

    #[error("processing of {file_name} was cancelled")]
    Cancelled { file_name: String },

    #[error("processing of {file_name} failed: {source:#}")]
    Internal {
        file_name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ProcessingError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProcessingError::UnsupportedFormat { .. } => FailureKind::UnsupportedFormat,
            ProcessingError::SizeExceeded { .. } => FailureKind::SizeExceeded,
            ProcessingError::Cancelled { .. } => FailureKind::Cancelled,
            ProcessingError::Internal { .. } => FailureKind::Internal,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            ProcessingError::UnsupportedFormat { file_name, .. }
            | ProcessingError::SizeExceeded { file_name, .. }
            | ProcessingError::Cancelled { file_name }
            | ProcessingError::Internal { file_name, .. } => file_name,
        }
    }

    pub(crate) fn internal(file_name: &str, source: impl Into<anyhow::Error>) -> Self {
        ProcessingError::Internal {
            file_name: file_name.to_string(),
            source: source.into(),
        }
    }
}
