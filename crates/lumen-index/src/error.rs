//! Error types for lumen-index.

use serde::{Deserialize, Serialize};

/// Errors surfaced by the indexing and query pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Invalid configuration detected at construction time.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// An indexing job for this repository is already in progress.
    #[error("indexing already in progress for {0}")]
    Conflict(String),

    /// The file source returned nothing to index.
    #[error("no indexable files found for {0}")]
    NoFiles(String),

    /// The job was cancelled before it finished.
    #[error("cancelled")]
    Cancelled,

    /// The background indexing task panicked or was aborted.
    #[error("indexing task failed: {0}")]
    Task(String),

    /// Embedding or completion service failure.
    #[error("LLM error: {0}")]
    Llm(#[from] lumen_llm::LlmError),

    /// Vector store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// File source failure.
    #[error("source error: {0}")]
    Source(#[from] SourceError),
}

impl IndexError {
    /// Whether the failure originated in an external collaborator.
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Llm(_) | Self::Store(_) | Self::Source(_))
    }
}

/// Errors raised by a [`crate::store::ChunkStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no indexing status for {0}")]
    UnknownRepository(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("{0}")]
    Backend(String),
}

/// Errors raised by a [`crate::source::FileSource`].
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Structural chunking failure; the chunker degrades to a whole-file chunk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("unbalanced braces near line {line}")]
    Unbalanced { line: usize },

    #[error("unterminated string or comment")]
    Unterminated,

    #[error("span {start}..={end} is outside a file of {lines} lines")]
    SpanOutOfRange {
        start: usize,
        end: usize,
        lines: usize,
    },
}

/// A non-fatal failure recorded on the job instead of aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFailure {
    pub stage: String,
    pub target: String,
    pub message: String,
}

impl PartialFailure {
    #[must_use]
    pub fn new(stage: &str, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            target: target.into(),
            message: message.into(),
        }
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
