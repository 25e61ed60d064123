//! Error taxonomy for the ingestion → store → index pipeline

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A single malformed record. Logged and skipped by the ingestor.
    #[error("malformed record at {path}:{line} (offset {offset}): {reason}")]
    Parse {
        path: PathBuf,
        line: u64,
        offset: u64,
        reason: String,
    },

    #[error("source unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt header in {path}: {reason}")]
    CorruptHeader { path: PathBuf, reason: String },

    #[error("store write failed: {0}")]
    StoreWrite(#[from] rusqlite::Error),

    #[error("index write failed: {0}")]
    IndexWrite(String),

    #[error("embedding service error: {0}")]
    EmbeddingService(#[from] EmbeddingError),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("report query failed: {0}")]
    ReportQuery(String),
}

impl PipelineError {
    /// Transient errors are retried by the sync controller; everything
    /// else fails the source immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::EmbeddingService(e) => e.is_transient(),
            PipelineError::StoreWrite(_)
            | PipelineError::IndexWrite(_)
            | PipelineError::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Failure reported by an [`Embedder`](crate::embedding::Embedder).
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("expected {expected} dimensions, got {actual}")]
    Dimensions { expected: usize, actual: usize },

    #[error("empty embedding response")]
    Empty,
}

impl EmbeddingError {
    /// Rate limits, server errors and network failures
    pub fn is_transient(&self) -> bool {
        match self {
            EmbeddingError::Http { status, .. } => *status == 429 || *status >= 500,
            EmbeddingError::Request(_) => true,
            _ => false,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PipelineError::IndexWrite("disk full".into()).is_transient());
        assert!(PipelineError::Timeout {
            stage: "embed",
            secs: 5
        }
        .is_transient());
        assert!(PipelineError::EmbeddingService(EmbeddingError::Http {
            status: 503,
            body: String::new(),
        })
        .is_transient());
        assert!(!PipelineError::EmbeddingService(EmbeddingError::Http {
            status: 401,
            body: String::new(),
        })
        .is_transient());
        assert!(!PipelineError::EmbeddingService(EmbeddingError::Disabled).is_transient());
        assert!(!PipelineError::Cancelled.is_transient());
        assert!(!PipelineError::CorruptHeader {
            path: PathBuf::from("a.jsonl"),
            reason: "not json".into(),
        }
        .is_transient());
    }
}
