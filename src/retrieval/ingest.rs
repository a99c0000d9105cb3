//! Bulk ingestion outcome and cooperative cancellation

use crate::index::VectorStoreError;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Why a single file could not be ingested
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("File could not be read as UTF-8 text")]
    Unreadable,

    #[error("Vector store rejected the file: {0}")]
    VectorStore(#[from] VectorStoreError),
}

/// A file that was skipped during bulk ingestion
#[derive(Debug)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub error: IngestError,
}

/// Per-file result of a bulk ingestion run
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Files indexed, with the number of chunks each produced
    pub indexed: Vec<(PathBuf, usize)>,
    pub failures: Vec<IngestFailure>,
    /// The run stopped early because its token was cancelled
    pub cancelled: bool,
}

impl IngestReport {
    pub fn total_chunks(&self) -> usize {
        self.indexed.iter().map(|(_, chunks)| chunks).sum()
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }

    /// Serializable summary for reporting
    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            files_indexed: self.indexed.len(),
            chunks_indexed: self.total_chunks(),
            failures: self
                .failures
                .iter()
                .map(|f| (f.path.display().to_string(), f.error.to_string()))
                .collect(),
            cancelled: self.cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<(String, String)>,
    pub cancelled: bool,
}

/// Shared flag checked between files of a bulk run
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shared_between_clones() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_report_summary() {
        let report = IngestReport {
            indexed: vec![(PathBuf::from("a.md"), 3), (PathBuf::from("b.md"), 2)],
            failures: vec![IngestFailure {
                path: PathBuf::from("c.md"),
                error: IngestError::Unreadable,
            }],
            cancelled: false,
        };

        assert_eq!(report.total_chunks(), 5);
        assert!(!report.is_complete());
        let summary = report.summary();
        assert_eq!(summary.files_indexed, 2);
        assert_eq!(summary.failures[0].0, "c.md");
    }
}
