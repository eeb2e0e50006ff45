//! Result types produced by the pipeline.

use crate::error::{DocumentError, PageError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Transcription of a single page.
///
/// `text` is always set: the model's output on success, or the error
/// placeholder (`Error processing page N: ...`) on failure. `error` tells
/// the two apart for callers that care.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTranscription {
    /// 0-indexed page position in the source document.
    pub index: usize,
    /// Transcribed text, or the placeholder for a failed page.
    pub text: String,
    /// Set when the page failed.
    pub error: Option<PageError>,
}

impl PageTranscription {
    pub fn success(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            error: None,
        }
    }

    /// A failed page whose text is the error's placeholder.
    pub fn failed(index: usize, error: PageError) -> Self {
        Self {
            index,
            text: error.to_string(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A document that was turned into a Markdown file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    /// Input document.
    pub source: PathBuf,
    /// Markdown file written.
    pub output: PathBuf,
    /// Pages extracted from the source.
    pub page_count: usize,
    /// Pages replaced by an error placeholder.
    pub failed_pages: usize,
}

/// Outcome of a whole batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Documents that produced an output file.
    pub succeeded: Vec<DocumentReport>,
    /// Documents that failed, with the reason.
    pub failed: Vec<(PathBuf, DocumentError)>,
}

impl BatchSummary {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// Process exit status: 0 if every document succeeded, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.failed.is_empty() {
            0
        } else {
            1
        }
    }
}
