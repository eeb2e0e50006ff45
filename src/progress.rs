//! Progress-callback trait for batch, document and page events.
//!
//! Pass a [`ProgressCallback`] to [`crate::process::run_batch`] to receive
//! events as documents are processed and their pages are transcribed. The
//! CLI forwards them to an `indicatif` progress bar; tests count them.
//!
//! # Example
//!
//! ```rust
//! use handwrite::BatchProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl BatchProgressCallback for PageCounter {
//!     fn on_page_complete(&self, _page_num: usize, completed: usize, total_pages: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{completed}/{total_pages} pages transcribed");
//!     }
//! }
//! ```

use crate::error::DocumentError;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it works through a batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Page events are emitted by the collector as page tasks complete, in
/// completion order (not page order). Implementations must be `Send + Sync`
/// and protect shared mutable state themselves.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once with the number of documents about to be processed.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before a document is opened.
    ///
    /// # Arguments
    /// * `position`       : 1-indexed position of this document in the batch
    /// * `total_documents`: number of documents in the batch
    fn on_document_start(&self, path: &Path, position: usize, total_documents: usize) {
        let _ = (path, position, total_documents);
    }

    /// Called once the document's pages are extracted, before transcription.
    fn on_pages_extracted(&self, path: &Path, page_count: usize) {
        let _ = (path, page_count);
    }

    /// Called when a page transcription succeeds.
    ///
    /// # Arguments
    /// * `page_num`   : 1-indexed page number
    /// * `completed`  : pages finished so far (success or failure)
    /// * `total_pages`: pages in the document
    fn on_page_complete(&self, page_num: usize, completed: usize, total_pages: usize) {
        let _ = (page_num, completed, total_pages);
    }

    /// Called when a page fails and is replaced by a placeholder.
    fn on_page_error(&self, page_num: usize, completed: usize, total_pages: usize, error: &str) {
        let _ = (page_num, completed, total_pages, error);
    }

    /// Called after a document either produced `output` or failed.
    fn on_document_complete(&self, path: &Path, outcome: Result<&Path, &DocumentError>) {
        let _ = (path, outcome);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, succeeded: usize, failed: usize) {
        let _ = (succeeded, failed);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Shared handle stored and passed through the pipeline.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

/// The callback to use when the caller passed none.
pub(crate) fn or_noop(progress: Option<ProgressCallback>) -> ProgressCallback {
    progress.unwrap_or_else(|| Arc::new(NoopProgressCallback))
}
