//! Batch orchestration: find documents, convert each, tally the results.
//!
//! Documents are processed one after another; the concurrency lives inside
//! a document, where its pages are transcribed in parallel. A failing
//! document is logged, counted and skipped. Only problems that make the
//! whole run pointless (missing input, nothing to process, missing output
//! directory) abort before any work starts.

use crate::config::Config;
use crate::error::{DocumentError, HandwriteError};
use crate::output::{BatchSummary, DocumentReport};
use crate::pipeline::{dispatch, extract, render};
use crate::pipeline::transcribe::PageTranscriber;
use crate::progress::{or_noop, ProgressCallback};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// File extensions picked up from an input directory (case-insensitive).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

/// Whether `path` has one of [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// The documents a run will process.
///
/// A single file is returned as-is, supported or not; the extractor then
/// rejects it as a per-document failure. A directory is walked recursively
/// and only supported files are kept, sorted by path.
pub fn discover_documents(input: &Path) -> Result<Vec<PathBuf>, HandwriteError> {
    if !input.exists() {
        return Err(HandwriteError::InputNotFound {
            path: input.to_path_buf(),
        });
    }
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut found = Vec::new();
    walk(input, &mut found, true)?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>, is_root: bool) -> Result<(), HandwriteError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if is_root => {
            return Err(HandwriteError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        }
        Err(e) => {
            warn!("Skipping unreadable directory {}: {}", dir.display(), e);
            return Ok(());
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, found, false)?;
        } else if path.is_file() && is_supported(&path) {
            found.push(path);
        }
    }
    Ok(())
}

/// A validated batch: documents to process and where to put the output.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub documents: Vec<PathBuf>,
    pub output_dir: PathBuf,
}

impl BatchPlan {
    /// Resolve `input` to a document list and check `output_dir`.
    ///
    /// # Errors
    /// Checked in this order:
    /// - [`HandwriteError::InputNotFound`]
    /// - [`HandwriteError::NoSupportedFiles`] for a directory with no PDF,
    ///   PNG or JPEG files
    /// - [`HandwriteError::OutputDirNotFound`]; the directory is never
    ///   created implicitly
    pub fn prepare(input: &Path, output_dir: &Path) -> Result<Self, HandwriteError> {
        let documents = discover_documents(input)?;
        if documents.is_empty() {
            return Err(HandwriteError::NoSupportedFiles {
                path: input.to_path_buf(),
            });
        }
        if !output_dir.is_dir() {
            return Err(HandwriteError::OutputDirNotFound {
                path: output_dir.to_path_buf(),
            });
        }
        info!(
            "Found {} document(s) under {}",
            documents.len(),
            input.display()
        );
        Ok(Self {
            documents,
            output_dir: output_dir.to_path_buf(),
        })
    }
}

/// Convert one document into `<output_dir>/<stem>.md`.
///
/// Failed pages do not fail the document; they show up as placeholders in
/// the text. The document fails only when it cannot be read, when the
/// merged text is blank, or when rendering/writing the output fails. No
/// file is written in any of those cases.
pub async fn process_document(
    path: &Path,
    output_dir: &Path,
    config: &Config,
    transcriber: &Arc<dyn PageTranscriber>,
    progress: &ProgressCallback,
) -> Result<DocumentReport, DocumentError> {
    let start = Instant::now();

    let pages = extract::extract_pages(path).await?;
    let page_count = pages.len();
    progress.on_pages_extracted(path, page_count);

    let transcriptions =
        dispatch::transcribe_pages(transcriber, pages, &config.gemini.prompt, progress).await;
    let failed_pages = transcriptions.iter().filter(|t| !t.is_success()).count();

    let content = render::merge_pages(&transcriptions);
    if content.trim().is_empty() {
        return Err(DocumentError::EmptyTranscription {
            path: path.to_path_buf(),
        });
    }

    let output = render::output_path_for(path, output_dir);
    let ctx = render::RenderContext::new(
        content,
        path,
        output_dir,
        page_count,
        transcriber.model(),
    )
    .with_variables(&config.template.variables);
    render::render_document(
        &ctx,
        &config.template_path(),
        config.uses_default_template(),
        &output,
        &config.output.encoding,
    )?;

    info!(
        "Saved {} ({} page(s), {} failed, {:.1}s)",
        output.display(),
        page_count,
        failed_pages,
        start.elapsed().as_secs_f64()
    );

    Ok(DocumentReport {
        source: path.to_path_buf(),
        output,
        page_count,
        failed_pages,
    })
}

/// Process every document in `plan`, one at a time.
pub async fn run_batch(
    plan: &BatchPlan,
    config: &Config,
    transcriber: Arc<dyn PageTranscriber>,
    progress: Option<ProgressCallback>,
) -> BatchSummary {
    let progress = or_noop(progress);
    let total = plan.documents.len();
    progress.on_batch_start(total);

    let mut summary = BatchSummary::default();
    for (i, path) in plan.documents.iter().enumerate() {
        info!("Processing {} ({}/{})", path.display(), i + 1, total);
        progress.on_document_start(path, i + 1, total);

        match process_document(path, &plan.output_dir, config, &transcriber, &progress).await {
            Ok(report) => {
                progress.on_document_complete(path, Ok(&report.output));
                summary.succeeded.push(report);
            }
            Err(e) => {
                warn!("Failed to process {}: {}", path.display(), e);
                progress.on_document_complete(path, Err(&e));
                summary.failed.push((path.clone(), e));
            }
        }
    }

    info!(
        "Processing complete: {} successful, {} failed",
        summary.success_count(),
        summary.failure_count()
    );
    progress.on_batch_complete(summary.success_count(), summary.failure_count());
    summary
}

/// Validate the paths and run the whole batch.
///
/// Returns `Err` only for the fatal setup errors of [`BatchPlan::prepare`];
/// per-document failures are reported in the [`BatchSummary`].
pub async fn process(
    input: &Path,
    output_dir: &Path,
    config: &Config,
    transcriber: Arc<dyn PageTranscriber>,
    progress: Option<ProgressCallback>,
) -> Result<BatchSummary, HandwriteError> {
    let plan = BatchPlan::prepare(input, output_dir)?;
    Ok(run_batch(&plan, config, transcriber, progress).await)
}
