//! # handwrite
//!
//! Batch-convert scanned or photographed handwritten notes into Markdown
//! using the Gemini vision model.
//!
//! ## Why this crate?
//!
//! Classic OCR engines are trained on print and fall apart on handwriting:
//! slanted lines, crossed-out words, marginal arrows and inline formulae all
//! come out as noise. A vision model reads a page the way a person does and
//! can emit Markdown with LaTeX maths directly. This crate wraps that in a
//! batch pipeline: every page of every document is transcribed, the pages
//! are merged in order, and the result is rendered through a user template.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG
//!  │
//!  ├─ 1. Extract     rasterise PDF pages via pdfium, or load the image
//!  ├─ 2. Dispatch    one task per page, bounded concurrency
//!  │     ├─ Encode      page → base64 PNG
//!  │     ├─ Transcribe  Gemini vision call
//!  │     └─ Clean       strip fences, normalise whitespace
//!  ├─ 3. Merge       pages in order, "\n\n" between pages
//!  └─ 4. Render      template → encoding → <name>.md
//! ```
//!
//! A page that fails is replaced by `Error processing page N: ...` and the
//! document carries on; a document that fails is counted and the batch
//! carries on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use handwrite::{process, Config, GeminiTranscriber, PageTranscriber};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default(None)?;
//!     let transcriber: Arc<dyn PageTranscriber> =
//!         Arc::new(GeminiTranscriber::from_env(&config.gemini.model)?);
//!     let summary = process(Path::new("scans/"), Path::new("notes/"), &config, transcriber, None).await?;
//!     eprintln!("{} ok, {} failed", summary.success_count(), summary.failure_count());
//!     std::process::exit(summary.exit_code() as i32);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `handwrite` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! handwrite = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    api_key_from_env, default_config_path, setup_default_config, setup_default_config_at, Config,
    ConfigBuilder, SetupOutcome,
};
pub use error::{DocumentError, HandwriteError, PageError, TranscribeError};
pub use output::{BatchSummary, DocumentReport, PageTranscription};
pub use pipeline::extract::{extract_pages, Page};
pub use pipeline::transcribe::{GeminiTranscriber, PageTranscriber};
pub use process::{discover_documents, process, process_document, run_batch, BatchPlan};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
