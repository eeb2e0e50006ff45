//! Error types for the handwrite library.
//!
//! Three error types mirror the three failure scopes of a run:
//!
//! * [`HandwriteError`]: **Fatal**: the run cannot start at all (missing
//!   input, no supported files, missing output directory, no API key,
//!   unreadable config). Returned before any document is processed.
//!
//! * [`DocumentError`]: **Per document**: one input could not be turned
//!   into a Markdown file (unsupported type, decode failure, empty
//!   transcription, template failure). The batch logs it, counts the
//!   document as failed, and moves on.
//!
//! * [`PageError`]: **Per page**: one page could not be transcribed. The
//!   page's text is replaced by an inline placeholder and the document
//!   carries on; it only fails if the merged text ends up empty.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort the whole run before any document is processed.
#[derive(Debug, Error)]
pub enum HandwriteError {
    // ── Input / output paths ──────────────────────────────────────────────
    /// The input path does not exist.
    #[error("Input path not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// The input directory contains no PDF, PNG or JPEG files.
    #[error("No supported files found in directory '{path}'\nSupported extensions: .pdf, .png, .jpg, .jpeg")]
    NoSupportedFiles { path: PathBuf },

    /// The output directory does not exist (it is never created implicitly).
    #[error("Output directory not found: '{path}'")]
    OutputDirNotFound { path: PathBuf },

    // ── OCR provider ──────────────────────────────────────────────────────
    /// `GEMINI_API_KEY` is not set in the environment or a local `.env` file.
    #[error("GEMINI_API_KEY not found in environment variables or .env file\nGet a key from https://aistudio.google.com/ and export GEMINI_API_KEY=...")]
    MissingApiKey,

    // ── Config ────────────────────────────────────────────────────────────
    /// The config file exists but could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML or has the wrong shape.
    #[error("Failed to parse config file '{path}': {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    /// The default config file could not be written.
    #[error("Failed to write config file '{path}': {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config values failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No home directory could be determined for the default config path.
    #[error("Could not determine the user's home directory for the default config path")]
    NoConfigDir,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected I/O failure while preparing the run.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A recoverable failure of a single document.
///
/// Failed documents leave no output file and are tallied in
/// [`crate::output::BatchSummary`].
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The file extension is not one of `.pdf`, `.png`, `.jpg`, `.jpeg`.
    #[error("Unsupported file type: '{extension}' ({path})")]
    UnsupportedType { path: PathBuf, extension: String },

    /// The PDF or image could not be opened or decoded.
    #[error("Failed to decode '{path}': {detail}")]
    DecodeFailed { path: PathBuf, detail: String },

    /// The document decoded but contains no pages.
    #[error("No pages could be extracted from '{path}'")]
    NoPages { path: PathBuf },

    /// Every page came back empty or whitespace-only.
    #[error("No text extracted from '{path}'")]
    EmptyTranscription { path: PathBuf },

    /// The configured template file does not exist.
    #[error("Template file not found: '{path}'")]
    TemplateNotFound { path: PathBuf },

    /// The template could not be read, parsed or rendered.
    #[error("Failed to render template '{path}': {detail}")]
    TemplateRender { path: PathBuf, detail: String },

    /// `output.encoding` is not a known encoding label.
    #[error("Unsupported output encoding '{label}'")]
    UnsupportedEncoding { label: String },

    /// The rendered text contains characters the output encoding cannot represent.
    #[error("Rendered text cannot be represented in encoding '{label}'")]
    EncodingFailed { label: String },

    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// A transcriber failure and a crashed page task are the same thing to the
/// rest of the pipeline: the page's text becomes the [`Display`] of this
/// error and the document continues.
///
/// [`Display`]: std::fmt::Display
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The OCR model call failed (network, auth, quota, image encoding).
    #[error("Error processing page {page}: {detail}")]
    TranscriptionFailed { page: usize, detail: String },

    /// The page task itself panicked or was cancelled.
    #[error("Error processing page {page}: task failed: {detail}")]
    TaskFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::TranscriptionFailed { page, .. } | PageError::TaskFailed { page, .. } => {
                *page
            }
        }
    }
}

/// Failure of a single call to the OCR model.
#[derive(Debug, Clone, Error)]
pub enum TranscribeError {
    /// The provider returned an error (HTTP, auth, quota, malformed response).
    #[error("{0}")]
    Provider(String),

    /// The page image could not be encoded for upload.
    #[error("image encoding failed: {0}")]
    Encode(String),
}
