//! Pipeline stages for turning one document into one Markdown file.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the OCR backend can be swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ encode ──▶ transcribe ──▶ postprocess ──▶ render
//! (pdfium)   (base64)    (Gemini)       (cleanup)       (template)
//!               └──────── dispatch (one task per page) ───┘
//! ```
//!
//! 1. [`extract`]    : rasterise PDF pages or load a PNG/JPEG; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 2. [`encode`]     : PNG-encode and base64-wrap each page image
//! 3. [`transcribe`] : the [`transcribe::PageTranscriber`] seam and its
//!    Gemini implementation; the only stage with network I/O
//! 4. [`postprocess`]: deterministic cleanup of model output
//! 5. [`dispatch`]   : concurrent per-page fan-out with ordered collection
//! 6. [`render`]     : merge pages, fill the template, encode and write

pub mod dispatch;
pub mod encode;
pub mod extract;
pub mod postprocess;
pub mod render;
pub mod transcribe;
