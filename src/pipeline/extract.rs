//! Page extraction: turn an input document into ordered page images.
//!
//! PDFs are rasterised page by page through pdfium; PNG and JPEG files are
//! decoded as a single page. Both run inside `spawn_blocking` because
//! pdfium and image decoding are CPU-bound and pdfium is not async-safe.
//!
//! ## Resolution
//!
//! Pages render at 150 DPI with the longest edge capped at 2000 px. That is
//! sharp enough for pen strokes while keeping uploads well under the vision
//! API's request size limit.

use crate::error::DocumentError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rendering resolution for PDF pages.
pub const DEFAULT_RENDER_DPI: f32 = 150.0;

/// Cap on either rendered dimension, in pixels.
pub const MAX_RENDERED_PIXELS: i32 = 2000;

/// Environment variable pointing at a pdfium library (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Supported document kinds, inferred from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl DocumentKind {
    /// Classify `path` by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "png" | "jpg" | "jpeg" => Some(DocumentKind::Image),
            _ => None,
        }
    }
}

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-indexed position in the source document.
    pub index: usize,
    pub image: DynamicImage,
}

/// Extract every page of `path` as an image, in source order.
///
/// # Errors
/// - [`DocumentError::UnsupportedType`] for anything but PDF/PNG/JPEG
/// - [`DocumentError::DecodeFailed`] if the file cannot be opened or decoded
/// - [`DocumentError::NoPages`] for a PDF without pages
pub async fn extract_pages(path: &Path) -> Result<Vec<Page>, DocumentError> {
    let kind = DocumentKind::from_path(path).ok_or_else(|| DocumentError::UnsupportedType {
        path: path.to_path_buf(),
        extension: extension_label(path),
    })?;

    let owned = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || match kind {
        DocumentKind::Pdf => render_pdf_blocking(&owned),
        DocumentKind::Image => load_image_blocking(&owned),
    })
    .await
    .map_err(|e| DocumentError::Internal(format!("Extraction task panicked: {}", e)))??;

    if pages.is_empty() {
        return Err(DocumentError::NoPages {
            path: path.to_path_buf(),
        });
    }

    info!("Extracted {} page(s) from {}", pages.len(), path.display());
    Ok(pages)
}

/// Whether a pdfium library can be bound in this environment.
pub fn pdfium_available() -> bool {
    bind_pdfium().is_ok()
}

fn extension_label(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_else(|| "(none)".to_string())
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, the working directory, or the system
/// library search path, in that order.
fn bind_pdfium() -> Result<Pdfium, PdfiumError> {
    let bindings = match std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        Some(raw) => {
            let path = PathBuf::from(raw);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(lib)?
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())?,
    };
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of PDF rasterisation.
fn render_pdf_blocking(path: &Path) -> Result<Vec<Page>, DocumentError> {
    let decode_err = |detail: String| DocumentError::DecodeFailed {
        path: path.to_path_buf(),
        detail,
    };

    let pdfium = bind_pdfium().map_err(|e| decode_err(format!("pdfium unavailable: {:?}", e)))?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| decode_err(format!("{:?}", e)))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(DEFAULT_RENDER_DPI / 72.0)
        .set_maximum_width(MAX_RENDERED_PIXELS)
        .set_maximum_height(MAX_RENDERED_PIXELS);

    let pages = document.pages();
    let mut results = Vec::with_capacity(pages.len() as usize);

    for (index, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| decode_err(format!("page {}: {:?}", index + 1, e)))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        results.push(Page { index, image });
    }

    Ok(results)
}

/// Blocking implementation of raster image loading.
fn load_image_blocking(path: &Path) -> Result<Vec<Page>, DocumentError> {
    let image = image::open(path).map_err(|e| DocumentError::DecodeFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    debug!(
        "Loaded image {} → {}x{} px",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(vec![Page { index: 0, image }])
}
