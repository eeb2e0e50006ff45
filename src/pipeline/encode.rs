//! Page encoding: `Page` image → base64 PNG wrapped in `ImageData`.
//!
//! Gemini takes images as inline base64 data inside the JSON request body.
//! PNG is lossless, so thin pen strokes and pencil shading survive the
//! round trip intact; JPEG ringing around strokes hurts transcription.

use crate::error::TranscribeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// MIME type attached to every encoded page.
pub const PAGE_MIME_TYPE: &str = "image/png";

/// Encode a page image as a base64 PNG ready for the vision API.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, TranscribeError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| TranscribeError::Encode(e.to_string()))?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, PAGE_MIME_TYPE).with_detail("high"))
}
