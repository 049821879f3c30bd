//! OCR of images pulled out of documents or pages.

use std::path::Path;

use tracing::debug;

use absorber_shared::AbsorberError;

use crate::ocr::{OcrAdapter, OcrOutcome, sniff_image_extension};

/// Wrap recognized text the way it appears in the normalized body.
pub fn ocr_block(text: &str) -> String {
    format!("[IMAGE OCR CONTENT]\n{}\n[/IMAGE OCR CONTENT]", text.trim())
}

/// What one embedded image contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ImageText {
    /// An OCR block ready for the body.
    Block(String),
    /// Below the size policy, or recognised nothing.
    Nothing,
    /// Marker for the unit's slot.
    Failed(String),
}

impl ImageText {
    pub(crate) fn text(&self) -> &str {
        match self {
            Self::Block(s) | Self::Failed(s) => s,
            Self::Nothing => "",
        }
    }
}

/// Spill `bytes` into `dir` and OCR them.
///
/// `stem` must be unique within `dir`. `fallback_ext` is used when the bytes
/// carry no recognizable magic number.
pub(crate) async fn ocr_image_bytes(
    ocr: &OcrAdapter,
    min_image_bytes: Option<u64>,
    dir: &Path,
    stem: &str,
    fallback_ext: &str,
    bytes: &[u8],
) -> ImageText {
    if let Some(min) = min_image_bytes {
        if (bytes.len() as u64) < min {
            debug!(stem, size = bytes.len(), min, "skipping small image");
            return ImageText::Nothing;
        }
    }

    let ext = sniff_image_extension(bytes).unwrap_or(fallback_ext);
    let path = dir.join(format!("{stem}.{ext}"));
    if let Err(e) = tokio::fs::write(&path, bytes).await {
        return ImageText::Failed(AbsorberError::io(&path, e).marker());
    }

    recognize_file(ocr, &path, stem).await
}

/// OCR an image that is already on disk.
async fn recognize_file(ocr: &OcrAdapter, path: &Path, label: &str) -> ImageText {
    match ocr.recognize(path).await {
        OcrOutcome::Text(text) => ImageText::Block(ocr_block(&text)),
        OcrOutcome::NoTextFound => {
            debug!(label, "no text in image");
            ImageText::Nothing
        }
        OcrOutcome::EngineUnavailable(reason) => {
            ImageText::Failed(AbsorberError::unavailable("ocr", reason).marker())
        }
        OcrOutcome::Error(detail) => {
            let error = AbsorberError::Conversion(format!("OCR failed on {label}: {detail}"));
            ImageText::Failed(error.marker())
        }
    }
}
