//! OCR adapter.
//!
//! The engine is built at most once per adapter, on first use or through an
//! explicit [`OcrAdapter::probe`], on the blocking pool. A failed build is
//! remembered: every later call returns [`OcrOutcome::EngineUnavailable`]
//! without retrying.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusty_tesseract::{Args, Image};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use absorber_shared::{AbsorberError, Capability, Result};

/// Result of recognizing one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrOutcome {
    Text(String),
    NoTextFound,
    EngineUnavailable(String),
    Error(String),
}

/// A synchronous OCR backend. Called from `spawn_blocking`.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, path: &Path) -> std::result::Result<String, String>;
}

/// Tesseract through the `tesseract` CLI.
pub struct TesseractEngine {
    args: Args,
}

impl TesseractEngine {
    /// Fails when no `tesseract` binary answers `--version`.
    pub fn probe() -> Result<Self> {
        let version = rusty_tesseract::get_tesseract_version()
            .map_err(|e| AbsorberError::unavailable("ocr", e.to_string()))?;
        debug!(version = %version.trim(), "tesseract available");
        Ok(Self {
            args: Args::default(),
        })
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, path: &Path) -> std::result::Result<String, String> {
        let image = Image::from_path(path.to_path_buf()).map_err(|e| e.to_string())?;
        rusty_tesseract::image_to_string(&image, &self.args).map_err(|e| e.to_string())
    }
}

type EngineFactory = Arc<dyn Fn() -> Result<Arc<dyn OcrEngine>> + Send + Sync>;

/// Shared, lazily-constructed OCR engine.
pub struct OcrAdapter {
    factory: EngineFactory,
    engine: OnceCell<std::result::Result<Arc<dyn OcrEngine>, String>>,
}

impl OcrAdapter {
    pub fn tesseract() -> Self {
        Self::with_factory(|| Ok(Arc::new(TesseractEngine::probe()?) as Arc<dyn OcrEngine>))
    }

    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn OcrEngine>> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            engine: OnceCell::new(),
        }
    }

    async fn engine(&self) -> &std::result::Result<Arc<dyn OcrEngine>, String> {
        self.engine
            .get_or_init(|| async {
                let factory = self.factory.clone();
                let built = tokio::task::spawn_blocking(move || factory())
                    .await
                    .unwrap_or_else(|e| {
                        Err(AbsorberError::unavailable("ocr", format!("engine setup failed: {e}")))
                    });
                built.map_err(|e| {
                    warn!(error = %e, "OCR engine unavailable");
                    match e {
                        AbsorberError::EngineUnavailable { reason, .. } => reason,
                        other => other.to_string(),
                    }
                })
            })
            .await
    }

    /// Build the engine now and report whether it is usable.
    pub async fn probe(&self) -> Capability {
        match self.engine().await {
            Ok(_) => Capability::Available("tesseract".into()),
            Err(reason) => Capability::Unavailable(reason.clone()),
        }
    }

    pub async fn recognize(&self, path: &Path) -> OcrOutcome {
        let engine = match self.engine().await {
            Ok(engine) => engine.clone(),
            Err(reason) => return OcrOutcome::EngineUnavailable(reason.clone()),
        };
        let path: PathBuf = path.to_path_buf();

        match tokio::task::spawn_blocking(move || engine.recognize(&path)).await {
            Ok(Ok(text)) if text.trim().is_empty() => OcrOutcome::NoTextFound,
            Ok(Ok(text)) => OcrOutcome::Text(text.trim().to_string()),
            Ok(Err(detail)) => OcrOutcome::Error(detail),
            Err(e) => OcrOutcome::Error(format!("OCR task failed: {e}")),
        }
    }
}

/// File extension for raster bytes, from their magic number.
pub fn sniff_image_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.starts_with(b"RIFF") && bytes.len() > 12 && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else if bytes.starts_with(b"BM") {
        Some("bmp")
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        Some("tif")
    } else if bytes.starts_with(&[0x00, 0x00, 0x00, 0x0C, b'j', b'P'])
        || bytes.starts_with(&[0xFF, 0x4F, 0xFF, 0x51])
    {
        Some("jp2")
    } else {
        None
    }
}
