//! absorber-extract: format detection and normalization of local files and
//! fetched content.
//!
//! [`Extractor`] routes each input to the extractor for its format. PDF pages
//! and embedded images are processed as ordered units on a bounded pool; a
//! failed unit becomes an inline marker in its own position and never aborts
//! the document.

mod cleanup;
mod docx;
mod embedded;
pub mod html;
pub mod kind;
pub mod legacy;
pub mod ocr;
mod pdf;
pub mod text;
pub mod units;

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};
use url::Url;

use absorber_shared::{
    AbsorberError, Capability, DocumentMeta, ExtractConfig, ExtractedDocument, FetchResult,
    ResourceLoader, Result, UnitError, UnitKind, UnitResult,
};

pub use embedded::ocr_block;
pub use html::repair_mojibake;
pub use kind::DocumentKind;
pub use legacy::LegacyDocConverter;
pub use ocr::{OcrAdapter, OcrEngine, OcrOutcome, TesseractEngine};
pub use text::decode_text;
pub use units::run_ordered;

use embedded::{ImageText, ocr_image_bytes};
use pdf::{PdfFile, PdfPage};

/// Routes content to the matching extractor and assembles the normalized
/// document.
pub struct Extractor {
    config: ExtractConfig,
    ocr: Arc<OcrAdapter>,
    legacy: LegacyDocConverter,
    loader: Option<Arc<dyn ResourceLoader>>,
}

/// Body parts and unit records gathered by one extractor.
struct Assembled {
    title: Option<String>,
    author: Option<String>,
    parts: Vec<String>,
    units: Vec<UnitResult>,
    errors: Vec<UnitError>,
}

impl Assembled {
    fn body(parts: Vec<String>) -> Self {
        Self {
            title: None,
            author: None,
            parts,
            units: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl Extractor {
    pub fn new(config: ExtractConfig, ocr: Arc<OcrAdapter>) -> Self {
        let legacy = LegacyDocConverter::new(config.legacy_converter.clone());
        Self {
            config,
            ocr,
            legacy,
            loader: None,
        }
    }

    /// Downloader for images referenced by HTML pages. Page-image OCR is
    /// skipped without one.
    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn ocr(&self) -> &OcrAdapter {
        &self.ocr
    }

    pub fn legacy_converter(&self) -> &LegacyDocConverter {
        &self.legacy
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Extract a local file. Its size is checked before any content is read.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn extract_path(&self, path: &Path) -> Result<ExtractedDocument> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AbsorberError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(AbsorberError::io(path, e)),
        };
        if !meta.is_file() {
            return Err(AbsorberError::UnsupportedFormat(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        self.check_size(meta.len())?;

        let kind = DocumentKind::from_path(path);
        let source = path.display().to_string();
        debug!(?kind, size = meta.len(), "dispatching local file");

        let assembled = match kind {
            DocumentKind::Image => self.extract_image_file(path, &source).await?,
            DocumentKind::LegacyDoc => self.extract_legacy(path).await?,
            _ => {
                let bytes = tokio::fs::read(path).await.map_err(|e| AbsorberError::io(path, e))?;
                self.extract_bytes(kind, bytes, None, None).await?
            }
        };
        Ok(finish(source, assembled))
    }

    /// Extract content acquired by the fetch layer.
    #[instrument(skip_all, fields(url = %fetched.final_url, strategy = %fetched.strategy))]
    pub async fn extract_remote(&self, fetched: FetchResult) -> Result<ExtractedDocument> {
        self.check_size(fetched.body.len() as u64)?;

        let mime = fetched.mime();
        let kind = DocumentKind::for_remote(mime.as_deref(), &fetched.final_url);
        let charset = fetched.charset().map(str::to_string);
        let source = format!("{} ({})", fetched.final_url, fetched.strategy);
        debug!(
            ?kind,
            mime = mime.as_deref().unwrap_or("-"),
            size = fetched.body.len(),
            "dispatching remote content"
        );

        let assembled = self
            .extract_bytes(kind, fetched.body, charset.as_deref(), Some(&fetched.final_url))
            .await?;
        Ok(finish(source, assembled))
    }

    /// Extract an HTML document held in memory.
    pub async fn extract_html(
        &self,
        bytes: &[u8],
        charset: Option<&str>,
        base_url: Option<&Url>,
        source: impl Into<String>,
    ) -> Result<ExtractedDocument> {
        let assembled = self.html_document(bytes, charset, base_url).await?;
        Ok(finish(source.into(), assembled))
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.config.max_bytes {
            return Err(AbsorberError::SizeLimitExceeded {
                size,
                limit: self.config.max_bytes,
            });
        }
        Ok(())
    }

    async fn extract_bytes(
        &self,
        kind: DocumentKind,
        bytes: Vec<u8>,
        charset: Option<&str>,
        base_url: Option<&Url>,
    ) -> Result<Assembled> {
        match kind {
            DocumentKind::Text => Ok(Assembled::body(vec![normalize_text(&decode_text(&bytes)?)])),
            DocumentKind::Html => self.html_document(&bytes, charset, base_url).await,
            DocumentKind::Pdf => self.extract_pdf(bytes).await,
            DocumentKind::Docx => self.extract_docx(bytes).await,
            DocumentKind::Image | DocumentKind::LegacyDoc => {
                self.extract_spilled(kind, bytes).await
            }
            DocumentKind::Unknown => {
                if !text::is_probably_text(&bytes) {
                    return Err(AbsorberError::UnsupportedFormat(
                        "binary content with no recognized format".into(),
                    ));
                }
                Ok(Assembled::body(vec![normalize_text(&decode_text(&bytes)?)]))
            }
        }
    }

    /// Formats that are only handled from disk: write the bytes out first.
    async fn extract_spilled(&self, kind: DocumentKind, bytes: Vec<u8>) -> Result<Assembled> {
        let workdir = scratch_dir()?;
        let ext = match kind {
            DocumentKind::Image => ocr::sniff_image_extension(&bytes).unwrap_or("png"),
            other => other.spill_extension(),
        };
        let path = workdir.path().join(format!("download.{ext}"));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AbsorberError::io(&path, e))?;

        match kind {
            DocumentKind::Image => self.extract_image_file(&path, "downloaded image").await,
            _ => self.extract_legacy(&path).await,
        }
    }

    async fn html_document(
        &self,
        bytes: &[u8],
        charset: Option<&str>,
        base_url: Option<&Url>,
    ) -> Result<Assembled> {
        let decoded = html::decode_html(bytes, charset);
        let page = html::convert(&decoded, base_url)?;

        let mut assembled = Assembled {
            title: page.title,
            author: page.author,
            parts: vec![page.markdown],
            units: Vec::new(),
            errors: Vec::new(),
        };

        if self.config.ocr_page_images && !page.images.is_empty() {
            if let Some(loader) = &self.loader {
                let mut images = page.images;
                images.truncate(self.config.max_page_images);
                let (units, errors) = self.page_image_units(loader.clone(), images).await;
                assembled.parts.extend(units.iter().map(|u| u.text.clone()));
                assembled.units = units;
                assembled.errors = errors;
            }
        }
        Ok(assembled)
    }

    /// Download and OCR images referenced by a page, in page order.
    async fn page_image_units(
        &self,
        loader: Arc<dyn ResourceLoader>,
        images: Vec<Url>,
    ) -> (Vec<UnitResult>, Vec<UnitError>) {
        if let Capability::Unavailable(reason) = self.ocr.probe().await {
            let marker = AbsorberError::unavailable("ocr", reason).marker();
            let label = "page images".to_string();
            return (
                vec![UnitResult {
                    index: 0,
                    kind: UnitKind::Image,
                    label: label.clone(),
                    text: marker.clone(),
                }],
                vec![UnitError {
                    index: 0,
                    label,
                    message: marker,
                }],
            );
        }

        let workdir = match scratch_dir() {
            Ok(dir) => dir,
            Err(e) => {
                let marker = e.marker();
                return (
                    Vec::new(),
                    vec![UnitError {
                        index: 0,
                        label: "page images".into(),
                        message: marker,
                    }],
                );
            }
        };
        let labels: Vec<String> = images.iter().map(Url::to_string).collect();
        let dir = workdir.path().to_path_buf();
        let ocr = self.ocr.clone();
        let min_image_bytes = self.config.min_image_bytes;

        let results = run_ordered(images, self.config.unit_workers, move |index, url| {
            let loader = loader.clone();
            let ocr = ocr.clone();
            let dir = dir.clone();
            async move {
                let bytes = match loader.load(&url).await {
                    Ok(bytes) => bytes,
                    Err(e) => return ImageText::Failed(e.marker()),
                };
                let fallback = url_extension(&url).unwrap_or_else(|| "img".to_string());
                let stem = format!("image-{index}");
                ocr_image_bytes(&ocr, min_image_bytes, &dir, &stem, &fallback, &bytes).await
            }
        })
        .await;

        drop(workdir);
        image_units(labels, results)
    }

    /// OCR a standalone image. Without a working engine the whole input fails.
    async fn extract_image_file(&self, path: &Path, label: &str) -> Result<Assembled> {
        match self.ocr.recognize(path).await {
            OcrOutcome::Text(text) => {
                let block = ocr_block(&text);
                let mut assembled = Assembled::body(vec![block.clone()]);
                assembled.units.push(UnitResult {
                    index: 0,
                    kind: UnitKind::Image,
                    label: label.to_string(),
                    text: block,
                });
                Ok(assembled)
            }
            OcrOutcome::NoTextFound => {
                info!(label, "image contains no recognizable text");
                Ok(Assembled::body(Vec::new()))
            }
            OcrOutcome::EngineUnavailable(reason) => Err(AbsorberError::unavailable("ocr", reason)),
            OcrOutcome::Error(detail) => Err(AbsorberError::Conversion(format!(
                "OCR failed on {label}: {detail}"
            ))),
        }
    }

    async fn extract_pdf(&self, bytes: Vec<u8>) -> Result<Assembled> {
        let file = tokio::task::spawn_blocking(move || PdfFile::load(&bytes))
            .await
            .map_err(|e| AbsorberError::parse(format!("PDF task failed: {e}")))??;
        let file = Arc::new(file);

        let workdir = scratch_dir()?;
        let dir = workdir.path().to_path_buf();
        let pages = file.pages.clone();
        let labels: Vec<String> =
            pages.iter().map(|(number, _)| format!("page {number}")).collect();
        let ocr = self.ocr.clone();
        let min_image_bytes = self.config.min_image_bytes;

        let shared = file.clone();
        let results = run_ordered(pages, self.config.unit_workers, move |_, (number, page_id)| {
            let file = shared.clone();
            let ocr = ocr.clone();
            let dir = dir.clone();
            async move {
                let page = tokio::task::spawn_blocking(move || file.read_page(number, page_id))
                    .await
                    .unwrap_or_else(|e| PdfPage {
                        number,
                        text: Err(format!("page task failed: {e}")),
                        images: Vec::new(),
                    });
                render_pdf_page(&ocr, min_image_bytes, &dir, page).await
            }
        })
        .await;
        drop(workdir);

        let mut units = Vec::with_capacity(labels.len());
        let mut errors = Vec::new();
        for (index, (label, result)) in labels.into_iter().zip(results).enumerate() {
            let text = match result {
                Ok((text, failures)) => {
                    errors.extend(failures.into_iter().map(|message| UnitError {
                        index,
                        label: label.clone(),
                        message,
                    }));
                    text
                }
                Err(panic) => internal_error(&mut errors, index, &label, &panic),
            };
            units.push(UnitResult {
                index,
                kind: UnitKind::Page,
                label,
                text,
            });
        }
        debug!(pages = units.len(), failed = errors.len(), "pdf pages assembled");

        Ok(Assembled {
            title: file.title.clone(),
            author: file.author.clone(),
            parts: units.iter().map(|u| u.text.clone()).collect(),
            units,
            errors,
        })
    }

    async fn extract_docx(&self, bytes: Vec<u8>) -> Result<Assembled> {
        let (text, media) = tokio::task::spawn_blocking(move || -> Result<_> {
            Ok((docx::read_text(&bytes)?, docx::read_media(&bytes)?))
        })
        .await
        .map_err(|e| AbsorberError::parse(format!("DOCX task failed: {e}")))??;

        let title = text
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|t| t.trim().to_string());

        let workdir = scratch_dir()?;
        let dir = workdir.path().to_path_buf();
        let labels: Vec<String> = media.iter().map(|m| m.name.clone()).collect();
        let ocr = self.ocr.clone();
        let min_image_bytes = self.config.min_image_bytes;

        let results = run_ordered(media, self.config.unit_workers, move |index, entry| {
            let ocr = ocr.clone();
            let dir = dir.clone();
            async move {
                let fallback = entry
                    .name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_ascii_lowercase())
                    .unwrap_or_else(|| "img".to_string());
                let stem = format!("media-{index}");
                ocr_image_bytes(&ocr, min_image_bytes, &dir, &stem, &fallback, &entry.bytes).await
            }
        })
        .await;
        drop(workdir);

        let (units, errors) = image_units(labels, results);
        let mut parts = vec![text];
        parts.extend(units.iter().map(|u| u.text.clone()));
        Ok(Assembled {
            title,
            author: None,
            parts,
            units,
            errors,
        })
    }

    async fn extract_legacy(&self, path: &Path) -> Result<Assembled> {
        let workdir = scratch_dir()?;
        let converted = self.legacy.convert(path, workdir.path()).await?;
        let size = tokio::fs::metadata(&converted)
            .await
            .map_err(|e| AbsorberError::io(&converted, e))?
            .len();
        self.check_size(size)?;
        let bytes = tokio::fs::read(&converted)
            .await
            .map_err(|e| AbsorberError::io(&converted, e))?;
        self.extract_docx(bytes).await
    }
}

/// Text of one PDF page plus the markers of anything that failed on it.
async fn render_pdf_page(
    ocr: &OcrAdapter,
    min_image_bytes: Option<u64>,
    dir: &Path,
    page: PdfPage,
) -> (String, Vec<String>) {
    let mut parts = vec![format!("## Page {}", page.number)];
    let mut failures = Vec::new();

    match page.text {
        Ok(text) if !text.is_empty() => parts.push(text),
        Ok(_) => {}
        Err(e) => {
            warn!(page = page.number, error = %e, "page text extraction failed");
            let marker = AbsorberError::parse(format!("page {}: {e}", page.number)).marker();
            parts.push(marker.clone());
            failures.push(marker);
        }
    }

    for (i, image) in page.images.iter().enumerate() {
        let stem = format!("page{}-img{i}", page.number);
        let text =
            ocr_image_bytes(ocr, min_image_bytes, dir, &stem, image.extension, &image.bytes).await;
        match text {
            ImageText::Block(block) => parts.push(block),
            ImageText::Nothing => {}
            ImageText::Failed(marker) => {
                parts.push(marker.clone());
                failures.push(marker);
            }
        }
    }

    (parts.join("\n\n"), failures)
}

fn image_units(
    labels: Vec<String>,
    results: Vec<std::result::Result<ImageText, String>>,
) -> (Vec<UnitResult>, Vec<UnitError>) {
    let mut units = Vec::with_capacity(labels.len());
    let mut errors = Vec::new();
    for (index, (label, result)) in labels.into_iter().zip(results).enumerate() {
        let text = match result {
            Ok(ImageText::Failed(marker)) => {
                errors.push(UnitError {
                    index,
                    label: label.clone(),
                    message: marker.clone(),
                });
                marker
            }
            Ok(other) => other.text().to_string(),
            Err(panic) => internal_error(&mut errors, index, &label, &panic),
        };
        units.push(UnitResult {
            index,
            kind: UnitKind::Image,
            label,
            text,
        });
    }
    (units, errors)
}

fn internal_error(errors: &mut Vec<UnitError>, index: usize, label: &str, panic: &str) -> String {
    let marker = format!("[INTERNAL ERROR: {label}: {panic}]");
    errors.push(UnitError {
        index,
        label: label.to_string(),
        message: marker.clone(),
    });
    marker
}

fn url_extension(url: &Url) -> Option<String> {
    let name = url.path_segments()?.next_back()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5).then(|| ext.to_ascii_lowercase())
}

fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn scratch_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("absorber-")
        .tempdir()
        .map_err(|e| AbsorberError::io(std::env::temp_dir(), e))
}

/// Join the non-empty parts with blank lines and stamp the metadata.
fn finish(source: String, assembled: Assembled) -> ExtractedDocument {
    let joined = assembled
        .parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    let body = if joined.is_empty() { joined } else { joined + "\n" };

    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    ExtractedDocument {
        meta: DocumentMeta {
            title: assembled.title,
            author: assembled.author,
            source,
            processed_at: Utc::now(),
            content_hash,
        },
        body,
        units: assembled.units,
        errors: assembled.errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rand::Rng;

    /// Returns the spilled file's name after a random delay.
    struct EchoName;

    impl OcrEngine for EchoName {
        fn recognize(&self, path: &Path) -> std::result::Result<String, String> {
            let ms = rand::thread_rng().gen_range(0..30);
            std::thread::sleep(Duration::from_millis(ms));
            Ok(format!("saw {}", path.file_name().unwrap().to_string_lossy()))
        }
    }

    struct MapLoader {
        images: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ResourceLoader for MapLoader {
        async fn load(&self, url: &Url) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.images
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| AbsorberError::Transport(format!("HTTP 404 for {url}")))
        }
    }

    fn config() -> ExtractConfig {
        ExtractConfig {
            max_bytes: 1024 * 1024,
            min_image_bytes: None,
            ocr_page_images: true,
            max_page_images: 20,
            unit_workers: 4,
            legacy_converter: "absorber-no-such-office-binary".into(),
        }
    }

    fn echo_ocr() -> Arc<OcrAdapter> {
        Arc::new(OcrAdapter::with_factory(|| Ok(Arc::new(EchoName) as Arc<dyn OcrEngine>)))
    }

    fn missing_ocr() -> Arc<OcrAdapter> {
        Arc::new(OcrAdapter::with_factory(|| {
            Err(AbsorberError::unavailable("ocr", "tesseract not installed"))
        }))
    }

    fn jpeg(len: usize) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.resize(len, 0);
        bytes
    }

    #[tokio::test]
    async fn static_file_extracts_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Notes\r\n\r\nMilvus handled 500 QPS.\r\n").unwrap();

        let extractor = Extractor::new(config(), echo_ocr());
        let first = extractor.extract_path(&path).await.unwrap();
        let second = extractor.extract_path(&path).await.unwrap();

        assert_eq!(first.body, "# Notes\n\nMilvus handled 500 QPS.\n");
        assert_eq!(first.body, second.body);
        assert_eq!(first.meta.content_hash, second.meta.content_hash);
        assert_eq!(first.meta.content_hash.len(), 64);
        assert_eq!(first.meta.source, path.display().to_string());
    }

    #[tokio::test]
    async fn size_ceiling_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.max_bytes = 16;
        let extractor = Extractor::new(cfg, echo_ocr());

        let at_limit = dir.path().join("ok.txt");
        std::fs::write(&at_limit, "x".repeat(16)).unwrap();
        assert!(extractor.extract_path(&at_limit).await.is_ok());

        let over = dir.path().join("big.txt");
        std::fs::write(&over, "x".repeat(17)).unwrap();
        let err = extractor.extract_path(&over).await.unwrap_err();
        assert!(matches!(err, AbsorberError::SizeLimitExceeded { size: 17, limit: 16 }));
    }

    #[tokio::test]
    async fn remote_body_over_ceiling_is_rejected() {
        let mut cfg = config();
        cfg.max_bytes = 4;
        let extractor = Extractor::new(cfg, echo_ocr());
        let fetched = FetchResult {
            body: b"<p>too long</p>".to_vec(),
            content_type: Some("text/html".into()),
            final_url: Url::parse("https://example.com/").unwrap(),
            strategy: absorber_shared::FetchStrategy::Direct,
        };
        let err = extractor.extract_remote(fetched).await.unwrap_err();
        assert_eq!(err.kind_label(), "SIZE LIMIT EXCEEDED");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let extractor = Extractor::new(config(), echo_ocr());
        let err = extractor.extract_path(Path::new("/definitely/not/here.pdf")).await.unwrap_err();
        assert_eq!(err.marker(), "[NOT FOUND: /definitely/not/here.pdf]");
    }

    #[tokio::test]
    async fn legacy_text_encoding_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.txt");
        std::fs::write(&path, b"caf\xe9 cr\xe8me").unwrap();

        let doc = Extractor::new(config(), echo_ocr()).extract_path(&path).await.unwrap();
        assert_eq!(doc.body, "café crème\n");
    }

    #[tokio::test]
    async fn unknown_extension_binary_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(config(), echo_ocr());

        let binary = dir.path().join("blob.bin");
        std::fs::write(&binary, [0xFFu8, 0x00, 0xFE, 0x00, 0x01]).unwrap();
        let err = extractor.extract_path(&binary).await.unwrap_err();
        assert!(matches!(err, AbsorberError::UnsupportedFormat(_)));

        let textual = dir.path().join("README");
        std::fs::write(&textual, "plain words").unwrap();
        assert_eq!(extractor.extract_path(&textual).await.unwrap().body, "plain words\n");
    }

    #[tokio::test]
    async fn pdf_pages_stay_in_order_with_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        let image = jpeg(256);
        let bytes = pdf::fixtures::pdf_with_pages(
            &["First page", "Second page", "Third page"],
            Some(&image),
        );
        std::fs::write(&path, bytes).unwrap();

        let doc = Extractor::new(config(), echo_ocr()).extract_path(&path).await.unwrap();

        let labels: Vec<&str> = doc.units.iter().map(|u| u.label.as_str()).collect();
        assert_eq!(labels, vec!["page 1", "page 2", "page 3"]);
        assert!(doc.units.iter().all(|u| u.kind == UnitKind::Page));

        let first = doc.body.find("## Page 1").unwrap();
        let second = doc.body.find("## Page 2").unwrap();
        let third = doc.body.find("## Page 3").unwrap();
        assert!(first < second && second < third);
        assert!(doc.units[0].text.contains("[IMAGE OCR CONTENT]\nsaw page1-img0.jpg\n[/IMAGE OCR CONTENT]"));
        assert!(doc.errors.is_empty());
        assert_eq!(doc.meta.title.as_deref(), Some("Vector Store Benchmarks"));
    }

    #[tokio::test]
    async fn text_only_pdf_pages_keep_their_own_text() {
        let texts: Vec<String> = (1..=24).map(|n| format!("Section {n} body")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.pdf");
        std::fs::write(&path, pdf::fixtures::pdf_with_pages(&refs, None)).unwrap();

        let config = ExtractConfig {
            unit_workers: 3,
            ..config()
        };
        let extractor = Extractor::new(config, missing_ocr());
        let doc = extractor.extract_path(&path).await.unwrap();

        assert_eq!(doc.units.len(), 24);
        for (i, unit) in doc.units.iter().enumerate() {
            assert_eq!(unit.index, i);
            assert_eq!(unit.label, format!("page {}", i + 1));
            assert!(unit.text.contains(&format!("Section {} body", i + 1)), "{}", unit.text);
        }
        assert!(doc.errors.is_empty());
    }

    #[tokio::test]
    async fn pdf_image_without_engine_marks_only_its_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        let image = jpeg(256);
        let bytes = pdf::fixtures::pdf_with_pages(&["Front", "Back"], Some(&image));
        std::fs::write(&path, bytes).unwrap();

        let doc = Extractor::new(config(), missing_ocr()).extract_path(&path).await.unwrap();

        assert!(doc.units[0].text.contains("[ENGINE UNAVAILABLE: ocr: tesseract not installed]"));
        assert!(!doc.units[1].text.contains("ENGINE UNAVAILABLE"));
        assert_eq!(doc.errors.len(), 1);
        assert_eq!(doc.errors[0].label, "page 1");
    }

    #[tokio::test]
    async fn docx_media_follow_listing_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.docx");
        let second = jpeg(128);
        let first = jpeg(64);
        std::fs::write(
            &path,
            docx::fixtures::docx_with(
                &["Milvus handled 500 QPS."],
                &[("word/media/image2.jpeg", &second[..]), ("word/media/image1.jpeg", &first[..])],
            ),
        )
        .unwrap();

        let doc = Extractor::new(config(), echo_ocr()).extract_path(&path).await.unwrap();

        let labels: Vec<&str> = doc.units.iter().map(|u| u.label.as_str()).collect();
        assert_eq!(labels, vec!["word/media/image2.jpeg", "word/media/image1.jpeg"]);
        assert!(doc.units[0].text.contains("saw media-0.jpg"));
        assert!(doc.units[1].text.contains("saw media-1.jpg"));
        assert!(doc.body.starts_with("# Benchmark Notes\n"));
        assert!(doc.body.find("media-0").unwrap() < doc.body.find("media-1").unwrap());
        assert_eq!(doc.meta.title.as_deref(), Some("Benchmark Notes"));
    }

    #[tokio::test]
    async fn small_docx_images_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icons.docx");
        let icon = jpeg(32);
        let bytes = docx::fixtures::docx_with(&["body"], &[("word/media/image1.jpeg", &icon[..])]);
        std::fs::write(&path, bytes).unwrap();

        let mut cfg = config();
        cfg.min_image_bytes = Some(5120);
        let doc = Extractor::new(cfg, echo_ocr()).extract_path(&path).await.unwrap();

        assert_eq!(doc.units.len(), 1);
        assert_eq!(doc.units[0].text, "");
        assert!(!doc.body.contains("IMAGE OCR CONTENT"));
    }

    #[tokio::test]
    async fn legacy_doc_without_converter_fails_the_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.doc");
        std::fs::write(&path, b"\xD0\xCF\x11\xE0 legacy").unwrap();

        let err = Extractor::new(config(), echo_ocr()).extract_path(&path).await.unwrap_err();
        assert!(err.marker().starts_with("[ENGINE UNAVAILABLE: legacy-doc converter:"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn converted_legacy_doc_is_held_to_the_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let office = legacy::fixtures::fake_office(dir.path(), 4096);
        let path = dir.path().join("memo.doc");
        std::fs::write(&path, b"\xD0\xCF\x11\xE0 legacy").unwrap();

        let config = ExtractConfig {
            max_bytes: 1024,
            legacy_converter: office.display().to_string(),
            ..config()
        };
        let err = Extractor::new(config, echo_ocr()).extract_path(&path).await.unwrap_err();
        assert!(
            matches!(err, AbsorberError::SizeLimitExceeded { size: 4096, limit: 1024 }),
            "{err}"
        );
    }

    #[tokio::test]
    async fn standalone_image_needs_an_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nrest").unwrap();

        let doc = Extractor::new(config(), echo_ocr()).extract_path(&path).await.unwrap();
        assert_eq!(doc.body, "[IMAGE OCR CONTENT]\nsaw scan.png\n[/IMAGE OCR CONTENT]\n");

        let err = Extractor::new(config(), missing_ocr()).extract_path(&path).await.unwrap_err();
        assert_eq!(err.marker(), "[ENGINE UNAVAILABLE: ocr: tesseract not installed]");
    }

    #[tokio::test]
    async fn remote_html_appends_page_image_ocr_in_order() {
        let html = br#"<html><head><title>Bench</title></head><body><article>
            <p>Milvus handled 500 QPS.</p>
            <img src="/charts/qps.png"><img src="/charts/missing.png"><img src="latency.jpg">
        </article></body></html>"#;

        let mut images = HashMap::new();
        images.insert(
            "https://example.com/charts/qps.png".to_string(),
            b"\x89PNG\r\n\x1a\nqps".to_vec(),
        );
        images.insert("https://example.com/posts/latency.jpg".to_string(), jpeg(64));
        let loader = Arc::new(MapLoader {
            images,
            calls: AtomicUsize::new(0),
        });

        let extractor = Extractor::new(config(), echo_ocr()).with_loader(loader.clone());
        let fetched = FetchResult {
            body: html.to_vec(),
            content_type: Some("text/html; charset=utf-8".into()),
            final_url: Url::parse("https://example.com/posts/bench").unwrap(),
            strategy: absorber_shared::FetchStrategy::Direct,
        };
        let doc = extractor.extract_remote(fetched).await.unwrap();

        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
        assert_eq!(doc.meta.source, "https://example.com/posts/bench (direct)");
        assert_eq!(doc.meta.title.as_deref(), Some("Bench"));

        let labels: Vec<&str> = doc.units.iter().map(|u| u.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "https://example.com/charts/qps.png",
                "https://example.com/charts/missing.png",
                "https://example.com/posts/latency.jpg",
            ]
        );
        assert!(doc.units[0].text.contains("saw image-0.png"));
        assert!(doc.units[1].text.starts_with("[TRANSPORT ERROR:"));
        assert!(doc.units[2].text.contains("saw image-2.jpg"));
        assert_eq!(doc.errors.len(), 1);
        assert_eq!(doc.errors[0].index, 1);

        let text_at = doc.body.find("Milvus handled 500 QPS.").unwrap();
        assert!(text_at < doc.body.find("saw image-0.png").unwrap());
    }

    #[tokio::test]
    async fn page_images_capped_and_skipped_without_engine() {
        let html = br#"<body><main><p>text</p><img src="https://cdn.example.com/a.png"><img src="https://cdn.example.com/b.png"></main></body>"#;
        let loader = Arc::new(MapLoader {
            images: HashMap::new(),
            calls: AtomicUsize::new(0),
        });
        let base = Url::parse("https://example.com/").unwrap();

        let mut cfg = config();
        cfg.max_page_images = 1;
        let doc = Extractor::new(cfg, missing_ocr())
            .with_loader(loader.clone())
            .extract_html(html, None, Some(&base), "https://example.com/ (direct)")
            .await
            .unwrap();

        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(doc.units.len(), 1);
        assert_eq!(doc.errors.len(), 1);
        assert!(doc.body.contains("[ENGINE UNAVAILABLE: ocr: tesseract not installed]"));
    }

    #[tokio::test]
    async fn remote_pdf_routed_by_content_type() {
        let fetched = FetchResult {
            body: pdf::fixtures::pdf_with_pages(&["Hosted report"], None),
            content_type: Some("application/pdf".into()),
            final_url: Url::parse("https://example.com/download?id=7").unwrap(),
            strategy: absorber_shared::FetchStrategy::Direct,
        };
        let doc = Extractor::new(config(), echo_ocr()).extract_remote(fetched).await.unwrap();
        assert!(doc.body.starts_with("## Page 1\n\nHosted report"));
    }
}
