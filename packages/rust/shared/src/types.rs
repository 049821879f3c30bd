//! Core domain types for the ingestion pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

/// File extensions that make a bare string read as a local path rather than a host.
const LOCAL_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "tsv", "json", "log", "rst", "pdf", "doc", "docx", "docm",
    "png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp",
];

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A classified pipeline input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Input {
    Url(Url),
    LocalPath(PathBuf),
}

impl Input {
    /// Classify a raw input string.
    ///
    /// An explicit http(s) scheme wins, then an existing filesystem entry,
    /// then path-shaped strings. Anything else is a URL with `https://`
    /// prepended; strings that still fail to parse fall back to a path.
    pub fn classify(raw: &str) -> Self {
        let raw = raw.trim();
        let lower = raw.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            if let Ok(url) = Url::parse(raw) {
                return Self::Url(url);
            }
        }

        let path = Path::new(raw);
        if path.exists() || looks_like_path(raw) {
            return Self::LocalPath(path.to_path_buf());
        }

        match Url::parse(&format!("https://{raw}")) {
            Ok(url) if url.host_str().is_some() => Self::Url(url),
            _ => Self::LocalPath(path.to_path_buf()),
        }
    }

    /// Human-readable label for logs and metadata.
    pub fn label(&self) -> String {
        match self {
            Self::Url(url) => url.to_string(),
            Self::LocalPath(path) => path.display().to_string(),
        }
    }
}

fn looks_like_path(raw: &str) -> bool {
    if raw.starts_with('/')
        || raw.starts_with("./")
        || raw.starts_with("../")
        || raw.starts_with('~')
        || raw.contains('\\')
    {
        return true;
    }

    // Windows drive letter, e.g. `C:`
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }

    if raw.contains('/') {
        return false;
    }

    Path::new(raw)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| LOCAL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// A raw input string paired with its classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    /// The string exactly as supplied by the caller.
    pub raw: String,
    /// Classified input.
    pub input: Input,
}

impl InputSpec {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let input = Input::classify(&raw);
        Self { raw, input }
    }
}

// ---------------------------------------------------------------------------
// FetchResult
// ---------------------------------------------------------------------------

/// Which acquisition strategy produced the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    Direct,
    Browser,
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Browser => f.write_str("browser"),
        }
    }
}

/// Content acquired for a URL. Transient; never persisted.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Raw response body (or rendered HTML for browser fetches).
    pub body: Vec<u8>,
    /// `Content-Type` header value, if any.
    pub content_type: Option<String>,
    /// URL after redirects.
    pub final_url: Url,
    pub strategy: FetchStrategy,
}

impl FetchResult {
    /// Charset parameter from the content type, e.g. `utf-8`.
    pub fn charset(&self) -> Option<&str> {
        let ct = self.content_type.as_deref()?;
        ct.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"'))
        })
    }

    /// Media type without parameters, lowercased.
    pub fn mime(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|m| m.trim().to_ascii_lowercase())
    }
}

// ---------------------------------------------------------------------------
// ExtractedDocument
// ---------------------------------------------------------------------------

/// Metadata for one extracted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Source label, e.g. `https://example.com (direct)` or a file path.
    pub source: String,
    pub processed_at: DateTime<Utc>,
    /// SHA-256 of the normalized body.
    pub content_hash: String,
}

/// Granularity of a sub-document unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Page,
    Image,
}

/// Text produced for one page or embedded image, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    /// Zero-based position in the source document.
    pub index: usize,
    pub kind: UnitKind,
    /// e.g. `page 3` or `word/media/image2.png`.
    pub label: String,
    pub text: String,
}

/// A non-fatal failure of a single unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitError {
    pub index: usize,
    pub label: String,
    pub message: String,
}

/// Normalized output for one input. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub meta: DocumentMeta,
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<UnitResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<UnitError>,
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Numeric,
    Sentiment,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric => f.write_str("numeric"),
            Self::Sentiment => f.write_str("sentiment"),
        }
    }
}

/// A disagreement between sources about one subject.
///
/// Only produced when at least two distinct values were observed across at
/// least two sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub kind: ConflictKind,
    pub subject: String,
    /// Zero-based source index → observed value or polarity.
    pub per_source: BTreeMap<usize, String>,
}

// ---------------------------------------------------------------------------
// PipelineResult
// ---------------------------------------------------------------------------

/// Result for one input: a document or the error text that replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InputOutcome {
    Document(ExtractedDocument),
    Failed { message: String },
}

impl InputOutcome {
    /// Normalized text, or the error marker for failed inputs.
    pub fn text(&self) -> &str {
        match self {
            Self::Document(doc) => &doc.body,
            Self::Failed { message } => message,
        }
    }

    pub fn document(&self) -> Option<&ExtractedDocument> {
        match self {
            Self::Document(doc) => Some(doc),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputEntry {
    pub raw: String,
    pub input: Input,
    pub outcome: InputOutcome,
}

/// Final artifact of a batch, ordered exactly like the inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub entries: Vec<InputEntry>,
    pub conflicts: Vec<ConflictRecord>,
}

// ---------------------------------------------------------------------------
// Capabilities and shared seams
// ---------------------------------------------------------------------------

/// Result of probing an optional engine once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum Capability {
    Available(String),
    Unavailable(String),
}

impl Capability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(detail) => write!(f, "available ({detail})"),
            Self::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

/// Downloads auxiliary resources (page images) for extractors.
#[async_trait::async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, url: &Url) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_explicit_scheme_as_url() {
        let input = Input::classify("https://example.com/docs");
        assert!(matches!(input, Input::Url(ref u) if u.host_str() == Some("example.com")));
    }

    #[test]
    fn classify_bare_host_gets_https() {
        match Input::classify("example.com/page") {
            Input::Url(url) => assert_eq!(url.as_str(), "https://example.com/page"),
            other => panic!("expected url, got {other:?}"),
        }
    }

    #[test]
    fn classify_existing_file_wins_over_url_shape() {
        // A host-shaped name in the working directory
        let file = tempfile::Builder::new()
            .prefix("classify-")
            .suffix(".example.com")
            .tempfile_in(".")
            .unwrap();
        let name = file.path().file_name().unwrap().to_str().unwrap().to_string();

        let input = Input::classify(&name);
        assert_eq!(input, Input::LocalPath(PathBuf::from(&name)));
    }

    #[test]
    fn classify_missing_document_as_path() {
        assert!(matches!(Input::classify("report.pdf"), Input::LocalPath(_)));
        assert!(matches!(Input::classify("./notes"), Input::LocalPath(_)));
        assert!(matches!(Input::classify("C:\\docs\\a.txt"), Input::LocalPath(_)));
    }

    #[test]
    fn fetch_result_parses_charset() {
        let fetched = FetchResult {
            body: Vec::new(),
            content_type: Some("text/html; charset=\"ISO-8859-1\"".into()),
            final_url: Url::parse("https://example.com").unwrap(),
            strategy: FetchStrategy::Direct,
        };
        assert_eq!(fetched.charset(), Some("ISO-8859-1"));
        assert_eq!(fetched.mime().as_deref(), Some("text/html"));
    }

    #[test]
    fn pipeline_result_serializes() {
        let result = PipelineResult {
            entries: vec![InputEntry {
                raw: "missing.txt".into(),
                input: Input::LocalPath("missing.txt".into()),
                outcome: InputOutcome::Failed {
                    message: "[NOT FOUND: missing.txt]".into(),
                },
            }],
            conflicts: vec![],
        };
        let json = serde_json::to_string(&result).expect("serialize");
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("NOT FOUND"));
    }
}
