//! Format detection for local paths and fetched content.

use std::path::Path;

use url::Url;

/// The extractor a piece of content is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Html,
    Pdf,
    Docx,
    LegacyDoc,
    Image,
    /// No known extension; tried as plain text last.
    Unknown,
}

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "tsv", "json", "xml", "yaml", "yml", "log", "rst", "ini",
    "toml",
];
const HTML_EXTENSIONS: &[&str] = &["html", "htm", "xhtml"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp"];

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        let ext = ext.as_str();
        if TEXT_EXTENSIONS.contains(&ext) {
            Self::Text
        } else if HTML_EXTENSIONS.contains(&ext) {
            Self::Html
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            Self::Image
        } else {
            match ext {
                "pdf" => Self::Pdf,
                "docx" | "docm" => Self::Docx,
                "doc" => Self::LegacyDoc,
                _ => Self::Unknown,
            }
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Kind implied by a bare MIME type (no parameters). `None` when the
    /// type says nothing useful, e.g. `application/octet-stream`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        let kind = match mime.as_str() {
            "text/html" | "application/xhtml+xml" => Self::Html,
            "application/pdf" => Self::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Self::Docx,
            "application/msword" => Self::LegacyDoc,
            m if m.starts_with("image/") => Self::Image,
            m if m.starts_with("text/") => Self::Text,
            "application/json" | "application/xml" => Self::Text,
            _ => return None,
        };
        Some(kind)
    }

    /// Remote routing: Content-Type first, URL path extension second, HTML
    /// otherwise.
    pub fn for_remote(mime: Option<&str>, url: &Url) -> Self {
        if let Some(kind) = mime.and_then(Self::from_mime) {
            return kind;
        }
        let from_path = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| Self::from_extension(ext));
        match from_path {
            Some(kind) if kind != Self::Unknown => kind,
            _ => Self::Html,
        }
    }

    /// File extension used when remote bytes must be spilled to disk.
    pub fn spill_extension(&self) -> &'static str {
        match self {
            Self::Text | Self::Unknown => "txt",
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::LegacyDoc => "doc",
            Self::Image => "img",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_dispatch_is_case_insensitive() {
        assert_eq!(DocumentKind::from_extension("PDF"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_extension("Docm"), DocumentKind::Docx);
        assert_eq!(DocumentKind::from_extension("doc"), DocumentKind::LegacyDoc);
        assert_eq!(DocumentKind::from_extension("JPEG"), DocumentKind::Image);
        assert_eq!(DocumentKind::from_extension("yml"), DocumentKind::Text);
        assert_eq!(DocumentKind::from_extension("xyz"), DocumentKind::Unknown);
    }

    #[test]
    fn path_without_extension_is_unknown() {
        assert_eq!(DocumentKind::from_path(Path::new("/tmp/README")), DocumentKind::Unknown);
    }

    #[test]
    fn remote_prefers_content_type() {
        let url = Url::parse("https://example.com/report.pdf").unwrap();
        assert_eq!(DocumentKind::for_remote(Some("text/html"), &url), DocumentKind::Html);
        assert_eq!(
            DocumentKind::for_remote(Some("application/octet-stream"), &url),
            DocumentKind::Pdf
        );
    }

    #[test]
    fn remote_defaults_to_html() {
        let url = Url::parse("https://example.com/blog/post").unwrap();
        assert_eq!(DocumentKind::for_remote(None, &url), DocumentKind::Html);
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(DocumentKind::for_remote(None, &url), DocumentKind::Html);
    }

    #[test]
    fn remote_image_by_extension() {
        let url = Url::parse("https://cdn.example.com/chart.png?w=800").unwrap();
        assert_eq!(DocumentKind::for_remote(None, &url), DocumentKind::Image);
    }
}
