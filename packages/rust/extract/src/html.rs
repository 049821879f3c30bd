//! HTML to markdown.
//!
//! Decodes the raw bytes, repairs double-encoded text, reads `<title>` and
//! author metadata, picks a content root, converts it with `htmd` and runs
//! the cleanup passes. Image references are collected for OCR.

use std::borrow::Cow;
use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use absorber_shared::{AbsorberError, Result};

use crate::cleanup;

/// Tags whose content never reaches the markdown.
const SKIP_TAGS: &[&str] = &["script", "style", "nav", "footer", "iframe", "noscript", "svg"];

/// Content containers, most specific first. `body` is the fallback.
const CONTENT_ROOTS: &[&str] = &["article", "main", "[role=\"main\"]", ".content"];

/// A converted page.
#[derive(Debug, Clone)]
pub struct HtmlPage {
    pub title: Option<String>,
    pub author: Option<String>,
    pub markdown: String,
    /// Absolute `<img>` URLs in document order, deduplicated.
    pub images: Vec<Url>,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode page bytes using the declared charset, else UTF-8, then repair
/// mojibake.
pub fn decode_html(bytes: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!(encoding = used.name(), "replacement characters while decoding");
    }
    repair_mojibake(&text).into_owned()
}

/// Undo UTF-8 that was decoded as windows-1252 (`Ã©` → `é`).
///
/// Text is only replaced when it re-encodes to windows-1252 without loss
/// and those bytes form different, valid UTF-8. Anything else is returned
/// unchanged.
pub fn repair_mojibake(text: &str) -> Cow<'_, str> {
    let suspicious = text.chars().filter(|&c| is_latin1_or_cp1252_special(c)).take(2).count();
    if suspicious < 2 {
        return Cow::Borrowed(text);
    }

    let (bytes, _, had_errors) = WINDOWS_1252.encode(text);
    if had_errors {
        return Cow::Borrowed(text);
    }
    match std::str::from_utf8(&bytes) {
        Ok(repaired) if repaired != text => {
            debug!("repaired double-encoded text");
            Cow::Owned(repaired.to_string())
        }
        _ => Cow::Borrowed(text),
    }
}

fn is_latin1_or_cp1252_special(c: char) -> bool {
    matches!(c, '\u{0080}'..='\u{00FF}')
        || matches!(
            c,
            '€' | '‚'
                | 'ƒ'
                | '„'
                | '…'
                | '†'
                | '‡'
                | 'ˆ'
                | '‰'
                | 'Š'
                | '‹'
                | 'Œ'
                | 'Ž'
                | '\u{2018}'
                | '\u{2019}'
                | '\u{201C}'
                | '\u{201D}'
                | '•'
                | '–'
                | '—'
                | '˜'
                | '™'
                | 'š'
                | '›'
                | 'œ'
                | 'ž'
                | 'Ÿ'
        )
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(base = ?base_url.map(Url::as_str)))]
pub fn convert(html: &str, base_url: Option<&Url>) -> Result<HtmlPage> {
    let doc = Html::parse_document(html);

    let title = document_title(&doc);
    let author = document_author(&doc);
    let images = base_url.map(|base| image_sources(&doc, base)).unwrap_or_default();

    let content_html = content_root_html(&doc);
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();
    let raw_markdown = converter
        .convert(&content_html)
        .map_err(|e| AbsorberError::Conversion(format!("htmd conversion failed: {e}")))?;

    let markdown = cleanup::run_pipeline(&raw_markdown, base_url);
    let title = title.or_else(|| first_h1(&markdown));

    debug!(
        title = ?title,
        markdown_len = markdown.len(),
        images = images.len(),
        "html converted"
    );

    Ok(HtmlPage {
        title,
        author,
        markdown,
        images,
    })
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

fn document_title(doc: &Html) -> Option<String> {
    static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("head title, title"));
    doc.select(&TITLE)
        .next()
        .map(|el| collapse_ws(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn document_author(doc: &Html) -> Option<String> {
    static AUTHOR: LazyLock<Selector> = LazyLock::new(|| {
        selector(r#"meta[name="author"], meta[property="article:author"], meta[name="dc.creator"]"#)
    });
    doc.select(&AUTHOR)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_ws)
        .find(|a| !a.is_empty())
}

fn first_h1(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));
    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn content_root_html(doc: &Html) -> String {
    for css in CONTENT_ROOTS {
        if let Ok(sel) = Selector::parse(css) {
            if let Some(el) = doc.select(&sel).next() {
                return el.inner_html();
            }
        }
    }
    static BODY: LazyLock<Selector> = LazyLock::new(|| selector("body"));
    doc.select(&BODY)
        .next()
        .map(|body| body.inner_html())
        .unwrap_or_else(|| doc.root_element().inner_html())
}

/// `<img src>` targets as absolute http(s) URLs.
fn image_sources(doc: &Html, base: &Url) -> Vec<Url> {
    static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img[src]"));
    let mut seen = Vec::new();
    for src in doc.select(&IMG).filter_map(|el| el.value().attr("src")) {
        let src = src.trim();
        if src.is_empty() || src.starts_with("data:") {
            continue;
        }
        let Ok(url) = base.join(src) else {
            continue;
        };
        if matches!(url.scheme(), "http" | "https") && !seen.contains(&url) {
            seen.push(url);
        }
    }
    seen
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Replace `<table>` elements with markdown tables before htmd runs.
fn preprocess_tables(html: &str) -> String {
    static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));

    let fragment = Html::parse_fragment(html);
    let tables: Vec<ElementRef> = fragment.select(&TABLE).collect();
    if tables.is_empty() {
        return html.to_string();
    }

    let mut result = fragment.root_element().inner_html();
    for table in tables {
        // Nested tables are flattened into their parent's cells.
        if table.ancestors().filter_map(ElementRef::wrap).any(|a| a.value().name() == "table") {
            continue;
        }
        result = result.replacen(&table.html(), &table_to_markdown(&table), 1);
    }
    result
}

fn table_to_markdown(table: &ElementRef) -> String {
    static TR: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
    static CELL: LazyLock<Selector> = LazyLock::new(|| selector("th, td"));

    let rows: Vec<Vec<String>> = table
        .select(&TR)
        .map(|tr| {
            tr.select(&CELL)
                .map(|cell| collapse_ws(&cell.text().collect::<String>()).replace('|', "\\|"))
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let render = |cells: &[String]| {
        let mut padded = cells.to_vec();
        padded.resize(width, String::new());
        format!("| {} |\n", padded.join(" | "))
    };

    let mut md = String::from("\n\n");
    md.push_str(&render(&rows[0]));
    md.push_str(&render(&vec!["---".to_string(); width]));
    for row in &rows[1..] {
        md.push_str(&render(row));
    }
    md.push('\n');
    md
}
