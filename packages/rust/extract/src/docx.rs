//! DOCX text and embedded media.
//!
//! Paragraph and table text comes from `docx-rs`. Images are read straight
//! from the `word/media/` entries of the zip container, in archive listing
//! order.

use std::io::{Cursor, Read};

use docx_rs::{
    DocumentChild, Paragraph, ParagraphChild, RunChild, Table, TableCellContent, TableChild,
    TableRowChild,
};
use tracing::debug;

use absorber_shared::{AbsorberError, Result};

const MEDIA_PREFIX: &str = "word/media/";

/// Raster formats worth sending to OCR. Vector formats (emf, wmf) are not.
const RASTER_MEDIA: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];

/// An embedded image from the media container.
#[derive(Debug, Clone)]
pub(crate) struct MediaEntry {
    /// Archive path, e.g. `word/media/image2.png`.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Document text: one line per paragraph, tables as `a | b` rows. Heading
/// styles become markdown headings.
pub(crate) fn read_text(bytes: &[u8]) -> Result<String> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|e| AbsorberError::parse(format!("invalid DOCX: {e}")))?;

    let mut blocks: Vec<String> = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => {
                let text = paragraph_text(p);
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                match heading_level(p) {
                    Some(level) => blocks.push(format!("{} {text}", "#".repeat(level))),
                    None => blocks.push(text.to_string()),
                }
            }
            DocumentChild::Table(t) => {
                let text = table_text(t);
                if !text.trim().is_empty() {
                    blocks.push(text);
                }
            }
            _ => {}
        }
    }

    Ok(blocks.join("\n"))
}

fn heading_level(p: &Paragraph) -> Option<usize> {
    let style = p.property.style.as_ref()?.val.to_lowercase();
    if style == "title" {
        return Some(1);
    }
    let level = style.strip_prefix("heading")?.trim().parse::<usize>().ok()?;
    Some(level.clamp(1, 6))
}

fn paragraph_text(p: &Paragraph) -> String {
    let mut text = String::new();
    for child in &p.children {
        match child {
            ParagraphChild::Run(run) => push_run(&mut text, &run.children),
            ParagraphChild::Hyperlink(link) => {
                for inner in &link.children {
                    if let ParagraphChild::Run(run) = inner {
                        push_run(&mut text, &run.children);
                    }
                }
            }
            _ => {}
        }
    }
    text
}

fn push_run(out: &mut String, children: &[RunChild]) {
    for child in children {
        match child {
            RunChild::Text(t) => out.push_str(&t.text),
            RunChild::Tab(_) => out.push('\t'),
            RunChild::Break(_) => out.push('\n'),
            _ => {}
        }
    }
}

fn table_text(t: &Table) -> String {
    t.rows
        .iter()
        .map(|row| {
            let TableChild::TableRow(row) = row;
            row.cells
                .iter()
                .map(|cell| {
                    let TableRowChild::TableCell(cell) = cell;
                    cell.children
                        .iter()
                        .filter_map(|content| match content {
                            TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                            _ => None,
                        })
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Raster entries under `word/media/`, in archive listing order.
pub(crate) fn read_media(bytes: &[u8]) -> Result<Vec<MediaEntry>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AbsorberError::parse(format!("invalid DOCX container: {e}")))?;

    let mut media = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| AbsorberError::parse(format!("unreadable DOCX entry {i}: {e}")))?;
        let name = file.name().to_string();
        if !file.is_file() || !is_raster_media(&name) {
            continue;
        }
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| AbsorberError::parse(format!("unreadable DOCX entry {name}: {e}")))?;
        media.push(MediaEntry { name, bytes: buf });
    }

    debug!(media = media.len(), "docx media listed");
    Ok(media)
}

fn is_raster_media(name: &str) -> bool {
    let Some(file) = name.strip_prefix(MEDIA_PREFIX) else {
        return false;
    };
    file.rsplit_once('.')
        .map(|(_, ext)| RASTER_MEDIA.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}


#[cfg(test)]
mod tests {
    use super::fixtures::docx_with;
    use super::*;

    #[test]
    fn paragraphs_headings_and_tables() {
        let bytes = docx_with(&["Milvus handled 500 QPS.", "Pinecone was slower."], &[]);
        let text = read_text(&bytes).unwrap();

        assert!(text.starts_with("# Benchmark Notes\n"));
        assert!(text.contains("Milvus handled 500 QPS.\nPinecone was slower."));
        assert!(text.contains("Recall | 0.95"));
    }

    #[test]
    fn media_in_listing_order_raster_only() {
        let bytes = docx_with(
            &["body"],
            &[
                ("word/media/image2.png", &b"second"[..]),
                ("word/media/image1.jpeg", &b"first"[..]),
                ("word/media/image3.emf", &b"vector"[..]),
                ("word/other/thing.png", &b"not media"[..]),
            ],
        );
        let media = read_media(&bytes).unwrap();
        let names: Vec<&str> = media.iter().map(|m| m.name.as_str()).collect();

        assert_eq!(names, vec!["word/media/image2.png", "word/media/image1.jpeg"]);
        assert_eq!(media[0].bytes, b"second");
    }

    #[test]
    fn not_a_zip() {
        assert!(matches!(read_media(b"plain text"), Err(AbsorberError::Parse { .. })));
        assert!(read_text(b"plain text").is_err());
    }
}
