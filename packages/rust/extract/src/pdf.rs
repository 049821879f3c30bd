//! PDF pages: text plus embedded JPEG/JPEG 2000 images.
//!
//! The file is parsed once into a shared [`PdfFile`]; each page is then read
//! on its own, so text extraction and image OCR both run per page on the
//! unit pool.

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use absorber_shared::{AbsorberError, Result};

/// Bound on `/Parent` hops when looking up inherited resources.
const MAX_PARENT_DEPTH: usize = 32;

/// One page as read from the file.
#[derive(Debug)]
pub(crate) struct PdfPage {
    pub number: u32,
    /// Extracted text, or the extraction error.
    pub text: std::result::Result<String, String>,
    pub images: Vec<PageImage>,
}

#[derive(Debug)]
pub(crate) struct PageImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// A parsed document and its page table.
pub(crate) struct PdfFile {
    doc: Document,
    pub title: Option<String>,
    pub author: Option<String>,
    /// `(page number, page object)` in page order.
    pub pages: Vec<(u32, ObjectId)>,
}

impl PdfFile {
    pub(crate) fn load(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| AbsorberError::parse(format!("invalid PDF: {e}")))?;

        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        debug!(pages = pages.len(), "pdf loaded");

        Ok(Self {
            title: info_string(&doc, b"Title"),
            author: info_string(&doc, b"Author"),
            pages,
            doc,
        })
    }

    /// Text and raster images of one page.
    pub(crate) fn read_page(&self, number: u32, page_id: ObjectId) -> PdfPage {
        PdfPage {
            number,
            text: self
                .doc
                .extract_text(&[number])
                .map(|t| t.trim().to_string())
                .map_err(|e| e.to_string()),
            images: page_images(&self.doc, page_id),
        }
    }
}

/// A text entry of the trailer's `/Info` dictionary.
fn info_string(doc: &Document, key: &[u8]) -> Option<String> {
    let info = resolve(doc, doc.trailer.get(b"Info").ok()?)?.as_dict().ok()?;
    let Object::String(bytes, _) = resolve(doc, info.get(key).ok()?)? else {
        return None;
    };
    let text = decode_pdf_string(bytes);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// UTF-16BE when BOM-prefixed, otherwise byte-per-char.
fn decode_pdf_string(bytes: &[u8]) -> String {
    match bytes.strip_prefix(&[0xFE, 0xFF]) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Raster XObjects a page draws, in resource-dictionary order.
fn page_images(doc: &Document, page_id: ObjectId) -> Vec<PageImage> {
    let Some(xobjects) = page_xobjects(doc, page_id) else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(_, obj)| {
            let stream = resolve(doc, obj)?.as_stream().ok()?;
            if !has_name(&stream.dict, b"Subtype", b"Image") {
                return None;
            }
            let extension = raster_extension(&stream.dict)?;
            Some(PageImage {
                bytes: stream.content.clone(),
                extension,
            })
        })
        .collect()
}

/// `/Resources /XObject` for a page, following `/Parent` for inherited
/// resources.
fn page_xobjects(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PARENT_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            let resources = resolve(doc, resources)?.as_dict().ok()?;
            let xobjects = resources.get(b"XObject").ok()?;
            return resolve(doc, xobjects)?.as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn has_name(dict: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    matches!(dict.get(key), Ok(Object::Name(name)) if name.as_slice() == expected)
}

/// Only streams whose sole filter yields a standalone image file.
fn raster_extension(dict: &Dictionary) -> Option<&'static str> {
    let filter = match dict.get(b"Filter").ok()? {
        Object::Name(name) => name.as_slice(),
        Object::Array(filters) if filters.len() == 1 => match &filters[0] {
            Object::Name(name) => name.as_slice(),
            _ => return None,
        },
        _ => return None,
    };
    match filter {
        b"DCTDecode" => Some("jpg"),
        b"JPXDecode" => Some("jp2"),
        _ => None,
    }
}
