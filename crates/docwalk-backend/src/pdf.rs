//! PDF backend using lopdf
//!
//! Text is extracted page by page; pages that fail to decode are skipped
//! with a warning. The document information dictionary supplies metadata.
//! Attachments from the `EmbeddedFiles` name tree and from `FileAttachment`
//! annotations become embedded children.

use crate::archive::MAX_FILE_SIZE;
use crate::error::{BackendError, Result};
use crate::xml_utils::format_utc;
use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
use docwalk_core::backend::{BackendResult, ParsedNode, ParserBackend};
use docwalk_core::document::{add_value, set_value, Metadata};
use docwalk_core::ByteSource;
use log::{debug, warn};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashSet;

/// Longest reference chain followed before giving up
const MAX_REFERENCE_HOPS: usize = 32;
/// Deepest name tree walked
const MAX_NAME_TREE_DEPTH: usize = 32;

/// Backend for PDF documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PdfBackend;

impl PdfBackend {
    /// Create a new PDF backend
    #[inline]
    #[must_use = "creates PDF backend"]
    pub const fn new() -> Self {
        Self
    }

    fn parse_document(bytes: &[u8]) -> Result<ParsedNode> {
        let doc = Document::load_mem(bytes)?;
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(BackendError::PasswordProtected);
        }

        let pages = doc.get_pages();
        let mut text = String::new();
        for &number in pages.keys() {
            match doc.extract_text(&[number]) {
                Ok(page) => {
                    let page = page.trim_end();
                    if !page.is_empty() {
                        if !text.is_empty() {
                            text.push_str("\n\n");
                        }
                        text.push_str(page);
                    }
                }
                Err(e) => warn!("Skipping page {number}: text extraction failed: {e}"),
            }
        }

        let mut metadata = info_metadata(&doc);
        set_value(&mut metadata, "xmpTPg:NPages", pages.len().to_string());
        set_value(&mut metadata, "pdf:PDFVersion", doc.version.clone());

        let children = attachments(&doc);
        debug!(
            "PDF: {} pages, {} attachments",
            pages.len(),
            children.len()
        );

        Ok(ParsedNode::from_text(text)
            .with_metadata(metadata)
            .with_embedded(children))
    }
}

impl ParserBackend for PdfBackend {
    fn name(&self) -> &str {
        "pdf"
    }

    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
        Ok(Self::parse_document(source.bytes())?)
    }
}

/// Follow references until a direct object is reached.
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object> {
    let mut current = object;
    for _ in 0..MAX_REFERENCE_HOPS {
        match current {
            Object::Reference(id) => current = doc.get_object(*id)?,
            direct => return Ok(direct),
        }
    }
    Err(BackendError::InvalidStructure(
        "reference chain too long".to_string(),
    ))
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, object).ok()?.as_dict().ok()
}

fn dict_entry<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    resolve(doc, dict.get(key).ok()?).ok()
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise PDFDocEncoding
/// (taken as Latin-1).
#[must_use = "returns the decoded string"]
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        return char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Parse a PDF date (`D:YYYYMMDDHHmmSSOHH'mm'`) into UTC RFC 3339.
///
/// Missing trailing fields default to their minimum; a missing zone is UTC.
#[must_use = "returns the parsed date"]
pub fn parse_pdf_date(value: &str) -> Option<String> {
    let value = value.trim();
    let value = value.strip_prefix("D:").unwrap_or(value);
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, zone) = value.split_at(digits_end);
    if digits.len() < 4 {
        return None;
    }

    let field = |start: usize, len: usize, default: u32| -> Option<u32> {
        match digits.get(start..start + len) {
            Some(part) => part.parse().ok(),
            None => Some(default),
        }
    };
    let year = i32::try_from(field(0, 4, 0)?).ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(4, 2, 1)?, field(6, 2, 1)?)?;
    let naive = date.and_hms_opt(field(8, 2, 0)?, field(10, 2, 0)?, field(12, 2, 0)?)?;

    let offset_seconds = match zone.chars().next() {
        Some(sign @ ('+' | '-')) => {
            let rest: String = zone[1..].chars().filter(char::is_ascii_digit).collect();
            let hours: i32 = rest.get(0..2)?.parse().ok()?;
            let minutes: i32 = rest.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
            let seconds = hours * 3600 + minutes * 60;
            if sign == '-' {
                -seconds
            } else {
                seconds
            }
        }
        _ => 0,
    };
    let offset = FixedOffset::east_opt(offset_seconds)?;
    let local = offset.from_local_datetime(&naive).single()?;
    Some(format_utc(local.with_timezone(&Utc)))
}

/// Metadata from the trailer's `/Info` dictionary
fn info_metadata(doc: &Document) -> Metadata {
    let mut metadata = Metadata::new();
    let Some(info) = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|object| resolve_dict(doc, object))
    else {
        return metadata;
    };

    for (key, value) in info.iter() {
        let Ok(Object::String(bytes, _)) = resolve(doc, value) else {
            continue;
        };
        let text = decode_pdf_string(bytes);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        match key.as_slice() {
            b"Title" => set_value(&mut metadata, "dc:title", text),
            b"Author" => add_value(&mut metadata, "dc:creator", text),
            b"Subject" => set_value(&mut metadata, "dc:subject", text),
            b"Keywords" => {
                for keyword in text.split([',', ';']).map(str::trim).filter(|k| !k.is_empty()) {
                    add_value(&mut metadata, "meta:keyword", keyword);
                }
            }
            b"Creator" => set_value(&mut metadata, "xmp:CreatorTool", text),
            b"Producer" => set_value(&mut metadata, "pdf:Producer", text),
            b"CreationDate" => {
                let date = parse_pdf_date(text).unwrap_or_else(|| text.to_string());
                set_value(&mut metadata, "dcterms:created", date);
            }
            b"ModDate" => {
                let date = parse_pdf_date(text).unwrap_or_else(|| text.to_string());
                set_value(&mut metadata, "dcterms:modified", date);
            }
            _ => {}
        }
    }
    metadata
}

/// Embedded files, name tree first, then page annotations, without
/// duplicates.
fn attachments(doc: &Document) -> Vec<ByteSource> {
    let mut specs: Vec<&Object> = Vec::new();

    let tree_root = doc
        .trailer
        .get(b"Root")
        .ok()
        .and_then(|root| resolve_dict(doc, root))
        .and_then(|catalog| dict_entry(doc, catalog, b"Names"))
        .and_then(|names| names.as_dict().ok())
        .and_then(|names| dict_entry(doc, names, b"EmbeddedFiles"))
        .and_then(|tree| tree.as_dict().ok());
    if let Some(tree) = tree_root {
        collect_name_tree(doc, tree, 0, &mut specs);
    }

    for page_id in doc.get_pages().values() {
        let Ok(page) = doc.get_dictionary(*page_id) else {
            continue;
        };
        let Some(Ok(annots)) = dict_entry(doc, page, b"Annots").map(Object::as_array) else {
            continue;
        };
        for annot in annots {
            let Some(annot) = resolve_dict(doc, annot) else {
                continue;
            };
            let is_attachment = annot
                .get(b"Subtype")
                .and_then(Object::as_name)
                .is_ok_and(|name| name == b"FileAttachment");
            if !is_attachment {
                continue;
            }
            if let Ok(spec) = annot.get(b"FS") {
                specs.push(spec);
            }
        }
    }

    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut children = Vec::new();
    for spec in specs {
        if let Object::Reference(id) = spec {
            if !seen.insert(*id) {
                continue;
            }
        }
        match file_spec(doc, spec) {
            Ok(Some(child)) => children.push(child),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable PDF attachment: {e}"),
        }
    }
    children
}

fn collect_name_tree<'a>(
    doc: &'a Document,
    node: &'a Dictionary,
    depth: usize,
    out: &mut Vec<&'a Object>,
) {
    if depth > MAX_NAME_TREE_DEPTH {
        warn!("EmbeddedFiles name tree deeper than {MAX_NAME_TREE_DEPTH}, truncating");
        return;
    }
    if let Some(Ok(names)) = dict_entry(doc, node, b"Names").map(Object::as_array) {
        // [key1 value1 key2 value2 ...]
        out.extend(names.iter().skip(1).step_by(2));
    }
    if let Some(Ok(kids)) = dict_entry(doc, node, b"Kids").map(Object::as_array) {
        for kid in kids {
            if let Some(kid) = resolve_dict(doc, kid) {
                collect_name_tree(doc, kid, depth + 1, out);
            }
        }
    }
}

/// Read one file specification into a child source
fn file_spec(doc: &Document, spec: &Object) -> Result<Option<ByteSource>> {
    let Some(spec) = resolve_dict(doc, spec) else {
        return Ok(None);
    };
    let name = [b"UF".as_slice(), b"F".as_slice()]
        .iter()
        .find_map(|key| match dict_entry(doc, spec, key) {
            Some(Object::String(bytes, _)) => Some(decode_pdf_string(bytes)),
            _ => None,
        });

    let Some(ef) = dict_entry(doc, spec, b"EF").and_then(|ef| ef.as_dict().ok()) else {
        return Ok(None);
    };
    let Some(stream) = [b"F".as_slice(), b"UF".as_slice()]
        .iter()
        .find_map(|key| dict_entry(doc, ef, key)?.as_stream().ok())
    else {
        return Ok(None);
    };

    let data = if stream.dict.has(b"Filter") {
        stream.decompressed_content()?
    } else {
        stream.content.clone()
    };
    if data.len() as u64 > MAX_FILE_SIZE {
        warn!(
            "Skipping large PDF attachment: {} ({} bytes exceeds {MAX_FILE_SIZE} bytes limit)",
            name.as_deref().unwrap_or("unnamed"),
            data.len()
        );
        return Ok(None);
    }

    let mut child = ByteSource::new(data);
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        child = child.with_name(name);
    }
    if let Ok(subtype) = stream.dict.get(b"Subtype").and_then(Object::as_name) {
        let mime = String::from_utf8_lossy(subtype).replace("#2F", "/");
        if mime.contains('/') {
            child = child.with_content_type(mime);
        }
    }
    Ok(Some(child))
}
