//! Office Open XML backend (DOCX, PPTX, XLSX)
//!
//! Text comes from the main document parts, metadata from `docProps/core.xml`
//! and `docProps/app.xml`. Parts under `media/` and `embeddings/` are
//! reported as embedded children, typed from `[Content_Types].xml`.

use crate::archive::zip_children;
use crate::error::{BackendError, Result};
use crate::xml_utils::{
    collect_text, parse_metadata_elements, read_entry_string, read_optional_string, TextRules,
};
use docwalk_core::backend::{BackendResult, ParsedNode, ParserBackend};
use docwalk_core::document::{set_value, Metadata};
use docwalk_core::ByteSource;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use zip::ZipArchive;

const WORD_TEXT: &[&[u8]] = &[b"t"];
const WORD_RULES: TextRules<'static> = TextRules {
    paragraphs: &[b"p"],
    tabs: &[b"tab"],
    breaks: &[b"br", b"cr"],
    text_elements: Some(WORD_TEXT),
    skip: &[],
    lenient: false,
};

const DRAWING_TEXT: &[&[u8]] = &[b"t"];
const SLIDE_RULES: TextRules<'static> = TextRules {
    paragraphs: &[b"p"],
    tabs: &[],
    breaks: &[b"br"],
    text_elements: Some(DRAWING_TEXT),
    skip: &[],
    lenient: false,
};

/// Which OOXML application a package belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OoxmlKind {
    /// Word processing (`word/document.xml`)
    Docx,
    /// Presentation (`ppt/slides/slideN.xml`)
    Pptx,
    /// Spreadsheet (`xl/worksheets/sheetN.xml`)
    Xlsx,
}

impl OoxmlKind {
    /// Package directory holding the main parts
    #[inline]
    #[must_use = "returns the package directory"]
    pub const fn part_root(&self) -> &'static str {
        match self {
            Self::Docx => "word/",
            Self::Pptx => "ppt/",
            Self::Xlsx => "xl/",
        }
    }
}

/// Backend for DOCX, PPTX and XLSX packages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OoxmlBackend {
    kind: OoxmlKind,
}

impl OoxmlBackend {
    /// Create a backend for one OOXML flavour
    #[inline]
    #[must_use = "creates OOXML backend"]
    pub const fn new(kind: OoxmlKind) -> Self {
        Self { kind }
    }

    /// Package flavour handled by this backend
    #[inline]
    #[must_use = "returns the package flavour"]
    pub const fn kind(&self) -> OoxmlKind {
        self.kind
    }

    fn parse_package(&self, bytes: &[u8]) -> Result<ParsedNode> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        if archive.index_for_name("[Content_Types].xml").is_none() {
            return Err(BackendError::MissingPart("[Content_Types].xml".to_string()));
        }

        let mut metadata = Metadata::new();
        for part in ["docProps/core.xml", "docProps/app.xml"] {
            if let Some(xml) = read_optional_string(&mut archive, part)? {
                parse_metadata_elements(&xml, &mut metadata)?;
            }
        }

        let text = match self.kind {
            OoxmlKind::Docx => {
                let xml = read_entry_string(&mut archive, "word/document.xml")?;
                collect_text(&xml, &WORD_RULES)?
            }
            OoxmlKind::Pptx => {
                let slides = numbered_parts(&archive, "ppt/slides/slide");
                set_value(&mut metadata, "meta:slide-count", slides.len().to_string());
                let mut pages = Vec::with_capacity(slides.len());
                for slide in &slides {
                    let xml = read_entry_string(&mut archive, slide)?;
                    pages.push(collect_text(&xml, &SLIDE_RULES)?);
                }
                join_sections(pages)
            }
            OoxmlKind::Xlsx => {
                let shared = match read_optional_string(&mut archive, "xl/sharedStrings.xml")? {
                    Some(xml) => shared_strings(&xml)?,
                    None => Vec::new(),
                };
                let sheets = numbered_parts(&archive, "xl/worksheets/sheet");
                let mut tables = Vec::with_capacity(sheets.len());
                for sheet in &sheets {
                    let xml = read_entry_string(&mut archive, sheet)?;
                    tables.push(sheet_text(&xml, &shared)?);
                }
                join_sections(tables)
            }
        };

        let types = ContentTypes::parse(&read_entry_string(&mut archive, "[Content_Types].xml")?)?;
        let root = self.kind.part_root();
        let children = zip_children(
            &mut archive,
            |name| {
                name.starts_with(root)
                    && (name.contains("/media/") || name.contains("/embeddings/"))
            },
            |name| types.lookup(name).map(str::to_string),
        )?;

        Ok(ParsedNode::from_text(text)
            .with_metadata(metadata)
            .with_embedded(children))
    }
}

impl ParserBackend for OoxmlBackend {
    fn name(&self) -> &str {
        match self.kind {
            OoxmlKind::Docx => "docx",
            OoxmlKind::Pptx => "pptx",
            OoxmlKind::Xlsx => "xlsx",
        }
    }

    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
        Ok(self.parse_package(source.bytes())?)
    }
}

/// Entries named `{prefix}N.xml`, sorted by N
fn numbered_parts<R: Read + Seek>(archive: &ZipArchive<R>, prefix: &str) -> Vec<String> {
    let mut parts: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name.strip_prefix(prefix)?.strip_suffix(".xml")?;
            Some((number.parse().ok()?, name.to_string()))
        })
        .collect();
    parts.sort_unstable();
    parts.into_iter().map(|(_, name)| name).collect()
}

fn join_sections(sections: Vec<String>) -> String {
    sections
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `xl/sharedStrings.xml`: one string per `<si>`, rich text runs concatenated
fn shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // phonetic runs repeat the base text
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Text(e) if in_text && !in_phonetic => current.push_str(&e.unescape()?),
            Event::End(e) => match e.name().local_name().as_ref() {
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Empty(e) if e.name().local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell kind from the `t` attribute of `<c>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellType {
    Shared,
    Inline,
    Value,
}

/// One worksheet as tab separated rows
fn sheet_text(xml: &str, shared: &[String]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<String> = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut cell_type = CellType::Value;
    let mut value = String::new();
    let mut capture = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().local_name().as_ref() {
                b"c" => {
                    cell_type = match e.try_get_attribute("t")? {
                        Some(attr) if attr.value.as_ref() == b"s" => CellType::Shared,
                        Some(attr) if attr.value.as_ref() == b"inlineStr" => CellType::Inline,
                        _ => CellType::Value,
                    };
                    value.clear();
                }
                b"v" => capture = cell_type != CellType::Inline,
                b"t" => capture = cell_type == CellType::Inline,
                _ => {}
            },
            Event::Text(e) if capture => value.push_str(&e.unescape()?),
            Event::End(e) => match e.name().local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    let text = if cell_type == CellType::Shared {
                        value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i))
                            .cloned()
                            .unwrap_or_default()
                    } else {
                        std::mem::take(&mut value)
                    };
                    cells.push(text);
                }
                b"row" => {
                    while cells.last().is_some_and(String::is_empty) {
                        cells.pop();
                    }
                    if !cells.is_empty() {
                        rows.push(cells.join("\t"));
                    }
                    cells.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rows.join("\n"))
}

/// `[Content_Types].xml` lookup tables
#[derive(Debug, Default)]
struct ContentTypes {
    defaults: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl ContentTypes {
    fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut types = Self::default();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Empty(e) | Event::Start(e) => {
                    let slot = match e.name().local_name().as_ref() {
                        b"Default" => Some(("Extension", &mut types.defaults)),
                        b"Override" => Some(("PartName", &mut types.overrides)),
                        _ => None,
                    };
                    if let Some((key, table)) = slot {
                        let part = e.try_get_attribute(key)?;
                        let content_type = e.try_get_attribute("ContentType")?;
                        if let (Some(part), Some(ct)) = (part, content_type) {
                            let part = part.unescape_value()?;
                            let part = part.trim_start_matches('/').to_ascii_lowercase();
                            table.insert(part, ct.unescape_value()?.into_owned());
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(types)
    }

    fn lookup(&self, part: &str) -> Option<&str> {
        let part = part.to_ascii_lowercase();
        if let Some(ct) = self.overrides.get(&part) {
            return Some(ct);
        }
        let (_, ext) = part.rsplit_once('.')?;
        self.defaults.get(ext).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const CONTENT_TYPES: &str = r#"<?xml version="1.0"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="png" ContentType="image/png"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/embeddings/oleObject1.bin" ContentType="application/vnd.openxmlformats-officedocument.oleObject"/>
</Types>"#;

    fn package(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("[Content_Types].xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(CONTENT_TYPES.as_bytes()).unwrap();
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn text_of(node: &mut ParsedNode) -> String {
        let mut text = String::new();
        node.open_content_stream().read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_docx_text_metadata_and_media() {
        let document = br#"<w:document xmlns:w="w"><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second</w:t></w:r></w:p></w:body></w:document>"#;
        let core = br#"<cp:coreProperties xmlns:cp="c" xmlns:dc="d"><dc:title>Report</dc:title></cp:coreProperties>"#;
        let bytes = package(&[
            ("word/document.xml", document),
            ("docProps/core.xml", core),
            ("word/media/image1.png", b"\x89PNG\r\n\x1a\n"),
            ("word/embeddings/oleObject1.bin", b"ole"),
        ]);

        let mut node = OoxmlBackend::new(OoxmlKind::Docx)
            .parse(&ByteSource::new(bytes))
            .unwrap();
        assert_eq!(text_of(&mut node), "Hello world\nSecond");
        assert_eq!(node.read_metadata()["dc:title"], vec!["Report"]);

        let children = node.list_embedded_sources();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name(), Some("image1.png"));
        assert_eq!(children[0].content_type(), Some("image/png"));
        assert_eq!(
            children[1].content_type(),
            Some("application/vnd.openxmlformats-officedocument.oleObject")
        );
    }

    #[test]
    fn test_pptx_slides_in_numeric_order() {
        let slide = |text: &str| {
            format!(r#"<p:sld xmlns:p="p" xmlns:a="a"><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sld>"#)
        };
        let (s1, s2, s10) = (slide("one"), slide("two"), slide("ten"));
        let bytes = package(&[
            ("ppt/slides/slide10.xml", s10.as_bytes()),
            ("ppt/slides/slide2.xml", s2.as_bytes()),
            ("ppt/slides/slide1.xml", s1.as_bytes()),
        ]);
        let mut node = OoxmlBackend::new(OoxmlKind::Pptx)
            .parse(&ByteSource::new(bytes))
            .unwrap();
        assert_eq!(text_of(&mut node), "one\n\ntwo\n\nten");
        assert_eq!(node.read_metadata()["meta:slide-count"], vec!["3"]);
    }

    #[test]
    fn test_xlsx_shared_and_inline_cells() {
        let shared = br#"<sst xmlns="x"><si><t>Name</t></si><si><r><t>Qty</t></r></si></sst>"#;
        let sheet = br#"<worksheet xmlns="x"><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
            <row r="2"><c r="A2" t="inlineStr"><is><t>Bolt</t></is></c><c r="B2"><v>12</v></c></row>
            </sheetData></worksheet>"#;
        let bytes = package(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        let mut node = OoxmlBackend::new(OoxmlKind::Xlsx)
            .parse(&ByteSource::new(bytes))
            .unwrap();
        assert_eq!(text_of(&mut node), "Name\tQty\nBolt\t12");
    }

    #[test]
    fn test_missing_main_part() {
        let bytes = package(&[("docProps/core.xml", b"<x/>")]);
        let err = OoxmlBackend::new(OoxmlKind::Docx)
            .parse(&ByteSource::new(bytes))
            .unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn test_content_types_lookup() {
        let types = ContentTypes::parse(CONTENT_TYPES).unwrap();
        assert_eq!(types.lookup("word/media/a.PNG"), Some("image/png"));
        assert_eq!(types.lookup("word/media/a.emf"), None);
    }
}
