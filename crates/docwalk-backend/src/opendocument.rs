//! OpenDocument backend (ODT, ODS, ODP)
//!
//! Text from `content.xml`, metadata from `meta.xml`. Images stored under
//! `Pictures/` and object previews under `ObjectReplacements/` become
//! children, typed from `META-INF/manifest.xml`.

use crate::archive::zip_children;
use crate::error::Result;
use crate::xml_utils::{
    collect_text, parse_metadata_elements, read_entry_string, read_optional_string, TextRules,
};
use docwalk_core::backend::{BackendResult, ParsedNode, ParserBackend};
use docwalk_core::document::{set_value, Metadata};
use docwalk_core::ByteSource;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::Cursor;
use zip::ZipArchive;

const CONTENT_RULES: TextRules<'static> = TextRules {
    paragraphs: &[b"p", b"h", b"table-row"],
    tabs: &[b"tab"],
    breaks: &[b"line-break"],
    text_elements: None,
    skip: &[
        b"automatic-styles",
        b"font-face-decls",
        b"scripts",
        b"annotation",
        b"tracked-changes",
    ],
    lenient: false,
};

/// Backend for OpenDocument text, spreadsheet and presentation packages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OdfBackend;

impl OdfBackend {
    /// Create a new OpenDocument backend
    #[inline]
    #[must_use = "creates OpenDocument backend"]
    pub const fn new() -> Self {
        Self
    }

    fn parse_package(bytes: &[u8]) -> Result<ParsedNode> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let mut metadata = Metadata::new();
        if let Some(mimetype) = read_optional_string(&mut archive, "mimetype")? {
            set_value(&mut metadata, "Content-Type", mimetype.trim());
        }
        if let Some(xml) = read_optional_string(&mut archive, "meta.xml")? {
            parse_metadata_elements(&xml, &mut metadata)?;
        }

        let content = read_entry_string(&mut archive, "content.xml")?;
        let text = collect_text(&content, &CONTENT_RULES)?;

        let manifest = match read_optional_string(&mut archive, "META-INF/manifest.xml")? {
            Some(xml) => manifest_types(&xml)?,
            None => HashMap::new(),
        };
        let children = zip_children(
            &mut archive,
            |name| name.starts_with("Pictures/") || is_object_part(name),
            |name| manifest.get(name).cloned(),
        )?;

        Ok(ParsedNode::from_text(text)
            .with_metadata(metadata)
            .with_embedded(children))
    }
}

impl ParserBackend for OdfBackend {
    fn name(&self) -> &str {
        "opendocument"
    }

    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
        Ok(Self::parse_package(source.bytes())?)
    }
}

/// Rendered previews of embedded objects (charts, formulas)
fn is_object_part(name: &str) -> bool {
    name.starts_with("ObjectReplacements/")
}

/// `manifest:full-path` to `manifest:media-type` for every file entry
fn manifest_types(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut types = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.name().local_name().as_ref() == b"file-entry" => {
                let path = e.try_get_attribute("manifest:full-path")?;
                let media = e.try_get_attribute("manifest:media-type")?;
                if let (Some(path), Some(media)) = (path, media) {
                    let media = media.unescape_value()?;
                    if !media.is_empty() {
                        types.insert(path.unescape_value()?.into_owned(), media.into_owned());
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
