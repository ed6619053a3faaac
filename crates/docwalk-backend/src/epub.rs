//! EPUB backend
//!
//! Follows `META-INF/container.xml` to the OPF package document, reads its
//! `<metadata>`, then flattens the spine's XHTML documents in reading order.
//! Image manifest items become embedded children.

use crate::archive::{admit_entry, read_bounded};
use crate::error::{BackendError, Result};
use crate::xml_utils::{
    collect_text, parse_metadata_elements, read_entry_string, read_optional_string, resolve_href,
    TextRules,
};
use docwalk_core::backend::{BackendResult, ParsedNode, ParserBackend};
use docwalk_core::document::{set_value, Metadata};
use docwalk_core::ByteSource;
use log::warn;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::Cursor;
use zip::ZipArchive;

const XHTML_RULES: TextRules<'static> = TextRules {
    paragraphs: &[
        b"p", b"div", b"h1", b"h2", b"h3", b"h4", b"h5", b"h6", b"li", b"tr", b"blockquote",
        b"pre",
    ],
    tabs: &[],
    breaks: &[b"br"],
    text_elements: None,
    skip: &[b"head", b"script", b"style"],
    lenient: true,
};

/// One `<item>` of the OPF manifest
#[derive(Debug, Clone, PartialEq, Eq)]
struct ManifestItem {
    href: String,
    media_type: String,
}

/// Parsed OPF package document
#[derive(Debug, Default)]
struct Package {
    metadata: Metadata,
    /// Manifest ids in document order
    order: Vec<String>,
    items: HashMap<String, ManifestItem>,
    spine: Vec<String>,
}

impl Package {
    fn parse(xml: &str) -> Result<Self> {
        let mut package = Self::default();

        // manifest and spine carry no element text, so the whole document
        // can be scanned for Dublin Core elements
        parse_metadata_elements(xml, &mut package.metadata)?;

        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Empty(e) | Event::Start(e) => match e.name().local_name().as_ref() {
                    b"item" => {
                        let id = e.try_get_attribute("id")?;
                        let href = e.try_get_attribute("href")?;
                        if let (Some(id), Some(href)) = (id, href) {
                            let media_type = e
                                .try_get_attribute("media-type")?
                                .map(|a| a.unescape_value().map(|v| v.into_owned()))
                                .transpose()?
                                .unwrap_or_default();
                            let id = id.unescape_value()?.into_owned();
                            package.order.push(id.clone());
                            package.items.insert(
                                id,
                                ManifestItem {
                                    href: href.unescape_value()?.into_owned(),
                                    media_type,
                                },
                            );
                        }
                    }
                    b"itemref" => {
                        if let Some(idref) = e.try_get_attribute("idref")? {
                            package.spine.push(idref.unescape_value()?.into_owned());
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(package)
    }
}

/// Location of the OPF document from `META-INF/container.xml`
fn rootfile_path(container_xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(container_xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.name().local_name().as_ref() == b"rootfile" => {
                if let Some(path) = e.try_get_attribute("full-path")? {
                    return Ok(path.unescape_value()?.into_owned());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Err(BackendError::MissingPart(
        "rootfile in META-INF/container.xml".to_string(),
    ))
}

/// Backend for EPUB 2 and 3 publications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EpubBackend;

impl EpubBackend {
    /// Create a new EPUB backend
    #[inline]
    #[must_use = "creates EPUB backend"]
    pub const fn new() -> Self {
        Self
    }

    fn parse_publication(bytes: &[u8]) -> Result<ParsedNode> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let container = read_entry_string(&mut archive, "META-INF/container.xml")?;
        let opf_path = rootfile_path(&container)?;
        let package = Package::parse(&read_entry_string(&mut archive, &opf_path)?)?;

        let mut chapters = Vec::with_capacity(package.spine.len());
        for idref in &package.spine {
            let Some(item) = package.items.get(idref) else {
                warn!("Spine references unknown manifest item: {idref}");
                continue;
            };
            let path = resolve_href(&opf_path, &item.href);
            let Some(xhtml) = read_optional_string(&mut archive, &path)? else {
                warn!("Spine item missing from archive: {path}");
                continue;
            };
            let text = collect_text(&xhtml, &XHTML_RULES)?;
            if !text.is_empty() {
                chapters.push(text);
            }
        }

        let mut metadata = package.metadata;
        set_value(&mut metadata, "meta:chapter-count", chapters.len().to_string());

        let mut children = Vec::new();
        for id in &package.order {
            let Some(item) = package.items.get(id) else {
                continue;
            };
            if !item.media_type.starts_with("image/") {
                continue;
            }
            let path = resolve_href(&opf_path, &item.href);
            let Some(index) = archive.index_for_name(&path) else {
                warn!("Manifest item missing from archive: {path}");
                continue;
            };
            let size = archive.by_index_raw(index)?.size();
            let Some(path) = admit_entry(&path, size) else {
                continue;
            };
            let contents = read_bounded(archive.by_index(index)?, size)?;
            let name = path.rsplit('/').next().unwrap_or(&path).to_string();
            children.push(
                ByteSource::new(contents)
                    .with_name(name)
                    .with_content_type(item.media_type.clone()),
            );
        }

        Ok(ParsedNode::from_text(chapters.join("\n\n"))
            .with_metadata(metadata)
            .with_embedded(children))
    }
}

impl ParserBackend for EpubBackend {
    fn name(&self) -> &str {
        "epub"
    }

    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
        Ok(Self::parse_publication(source.bytes())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Field Notes</dc:title>
    <dc:creator>Ada</dc:creator>
    <dc:creator>Grace</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="c2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="c1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover" href="images/cover.png" media-type="image/png"/>
  </manifest>
  <spine><itemref idref="c1"/><itemref idref="c2"/></spine>
</package>"#;

    fn chapter(title: &str, body: &str) -> String {
        format!(
            r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>ignored</title><style>p {{}}</style></head>
<body><h1>{title}</h1><p>{body}</p></body></html>"#
        )
    }

    fn epub() -> Vec<u8> {
        epub_without(&[])
    }

    fn epub_without(missing: &[&str]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let entries = [
            ("mimetype", "application/epub+zip".to_string()),
            ("META-INF/container.xml", CONTAINER.to_string()),
            ("OEBPS/content.opf", OPF.to_string()),
            ("OEBPS/text/ch1.xhtml", chapter("One", "First&nbsp;page")),
            ("OEBPS/text/ch2.xhtml", chapter("Two", "Second page")),
            ("OEBPS/images/cover.png", "png".to_string()),
        ];
        for (name, data) in entries {
            if missing.contains(&name) {
                continue;
            }
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_spine_order_and_metadata() {
        let mut node = EpubBackend.parse(&ByteSource::new(epub())).unwrap();
        let mut text = String::new();
        node.open_content_stream().read_to_string(&mut text).unwrap();
        assert_eq!(text, "One\nFirst\u{a0}page\n\nTwo\nSecond page");

        let metadata = node.read_metadata();
        assert_eq!(metadata["dc:title"], vec!["Field Notes"]);
        assert_eq!(metadata["dc:creator"], vec!["Ada", "Grace"]);
        assert_eq!(metadata["meta:chapter-count"], vec!["2"]);
    }

    #[test]
    fn test_images_become_children() {
        let node = EpubBackend.parse(&ByteSource::new(epub())).unwrap();
        let children = node.list_embedded_sources();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name(), Some("cover.png"));
        assert_eq!(children[0].content_type(), Some("image/png"));
        assert_eq!(children[0].bytes(), b"png");
    }

    #[test]
    fn test_missing_spine_item_skipped() {
        let bytes = epub_without(&["OEBPS/text/ch2.xhtml"]);
        let mut node = EpubBackend.parse(&ByteSource::new(bytes)).unwrap();
        let mut text = String::new();
        node.open_content_stream().read_to_string(&mut text).unwrap();
        assert_eq!(text, "One\nFirst\u{a0}page");
        assert_eq!(node.read_metadata()["meta:chapter-count"], vec!["1"]);
    }

    #[test]
    fn test_missing_rootfile() {
        assert!(rootfile_path("<container/>").is_err());
    }
}
