//! Shared XML helpers for ZIP-based formats (OOXML, ODF, EPUB)

use crate::error::{BackendError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use docwalk_core::document::{add_value, set_value, Metadata};
use quick_xml::events::{BytesText, Event};
use quick_xml::Reader;
use std::io::{Read, Seek};
use zip::ZipArchive;

/// Read one archive entry.
///
/// # Errors
///
/// Returns [`BackendError::MissingPart`] if the entry does not exist, or an
/// I/O error if it cannot be decompressed.
pub fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(name)
        .map_err(|_| BackendError::MissingPart(name.to_string()))?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(content)
}

/// Read one archive entry as UTF-8 text
///
/// # Errors
///
/// Returns an error if the entry is missing, unreadable or not UTF-8.
pub fn read_entry_string<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String> {
    let bytes = read_entry(archive, name)?;
    Ok(String::from_utf8(bytes)?)
}

/// Read an optional archive entry; `None` if it does not exist.
pub fn read_optional_string<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>> {
    match read_entry_string(archive, name) {
        Ok(text) => Ok(Some(text)),
        Err(BackendError::MissingPart(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// How element names map onto plain-text structure.
///
/// All names are local names (namespace prefix stripped).
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRules<'a> {
    /// Elements whose end emits a newline
    pub paragraphs: &'a [&'a [u8]],
    /// Empty elements emitting a tab
    pub tabs: &'a [&'a [u8]],
    /// Empty elements emitting a newline
    pub breaks: &'a [&'a [u8]],
    /// When set, only text inside these elements is kept
    pub text_elements: Option<&'a [&'a [u8]]>,
    /// Elements whose whole subtree is dropped
    pub skip: &'a [&'a [u8]],
    /// Accept mismatched end tags (HTML-ish input)
    pub lenient: bool,
}

/// Flatten an XML part to plain text according to `rules`.
///
/// Trailing whitespace of each line is kept; runs of empty paragraphs are
/// collapsed to a single blank line.
///
/// # Errors
///
/// Returns [`BackendError::Xml`] if the XML is malformed.
pub fn collect_text(xml: &str, rules: &TextRules<'_>) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    if rules.lenient {
        reader.check_end_names(false);
    }

    let mut buf = Vec::new();
    let mut out = String::new();
    let mut text_depth = 0usize;
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.name();
                let local = name.local_name();
                if skip_depth > 0 || rules.skip.contains(&local.as_ref()) {
                    skip_depth += 1;
                } else if rules
                    .text_elements
                    .is_some_and(|elements| elements.contains(&local.as_ref()))
                {
                    text_depth += 1;
                }
            }
            Event::End(e) => {
                let name = e.name();
                let local = name.local_name();
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else {
                    if rules
                        .text_elements
                        .is_some_and(|elements| elements.contains(&local.as_ref()))
                    {
                        text_depth = text_depth.saturating_sub(1);
                    }
                    if rules.paragraphs.contains(&local.as_ref()) {
                        end_line(&mut out);
                    }
                }
            }
            Event::Empty(e) if skip_depth == 0 => {
                let name = e.name();
                let local = name.local_name();
                if rules.tabs.contains(&local.as_ref()) {
                    out.push('\t');
                } else if rules.breaks.contains(&local.as_ref())
                    || rules.paragraphs.contains(&local.as_ref())
                {
                    out.push('\n');
                } else if local.as_ref() == b"s" {
                    // ODF run of spaces: <text:s text:c="3"/>
                    let count = e
                        .try_get_attribute("text:c")?
                        .and_then(|attr| attr.unescape_value().ok()?.parse::<usize>().ok())
                        .unwrap_or(1);
                    out.extend(std::iter::repeat(' ').take(count));
                }
            }
            Event::Text(e) if skip_depth == 0 && (rules.text_elements.is_none() || text_depth > 0) => {
                let text = unescape_lenient(&e);
                if text_depth > 0 {
                    out.push_str(&text);
                } else {
                    push_loose_text(&mut out, &text);
                }
            }
            Event::CData(e) if skip_depth == 0 && (rules.text_elements.is_none() || text_depth > 0) => {
                out.push_str(&String::from_utf8_lossy(&e));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(finish_text(out))
}

/// Unescape text, resolving common HTML entities and keeping unknown ones
/// verbatim.
fn unescape_lenient(text: &BytesText<'_>) -> String {
    let resolved = text.unescape_with(|entity| match entity {
        "nbsp" => Some("\u{a0}"),
        "copy" => Some("\u{a9}"),
        "reg" => Some("\u{ae}"),
        "mdash" => Some("\u{2014}"),
        "ndash" => Some("\u{2013}"),
        "hellip" => Some("\u{2026}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        _ => None,
    });
    match resolved {
        Ok(text) => text.into_owned(),
        Err(_) => String::from_utf8_lossy(text).into_owned(),
    }
}

/// Append text found outside explicit text elements: indentation-only nodes
/// are dropped and line starts are left-trimmed.
fn push_loose_text(out: &mut String, text: &str) {
    if text.trim().is_empty() && text.contains('\n') {
        return;
    }
    if out.is_empty() || out.ends_with('\n') {
        out.push_str(text.trim_start());
    } else {
        out.push_str(text);
    }
}

fn end_line(out: &mut String) {
    if !out.ends_with("\n\n") {
        out.push('\n');
    }
}

/// Trim blank lines from both ends; keep inner structure.
fn finish_text(text: String) -> String {
    let trimmed = text.trim_matches('\n');
    if trimmed.len() == text.len() {
        text
    } else {
        trimmed.to_string()
    }
}

/// Metadata key for a Dublin Core / OOXML core / ODF meta element
#[must_use = "returns the metadata key"]
pub fn metadata_key(local_name: &[u8]) -> Option<&'static str> {
    let key = match local_name {
        b"title" => "dc:title",
        b"creator" => "dc:creator",
        b"subject" => "dc:subject",
        b"description" => "dc:description",
        b"language" => "dc:language",
        b"identifier" => "dc:identifier",
        b"publisher" => "dc:publisher",
        b"contributor" => "dc:contributor",
        b"rights" => "dc:rights",
        b"keywords" | b"keyword" => "meta:keyword",
        b"lastModifiedBy" => "meta:last-author",
        b"initial-creator" => "meta:initial-author",
        b"created" | b"creation-date" => "dcterms:created",
        b"modified" | b"date" => "dcterms:modified",
        b"revision" | b"editing-cycles" => "cp:revision",
        b"category" => "cp:category",
        b"generator" | b"Application" => "extended-properties:Application",
        b"Company" => "extended-properties:Company",
        b"Pages" => "meta:page-count",
        b"Slides" => "meta:slide-count",
        b"Words" => "meta:word-count",
        b"Characters" => "meta:character-count",
        _ => return None,
    };
    Some(key)
}

/// Read flat metadata elements (`docProps/*.xml`, ODF `meta.xml`, OPF
/// `<metadata>`) into `metadata`.
///
/// Repeatable keys (`dc:creator`, `meta:keyword`, ...) accumulate values;
/// dates are normalised to UTC RFC 3339.
///
/// # Errors
///
/// Returns [`BackendError::Xml`] if the XML is malformed.
pub fn parse_metadata_elements(xml: &str, metadata: &mut Metadata) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut current: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.name();
                current = metadata_key(name.local_name().as_ref());
            }
            Event::Empty(e) if e.name().local_name().as_ref() == b"document-statistic" => {
                // ODF statistics live in attributes
                for attr in e.attributes().flatten() {
                    let key = match attr.key.local_name().as_ref() {
                        b"page-count" => "meta:page-count",
                        b"word-count" => "meta:word-count",
                        b"character-count" => "meta:character-count",
                        b"table-count" => "meta:table-count",
                        b"image-count" => "meta:image-count",
                        _ => continue,
                    };
                    set_value(metadata, key, attr.unescape_value()?.into_owned());
                }
            }
            Event::Text(e) => {
                if let Some(key) = current {
                    let text = e.unescape()?;
                    let value = text.trim();
                    if !value.is_empty() {
                        store(metadata, key, value);
                    }
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn store(metadata: &mut Metadata, key: &str, value: &str) {
    match key {
        "dc:creator" | "dc:contributor" | "meta:keyword" | "dc:identifier" => {
            add_value(metadata, key, value);
        }
        "dcterms:created" | "dcterms:modified" => {
            set_value(metadata, key, normalize_date(value));
        }
        _ => set_value(metadata, key, value),
    }
}

/// Normalise an ISO 8601 timestamp to `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Office documents use W3CDTF (`2024-01-15T10:30:00Z`); ODF often omits the
/// zone (`2024-01-15T10:30:00.123`), which is taken as UTC. Unparseable
/// values are returned unchanged.
#[must_use = "returns the normalised date"]
pub fn normalize_date(value: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return format_utc(dt.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, pattern) {
            return format_utc(naive.and_utc());
        }
    }
    value.to_string()
}

/// Format a timestamp the way metadata stores it
#[inline]
#[must_use = "returns the formatted timestamp"]
pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Resolve `href` relative to the directory of `base` (a ZIP entry path).
///
/// Handles `./`, `../` and `%20`-style escapes.
#[must_use = "returns the resolved entry path"]
pub fn resolve_href(base: &str, href: &str) -> String {
    let href = percent_decode(href.split('#').next().unwrap_or(href));
    let mut parts: Vec<&str> = if href.starts_with('/') {
        Vec::new()
    } else {
        base.rsplit_once('/')
            .map(|(dir, _)| dir.split('/').collect())
            .unwrap_or_default()
    };
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
