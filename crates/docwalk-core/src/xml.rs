//! XHTML wrapping of extracted documents.
//!
//! Layout of a formatted document:
//!
//! ```text
//! <html xmlns="http://www.w3.org/1999/xhtml">
//! <head>
//! <meta name="dc:title" content="Quarterly report"/>
//! <title>Quarterly report</title>
//! </head>
//! <body>
//! <p>first line</p>
//! <p/>
//! <p>third line</p>
//! </body>
//! </html>
//! ```
//!
//! Each content line becomes one `<p>`, so [`extract_body_text`] recovers the
//! original text by joining paragraphs with `\n`. Characters that XML 1.0
//! cannot carry are dropped; `\r` is written as a character reference so it
//! survives parser newline normalisation.

use crate::document::Metadata;
use crate::error::{ExtractError, Result};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::{Reader, Writer};

/// Namespace of the root, head and body elements
pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Local name of the element wrapping extracted text
pub const BODY_ELEMENT: &str = "body";

/// Metadata key whose first value becomes the `<title>`
const TITLE_KEY: &str = "dc:title";

/// Wraps content and metadata into a well-formed XHTML document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct XmlFormatter;

impl XmlFormatter {
    /// Create a formatter
    #[inline]
    #[must_use = "creates a formatter"]
    pub const fn new() -> Self {
        Self
    }

    /// Format one document.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::MalformedOutput`] if the produced markup does not
    /// parse back as well-formed XML.
    pub fn format(&self, content: &str, metadata: &Metadata) -> Result<String> {
        let mut writer = Writer::new(Vec::with_capacity(content.len() + 256));

        let mut html = BytesStart::new("html");
        html.push_attribute(("xmlns", XHTML_NAMESPACE));
        writer.write_event(Event::Start(html))?;
        newline(&mut writer)?;

        writer.write_event(Event::Start(BytesStart::new("head")))?;
        newline(&mut writer)?;
        for (key, values) in metadata {
            let name = escape_attribute(key);
            for value in values {
                let value = escape_attribute(value);
                let mut meta = BytesStart::new("meta");
                meta.push_attribute(Attribute::from((&b"name"[..], name.as_bytes())));
                meta.push_attribute(Attribute::from((&b"content"[..], value.as_bytes())));
                writer.write_event(Event::Empty(meta))?;
                newline(&mut writer)?;
            }
        }
        if let Some(title) = metadata.get(TITLE_KEY).and_then(|values| values.first()) {
            writer.write_event(Event::Start(BytesStart::new("title")))?;
            writer.write_event(Event::Text(BytesText::from_escaped(escape_text(title))))?;
            writer.write_event(Event::End(BytesEnd::new("title")))?;
            newline(&mut writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new("head")))?;
        newline(&mut writer)?;

        writer.write_event(Event::Start(BytesStart::new(BODY_ELEMENT)))?;
        newline(&mut writer)?;
        for line in content.split('\n') {
            let escaped = escape_text(line);
            if escaped.is_empty() {
                writer.write_event(Event::Empty(BytesStart::new("p")))?;
            } else {
                writer.write_event(Event::Start(BytesStart::new("p")))?;
                writer.write_event(Event::Text(BytesText::from_escaped(escaped)))?;
                writer.write_event(Event::End(BytesEnd::new("p")))?;
            }
            newline(&mut writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(BODY_ELEMENT)))?;
        newline(&mut writer)?;
        writer.write_event(Event::End(BytesEnd::new("html")))?;

        let xml = String::from_utf8(writer.into_inner())
            .map_err(|e| ExtractError::MalformedOutput(e.to_string()))?;
        check_well_formed(&xml)?;
        Ok(xml)
    }
}

fn newline(writer: &mut Writer<Vec<u8>>) -> Result<()> {
    writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    Ok(())
}

/// Whether XML 1.0 allows `c` in character data.
#[inline]
#[must_use = "checks XML character validity"]
pub const fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Escape element text, dropping characters XML cannot carry.
#[must_use = "returns the escaped text"]
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().filter(|&c| is_xml_char(c)) {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape an attribute value, dropping characters XML cannot carry.
///
/// Whitespace is written as character references so attribute value
/// normalisation does not collapse it.
#[must_use = "returns the escaped attribute value"]
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars().filter(|&c| is_xml_char(c)) {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}

/// Parse `xml` to the end, failing on the first syntax error.
///
/// # Errors
///
/// Returns [`ExtractError::MalformedOutput`] describing the first error.
pub fn check_well_formed(xml: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Text(text) => {
                text.unescape()?;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(ExtractError::MalformedOutput(format!(
            "{depth} element(s) left open"
        )))
    }
}

/// Recover plain text from the XHTML `<body>` of a formatted document.
///
/// Paragraphs are joined with `\n`, which reverses [`XmlFormatter::format`].
///
/// # Errors
///
/// Returns [`ExtractError::MalformedOutput`] if `xml` is not well formed.
pub fn extract_body_text(xml: &str) -> Result<String> {
    let xhtml = Namespace(XHTML_NAMESPACE.as_bytes());
    let mut reader = NsReader::from_str(xml);
    let mut in_body = false;
    let mut paragraph: Option<String> = None;
    let mut paragraphs = Vec::new();

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let is_body = |local: &[u8]| {
            local == BODY_ELEMENT.as_bytes() && matches!(ns, ResolveResult::Bound(n) if n == xhtml)
        };
        match event {
            Event::Start(e) if is_body(e.local_name().as_ref()) => in_body = true,
            Event::End(e) if is_body(e.local_name().as_ref()) => in_body = false,
            Event::Start(e) if in_body && e.local_name().as_ref() == b"p" => {
                paragraph = Some(String::new());
            }
            Event::Empty(e) if in_body && e.local_name().as_ref() == b"p" => {
                paragraphs.push(String::new());
            }
            Event::End(e) if in_body && e.local_name().as_ref() == b"p" => {
                if let Some(text) = paragraph.take() {
                    paragraphs.push(text);
                }
            }
            Event::Text(text) => {
                if let Some(current) = paragraph.as_mut() {
                    current.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = paragraph.as_mut() {
                    current.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs.join("\n"))
}
