//! Plain text backend
//!
//! Charset resolution: UTF-8 BOM, UTF-16 BOM (LE/BE), valid UTF-8, then
//! ISO-8859-1 as the catch-all single-byte fallback.

use crate::error::{BackendError, Result};
use docwalk_core::backend::{BackendResult, ParsedNode, ParserBackend};
use docwalk_core::document::{set_value, Metadata};
use docwalk_core::ByteSource;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Backend for plain text files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TextBackend;

impl TextBackend {
    /// Create a new text backend
    #[inline]
    #[must_use = "creates text backend"]
    pub const fn new() -> Self {
        Self
    }

    /// Decode `bytes`, returning the text and the charset name used.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidStructure`] for UTF-16 input with an odd
    /// byte count.
    pub fn decode(bytes: &[u8]) -> Result<(String, &'static str)> {
        if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
            return Ok((String::from_utf8_lossy(rest).into_owned(), "UTF-8"));
        }
        if let Some(rest) = bytes.strip_prefix(UTF16LE_BOM) {
            return Ok((decode_utf16(rest, u16::from_le_bytes)?, "UTF-16LE"));
        }
        if let Some(rest) = bytes.strip_prefix(UTF16BE_BOM) {
            return Ok((decode_utf16(rest, u16::from_be_bytes)?, "UTF-16BE"));
        }
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok((text.to_owned(), "UTF-8")),
            Err(_) => Ok((bytes.iter().map(|&b| char::from(b)).collect(), "ISO-8859-1")),
        }
    }
}

fn decode_utf16(bytes: &[u8], word: fn([u8; 2]) -> u16) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(BackendError::InvalidStructure(format!(
            "UTF-16 text has odd length {}",
            bytes.len()
        )));
    }
    let units = bytes.chunks_exact(2).map(|pair| word([pair[0], pair[1]]));
    Ok(char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

impl ParserBackend for TextBackend {
    fn name(&self) -> &str {
        "text"
    }

    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
        let (text, charset) = Self::decode(source.bytes())?;
        let mut metadata = Metadata::new();
        set_value(&mut metadata, "Content-Encoding", charset);
        set_value(&mut metadata, "meta:line-count", text.lines().count().to_string());
        Ok(ParsedNode::from_text(text).with_metadata(metadata))
    }
}
