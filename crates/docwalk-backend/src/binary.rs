//! Backend for opaque binaries and raster images
//!
//! No text is extracted. Images report their pixel dimensions when the
//! header carries them.

use crate::format::InputFormat;
use docwalk_core::backend::{BackendResult, ParsedNode, ParserBackend};
use docwalk_core::document::{set_value, Metadata};
use docwalk_core::ByteSource;

/// Backend producing empty content for formats without text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BinaryBackend;

impl BinaryBackend {
    /// Create a new binary backend
    #[inline]
    #[must_use = "creates binary backend"]
    pub const fn new() -> Self {
        Self
    }
}

/// Width and height from a PNG, GIF or BMP header
#[must_use = "returns the image dimensions"]
pub fn image_dimensions(format: InputFormat, bytes: &[u8]) -> Option<(u32, u32)> {
    let be32 = |at: usize| -> Option<u32> {
        Some(u32::from_be_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
    };
    let le16 = |at: usize| -> Option<u32> {
        Some(u32::from(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?)))
    };
    let le32 = |at: usize| -> Option<u32> {
        Some(i32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?).unsigned_abs())
    };

    match format {
        // IHDR is always the first chunk
        InputFormat::Png if bytes.get(12..16) == Some(b"IHDR".as_slice()) => Some((be32(16)?, be32(20)?)),
        InputFormat::Gif => Some((le16(6)?, le16(8)?)),
        InputFormat::Bmp => Some((le32(18)?, le32(22)?)),
        _ => None,
    }
}

impl ParserBackend for BinaryBackend {
    fn name(&self) -> &str {
        "binary"
    }

    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
        let format = InputFormat::detect(source.name(), source.bytes());
        let mut metadata = Metadata::new();
        if let Some((width, height)) = image_dimensions(format, source.bytes()) {
            set_value(&mut metadata, "tiff:ImageWidth", width.to_string());
            set_value(&mut metadata, "tiff:ImageLength", height.to_string());
        }
        Ok(ParsedNode::from_text(String::new()).with_metadata(metadata))
    }
}
