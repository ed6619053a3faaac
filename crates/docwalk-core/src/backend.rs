//! Contract between the engine and format-specific parser backends.
//!
//! A backend turns one [`ByteSource`] into a [`ParsedNode`]: a raw content
//! stream, a metadata mapping, and the node's embedded child sources in the
//! order the format defines them. The engine assumes nothing else about the
//! backend.

use crate::document::Metadata;
use crate::source::ByteSource;
use std::fmt;
use std::io::{Cursor, Read};

/// Error type returned across the backend seam.
pub type BackendFailure = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned across the backend seam.
pub type BackendResult<T> = std::result::Result<T, BackendFailure>;

/// A format parser backend.
///
/// Implementations must be deterministic: the same bytes must yield the same
/// content, metadata and child order.
pub trait ParserBackend: Send + Sync + fmt::Debug {
    /// Short name recorded in each document's `Parsed-By` metadata
    fn name(&self) -> &str;

    /// Parse one node.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are corrupt or the format is unsupported.
    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode>;
}

/// Output of a backend for a single node.
pub struct ParsedNode {
    content: Box<dyn Read>,
    metadata: Metadata,
    embedded: Vec<ByteSource>,
}

impl ParsedNode {
    /// Create a node whose content is read from `content`
    #[inline]
    #[must_use = "creates a parsed node"]
    pub fn new(content: impl Read + 'static) -> Self {
        Self {
            content: Box::new(content),
            metadata: Metadata::new(),
            embedded: Vec::new(),
        }
    }

    /// Create a node from already-decoded text
    #[inline]
    #[must_use = "creates a parsed node"]
    pub fn from_text(text: String) -> Self {
        Self::new(Cursor::new(text.into_bytes()))
    }

    /// Attach metadata
    #[inline]
    #[must_use = "returns the node with metadata"]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach embedded child sources, in format order
    #[inline]
    #[must_use = "returns the node with embedded sources"]
    pub fn with_embedded(mut self, embedded: Vec<ByteSource>) -> Self {
        self.embedded = embedded;
        self
    }

    /// Take the raw content stream. A second call yields an empty stream.
    #[inline]
    pub fn open_content_stream(&mut self) -> Box<dyn Read> {
        std::mem::replace(&mut self.content, Box::new(std::io::empty()))
    }

    /// Metadata reported by the backend
    #[inline]
    #[must_use = "returns the node metadata"]
    pub const fn read_metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable metadata, for wrappers that add keys after parsing
    #[inline]
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Embedded child sources in the order the backend reported them
    #[inline]
    #[must_use = "returns the embedded sources"]
    pub fn list_embedded_sources(&self) -> &[ByteSource] {
        &self.embedded
    }

    pub(crate) fn into_parts(self) -> (Box<dyn Read>, Metadata, Vec<ByteSource>) {
        (self.content, self.metadata, self.embedded)
    }
}

impl fmt::Debug for ParsedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedNode")
            .field("metadata", &self.metadata)
            .field("embedded", &self.embedded)
            .finish_non_exhaustive()
    }
}
