//! Extracted documents and the ordered result set of one extraction call.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Metadata mapping: unique keys, one or more values per key.
///
/// A `BTreeMap` keeps serialisation (JSON, XML `<meta>` elements) in a stable
/// order so repeated extractions of the same input are byte-identical.
pub type Metadata = BTreeMap<String, Vec<String>>;

/// Metadata keys the engine itself writes onto every document.
pub mod keys {
    /// Depth of the node in the document tree (`0` for the container)
    pub const EMBEDDED_DEPTH: &str = "X-Docwalk:embedded_depth";
    /// `/`-joined resource names from the container down to the node
    pub const EMBEDDED_RESOURCE_PATH: &str = "X-Docwalk:embedded_resource_path";
    /// Name of the backend that parsed the node
    pub const PARSED_BY: &str = "X-Docwalk:Parsed-By";
    /// Set to `true` when the truncator cut the node's content
    pub const CONTENT_TRUNCATED: &str = "X-Docwalk:content_truncated";
    /// Error message of an embedded node that failed to parse
    pub const EMBEDDED_EXCEPTION: &str = "X-Docwalk:EXCEPTION:embedded_exception";
    /// Set to `true` on a node whose children were not visited
    pub const EMBEDDED_DEPTH_LIMIT_REACHED: &str =
        "X-Docwalk:EXCEPTION:embedded_depth_limit_reached";
    /// File or entry name of the node, when known
    pub const RESOURCE_NAME: &str = "resourceName";
    /// Detected media type of the node
    pub const CONTENT_TYPE: &str = "Content-Type";
}

/// Insert a single value under `key`, replacing any previous values.
#[inline]
pub fn set_value(metadata: &mut Metadata, key: &str, value: impl Into<String>) {
    metadata.insert(key.to_string(), vec![value.into()]);
}

/// Append a value under `key`, keeping previous values.
#[inline]
pub fn add_value(metadata: &mut Metadata, key: &str, value: impl Into<String>) {
    metadata.entry(key.to_string()).or_default().push(value.into());
}

/// One extracted node: decoded (possibly truncated, possibly XML-wrapped)
/// content plus the backend's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Extracted text
    pub content: String,
    /// Document metadata
    pub metadata: Metadata,
}

impl Document {
    /// Create a document from its parts
    #[inline]
    #[must_use = "creates a document"]
    pub const fn new(content: String, metadata: Metadata) -> Self {
        Self { content, metadata }
    }

    /// First value stored under `key`
    #[inline]
    #[must_use = "returns the metadata value"]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Number of characters (not bytes) in the content
    #[inline]
    #[must_use = "returns the character count"]
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// Ordered documents of one extraction call.
///
/// `documents()[0]` is the container; the rest are embedded documents in
/// depth-first traversal order. The set is read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    documents: Vec<Document>,
}

impl ResultSet {
    pub(crate) const fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// All documents in traversal order
    #[inline]
    #[must_use = "returns the extracted documents"]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Number of documents (container + embedded)
    #[inline]
    #[must_use = "returns the document count"]
    pub fn total_count(&self) -> usize {
        self.documents.len()
    }

    /// The container document, `None` only for an empty set
    #[inline]
    #[must_use = "returns the container document"]
    pub fn container(&self) -> Option<&Document> {
        self.documents.first()
    }

    /// Every document except the container
    #[inline]
    #[must_use = "returns the embedded documents"]
    pub fn embedded_documents(&self) -> &[Document] {
        self.documents.get(1..).unwrap_or(&[])
    }

    /// Consume the set, returning the documents
    #[inline]
    #[must_use = "returns the owned documents"]
    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResultSet", 2)?;
        state.serialize_field("total_count", &self.total_count())?;
        state.serialize_field("documents", &self.documents)?;
        state.end()
    }
}
