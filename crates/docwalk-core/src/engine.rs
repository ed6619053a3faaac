//! Per-node extraction pipeline.
//!
//! For every node the walker visits: decode the content stream to the end,
//! cap it with the [`Truncator`], stamp traversal metadata, then wrap it with
//! the [`XmlFormatter`] when XML output is requested.

use crate::backend::ParserBackend;
use crate::decoder::{read_to_string, DEFAULT_READ_BUFFER_SIZE};
use crate::document::{keys, set_value, Document, Metadata, ResultSet};
use crate::error::Result;
use crate::source::ByteSource;
use crate::truncate::Truncator;
use crate::walker::{ContainerWalker, NodeInfo, WalkPolicy};
use crate::xml::XmlFormatter;
use log::info;
use std::io::Read;

/// Options for one extraction call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ExtractionOptions {
    /// Character ceiling per document, applied before XML wrapping
    pub max_length: Option<usize>,
    /// Wrap each document in XHTML
    pub as_xml: bool,
}

impl ExtractionOptions {
    /// Create options
    #[inline]
    #[must_use = "creates extraction options"]
    pub const fn new(max_length: Option<usize>, as_xml: bool) -> Self {
        Self { max_length, as_xml }
    }
}

/// Orchestrates walker, decoder, truncator and formatter.
///
/// Holds no state between calls; one engine may serve any number of
/// extractions.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionEngine<'a> {
    backend: &'a dyn ParserBackend,
    policy: WalkPolicy,
    read_buffer_size: usize,
}

impl<'a> ExtractionEngine<'a> {
    /// Create an engine over `backend` with default limits
    #[inline]
    #[must_use = "creates an extraction engine"]
    pub fn new(backend: &'a dyn ParserBackend) -> Self {
        Self {
            backend,
            policy: WalkPolicy::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Replace the traversal policy
    #[inline]
    #[must_use = "returns the engine with the new policy"]
    pub const fn with_policy(mut self, policy: WalkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the chunk size used when pulling content streams
    #[inline]
    #[must_use = "returns the engine with the new buffer size"]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Extract `root` and every embedded document beneath it.
    ///
    /// # Errors
    ///
    /// Any [`ExtractError`](crate::ExtractError) aborts the whole call; no
    /// partial result is returned.
    pub fn extract(&self, root: ByteSource, options: &ExtractionOptions) -> Result<ResultSet> {
        let truncator = Truncator::new(options.max_length);
        let formatter = options.as_xml.then(XmlFormatter::new);
        let root_name = root.name().unwrap_or("<bytes>").to_owned();

        let nodes = ContainerWalker::new(self.backend)
            .with_policy(self.policy)
            .walk(root, |node, content, metadata| {
                self.finalize(node, content, metadata, truncator, formatter.as_ref())
            })?;

        let documents: Vec<Document> = nodes.into_iter().map(|node| node.document).collect();
        info!(
            "Extracted {} document(s) from {} ({} embedded)",
            documents.len(),
            root_name,
            documents.len().saturating_sub(1)
        );
        Ok(ResultSet::new(documents))
    }

    fn finalize(
        &self,
        node: &NodeInfo,
        content: &mut dyn Read,
        mut metadata: Metadata,
        truncator: Truncator,
        formatter: Option<&XmlFormatter>,
    ) -> Result<Document> {
        let mut text = read_to_string(content, self.read_buffer_size, node.display_path())?;
        let truncated = truncator.apply(&mut text);

        set_value(&mut metadata, keys::EMBEDDED_DEPTH, node.depth.to_string());
        if !node.is_root() {
            set_value(
                &mut metadata,
                keys::EMBEDDED_RESOURCE_PATH,
                node.resource_path.as_str(),
            );
        }
        if let Some(name) = &node.name {
            metadata
                .entry(keys::RESOURCE_NAME.to_string())
                .or_insert_with(|| vec![name.clone()]);
        }
        if let Some(content_type) = &node.content_type {
            metadata
                .entry(keys::CONTENT_TYPE.to_string())
                .or_insert_with(|| vec![content_type.clone()]);
        }
        metadata
            .entry(keys::PARSED_BY.to_string())
            .or_insert_with(|| vec![self.backend.name().to_string()]);
        if truncated {
            set_value(&mut metadata, keys::CONTENT_TRUNCATED, "true");
        }

        let content = match formatter {
            Some(formatter) => formatter.format(&text, &metadata)?,
            None => text,
        };
        Ok(Document::new(content, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, ParsedNode};
    use crate::xml::extract_body_text;
    use crate::ErrorKind;

    /// Container whose first line is its text and each further line an
    /// embedded child named `part-N`.
    #[derive(Debug)]
    struct LinesBackend;

    impl ParserBackend for LinesBackend {
        fn name(&self) -> &str {
            "lines"
        }

        fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
            let text = String::from_utf8(source.bytes().to_vec())?;
            let mut lines = text.lines();
            let body = lines.next().unwrap_or_default().to_string();
            let embedded = lines
                .enumerate()
                .map(|(i, line)| {
                    ByteSource::new(line.as_bytes().to_vec())
                        .with_name(format!("part-{}", i + 1))
                        .with_content_type("text/plain")
                })
                .collect();
            let mut metadata = Metadata::new();
            set_value(&mut metadata, "dc:title", "Lines");
            Ok(ParsedNode::from_text(body)
                .with_metadata(metadata)
                .with_embedded(embedded))
        }
    }

    fn extract(input: &str, options: ExtractionOptions) -> Result<ResultSet> {
        let backend = LinesBackend;
        ExtractionEngine::new(&backend)
            .with_read_buffer_size(3)
            .extract(
                ByteSource::new(input.as_bytes().to_vec()).with_name("deck.txt"),
                &options,
            )
    }

    #[test]
    fn test_container_and_embedded() {
        let result = extract("Title slide\nimage one", ExtractionOptions::default()).unwrap();
        assert_eq!(result.total_count(), 2);
        assert_eq!(result.embedded_documents().len(), 1);

        let container = result.container().unwrap();
        assert_eq!(container.content, "Title slide");
        assert_eq!(container.metadata_value(keys::EMBEDDED_DEPTH), Some("0"));
        assert_eq!(container.metadata_value(keys::RESOURCE_NAME), Some("deck.txt"));
        assert_eq!(container.metadata_value(keys::PARSED_BY), Some("lines"));
        assert!(container
            .metadata_value(keys::EMBEDDED_RESOURCE_PATH)
            .is_none());

        let child = &result.embedded_documents()[0];
        assert_eq!(child.content, "image one");
        assert_eq!(child.metadata_value(keys::EMBEDDED_DEPTH), Some("1"));
        assert_eq!(
            child.metadata_value(keys::EMBEDDED_RESOURCE_PATH),
            Some("/part-1")
        );
        assert_eq!(child.metadata_value(keys::CONTENT_TYPE), Some("text/plain"));
    }

    #[test]
    fn test_max_length_applies_to_every_document() {
        let options = ExtractionOptions::new(Some(4), false);
        let result = extract("Großartig\nüberall gut\nok", options).unwrap();
        for document in result.documents() {
            assert!(document.char_count() <= 4, "{:?}", document.content);
        }
        assert_eq!(result.documents()[0].content, "Groß");
        assert_eq!(
            result.documents()[0].metadata_value(keys::CONTENT_TRUNCATED),
            Some("true")
        );
        assert!(result.documents()[2]
            .metadata_value(keys::CONTENT_TRUNCATED)
            .is_none());
    }

    #[test]
    fn test_xml_output_round_trips() {
        let plain = extract("a < b & c\nchild", ExtractionOptions::default()).unwrap();
        let xml = extract("a < b & c\nchild", ExtractionOptions::new(None, true)).unwrap();

        assert_eq!(plain.total_count(), xml.total_count());
        for (plain_doc, xml_doc) in plain.documents().iter().zip(xml.documents()) {
            assert!(xml_doc.content.contains('<') && xml_doc.content.contains('>'));
            assert_eq!(extract_body_text(&xml_doc.content).unwrap(), plain_doc.content);
            assert_eq!(plain_doc.metadata, xml_doc.metadata);
        }
    }

    #[test]
    fn test_truncation_happens_before_wrapping() {
        let text = "x".repeat(500);
        let result = extract(&text, ExtractionOptions::new(Some(100), true)).unwrap();
        let container = result.container().unwrap();
        assert!(container.char_count() > 100);
        assert!(container.char_count() <= 100 + 1000);
        assert_eq!(extract_body_text(&container.content).unwrap(), "x".repeat(100));
    }

    #[test]
    fn test_empty_input() {
        let err = extract("", ExtractionOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
        assert!(err.to_string().contains("InputStream must have > 0 bytes"));
    }

    #[test]
    fn test_invalid_encoding_propagates() {
        #[derive(Debug)]
        struct Truncated;
        impl ParserBackend for Truncated {
            fn name(&self) -> &str {
                "truncated"
            }
            fn parse(&self, _source: &ByteSource) -> BackendResult<ParsedNode> {
                Ok(ParsedNode::new(std::io::Cursor::new(vec![b'a', 0xE2, 0x82])))
            }
        }

        let backend = Truncated;
        let err = ExtractionEngine::new(&backend)
            .extract(ByteSource::new(vec![1]), &ExtractionOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEncoding);
    }

    #[test]
    fn test_deterministic() {
        let input = "root\nfirst\nsecond\nthird";
        let first = extract(input, ExtractionOptions::new(Some(3), true)).unwrap();
        let second = extract(input, ExtractionOptions::new(Some(3), true)).unwrap();
        assert_eq!(first, second);
    }
}
