//! # Docwalk Core - Recursive Extraction Engine
//!
//! Docwalk extracts text and metadata from a document container and from every
//! document embedded inside it (images in a slide deck, attachments in a PDF,
//! entries in an archive), returning one flat, ordered [`ResultSet`].
//!
//! This crate holds the format-independent engine. Concrete format parsers and
//! the `Extractor` entry point live in `docwalk-backend`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docwalk_backend::Extractor;
//!
//! fn main() -> docwalk_core::Result<()> {
//!     let extractor = Extractor::new().set_extract_string_max_length(1000);
//!     let result = extractor.extract_file_recursive("deck.pptx")?;
//!
//!     println!("{} documents", result.total_count());
//!     for doc in result.embedded_documents() {
//!         println!("{:?}: {}", doc.metadata_value("resourceName"), doc.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | Tree discovery (depth-first, explicit stack) | [`walker`] |
//! | Byte stream to text | [`decoder`] |
//! | Character cap | [`truncate`] |
//! | XHTML wrapping | [`xml`] |
//! | Orchestration | [`engine`] |
//!
//! ## Ordering
//!
//! `documents()[0]` is always the container. A parent is finalized before its
//! children, and a parent's whole subtree precedes its next sibling. The same
//! input and options always produce the same documents in the same order.
//!
//! ## Error Handling
//!
//! Every failure aborts the call with an [`ExtractError`]; callers branch on
//! [`ExtractError::kind`]:
//!
//! ```rust,ignore
//! use docwalk_core::{ErrorKind, ExtractError};
//!
//! match result {
//!     Err(e) if e.kind() == ErrorKind::EmptyInput => println!("empty file"),
//!     Err(e) => println!("failed: {e}"),
//!     Ok(set) => println!("{}", set.total_count()),
//! }
//! ```

pub mod backend;
pub mod decoder;
pub mod document;
pub mod engine;
pub mod error;
pub mod source;
pub mod truncate;
pub mod walker;
pub mod xml;

pub use backend::{BackendFailure, BackendResult, ParsedNode, ParserBackend};
pub use decoder::{StreamDecoder, DEFAULT_READ_BUFFER_SIZE};
pub use document::{keys, Document, Metadata, ResultSet};
pub use engine::{ExtractionEngine, ExtractionOptions};
pub use error::{ErrorKind, ExtractError, Result, EMPTY_INPUT_MESSAGE};
pub use source::ByteSource;
pub use truncate::Truncator;
pub use walker::{ContainerWalker, NodeInfo, TreeNode, WalkPolicy};
pub use xml::{extract_body_text, XmlFormatter};
