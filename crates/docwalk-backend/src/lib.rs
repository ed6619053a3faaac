//! Format backends and the [`Extractor`] entry point for docwalk
//!
//! This crate plugs concrete format parsers into the recursive engine from
//! `docwalk-core`. Every backend implements [`ParserBackend`]: it turns one
//! node's bytes into a text stream, a metadata map and an ordered list of
//! embedded child sources.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Extractor                           │
//! │   (immutable config: max length, XML, depth, error policy)   │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │              ExtractionEngine (docwalk-core)                 │
//! │      walk → decode → truncate → XHTML → ResultSet            │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     AutoDetectBackend                        │
//! │          InputFormat::detect(name, bytes) per node           │
//! └──────────────────────────────────────────────────────────────┘
//!        │            │            │            │           │
//!        ▼            ▼            ▼            ▼           ▼
//!    OOXML/ODF      EPUB          PDF       DOC (OLE2)   ZIP/TAR/GZ
//! ```
//!
//! # Supported Formats
//!
//! | Format | Backend | Children |
//! |--------|---------|----------|
//! | Plain text | [`TextBackend`] | none |
//! | ZIP | [`ZipBackend`] | file entries |
//! | TAR, TAR.GZ | [`TarBackend`] | file entries |
//! | GZIP | [`GzipBackend`] | the decompressed member |
//! | DOCX/PPTX/XLSX | [`OoxmlBackend`] | `media/` and `embeddings/` parts |
//! | ODT/ODS/ODP | [`OdfBackend`] | `Pictures/` entries |
//! | EPUB | [`EpubBackend`] | image manifest items |
//! | PDF | [`PdfBackend`] | attached files |
//! | DOC | [`DocBackend`] | `ObjectPool` objects |
//! | Images, other | [`BinaryBackend`] | none |
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use docwalk_backend::Extractor;
//!
//! let result = Extractor::new().extract_file_recursive("deck.pptx")?;
//! let container = result.container().expect("successful extraction has a container");
//! println!("{}", container.content);
//! for doc in result.embedded_documents() {
//!     println!("embedded: {:?}", doc.metadata_value("resourceName"));
//! }
//! # Ok::<(), docwalk_core::ExtractError>(())
//! ```

pub mod archive;
pub mod binary;
pub mod epub;
pub mod error;
pub mod extractor;
pub mod format;
pub mod legacy;
pub mod ooxml;
pub mod opendocument;
pub mod pdf;
pub mod registry;
pub mod text;
pub mod xml_utils;

pub use archive::{sanitize_path, GzipBackend, TarBackend, ZipBackend, MAX_FILE_SIZE};
pub use binary::BinaryBackend;
pub use docwalk_core::{
    Document, ErrorKind, ExtractError, ExtractionOptions, Metadata, ParserBackend, ResultSet,
};
pub use epub::EpubBackend;
pub use error::BackendError;
pub use extractor::Extractor;
pub use format::InputFormat;
pub use legacy::DocBackend;
pub use ooxml::{OoxmlBackend, OoxmlKind};
pub use opendocument::OdfBackend;
pub use pdf::PdfBackend;
pub use registry::AutoDetectBackend;
pub use text::TextBackend;
