//! Error types for format backends

use std::io;
use thiserror::Error;

/// Errors raised while parsing one node's bytes.
///
/// The engine reports every variant as a backend parse failure for the node's
/// resource path.
#[derive(Error, Debug)]
pub enum BackendError {
    /// I/O error while reading an in-memory stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// ZIP container error
    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// PDF parsing error
    #[error("PDF parsing error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// OLE2 compound file error
    #[error("OLE2 compound file error: {0}")]
    Cfb(io::Error),

    /// A part the format requires is absent
    #[error("Missing required part: {0}")]
    MissingPart(String),

    /// Recognised but unsupported input
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// The container structure is inconsistent
    #[error("Invalid document structure: {0}")]
    InvalidStructure(String),

    /// Content is encrypted
    #[error("Document is password-protected")]
    PasswordProtected,
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

impl From<std::string::FromUtf8Error> for BackendError {
    #[inline]
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::InvalidStructure(format!("invalid UTF-8: {err}"))
    }
}

impl From<quick_xml::events::attributes::AttrError> for BackendError {
    #[inline]
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(err.into())
    }
}
