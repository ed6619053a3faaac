//! Error types for recursive extraction.
//!
//! Every failure aborts the whole extraction call: there is no partial
//! [`ResultSet`](crate::ResultSet). Callers branch on [`ExtractError::kind`]
//! rather than matching message text.
//!
//! # Examples
//!
//! ```rust,ignore
//! use docwalk_backend::Extractor;
//! use docwalk_core::ErrorKind;
//!
//! match Extractor::new().extract_file_recursive("report.pdf") {
//!     Ok(result) => println!("{} documents", result.total_count()),
//!     Err(e) if e.kind() == ErrorKind::SourceUnavailable => eprintln!("cannot open: {e}"),
//!     Err(e) => eprintln!("extraction failed: {e}"),
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Message carried by [`ExtractError::EmptyInput`].
///
/// Existing consumers look for this exact substring, keep it stable.
pub const EMPTY_INPUT_MESSAGE: &str = "InputStream must have > 0 bytes";

/// Error taxonomy of the extraction engine.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The root byte source has zero length. Raised before any parsing.
    #[error("Empty input: {}", EMPTY_INPUT_MESSAGE)]
    EmptyInput,

    /// The path could not be opened (missing file, permissions, directory).
    #[error("Source unavailable: {}: {source}", path.display())]
    SourceUnavailable {
        /// Path that failed to resolve
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The content stream ended inside a multi-byte sequence, or carried bytes
    /// that are not UTF-8 at all.
    #[error("Invalid encoding at byte {offset}: {message}")]
    InvalidEncoding {
        /// Offset of the offending byte within the node's content stream
        offset: usize,
        /// Human-readable description
        message: String,
    },

    /// The format backend rejected a node's bytes.
    #[error("Backend parse failure in {resource}: {message}")]
    BackendParseFailure {
        /// Resource path of the node (`/` for the container)
        resource: String,
        /// Backend error message
        message: String,
    },

    /// The XML formatter could not produce a well-formed fragment.
    #[error("Malformed output: {0}")]
    MalformedOutput(String),
}

/// Category of an [`ExtractError`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`ExtractError::EmptyInput`]
    EmptyInput,
    /// See [`ExtractError::SourceUnavailable`]
    SourceUnavailable,
    /// See [`ExtractError::InvalidEncoding`]
    InvalidEncoding,
    /// See [`ExtractError::BackendParseFailure`]
    BackendParseFailure,
    /// See [`ExtractError::MalformedOutput`]
    MalformedOutput,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EmptyInput => "EmptyInput",
            Self::SourceUnavailable => "SourceUnavailable",
            Self::InvalidEncoding => "InvalidEncoding",
            Self::BackendParseFailure => "BackendParseFailure",
            Self::MalformedOutput => "MalformedOutput",
        };
        f.write_str(name)
    }
}

impl ExtractError {
    /// Category of this error
    #[inline]
    #[must_use = "returns the error category"]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::InvalidEncoding { .. } => ErrorKind::InvalidEncoding,
            Self::BackendParseFailure { .. } => ErrorKind::BackendParseFailure,
            Self::MalformedOutput(_) => ErrorKind::MalformedOutput,
        }
    }

    /// Build a [`ExtractError::BackendParseFailure`] for a resource
    #[inline]
    pub fn backend(resource: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::BackendParseFailure {
            resource: resource.into(),
            message: message.to_string(),
        }
    }
}

impl From<quick_xml::Error> for ExtractError {
    #[inline]
    fn from(err: quick_xml::Error) -> Self {
        Self::MalformedOutput(err.to_string())
    }
}

/// Type alias for [`Result<T, ExtractError>`].
pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_message() {
        let display = ExtractError::EmptyInput.to_string();
        assert!(display.contains("InputStream must have > 0 bytes"));
        assert_eq!(ExtractError::EmptyInput.kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn test_source_unavailable_display() {
        let error = ExtractError::SourceUnavailable {
            path: PathBuf::from("missing.docx"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let display = format!("{error}");
        assert!(display.contains("missing.docx"));
        assert!(display.contains("not found"));
        assert_eq!(error.kind(), ErrorKind::SourceUnavailable);
    }

    #[test]
    fn test_backend_helper() {
        let error = ExtractError::backend("/ppt/media/image1.png", "truncated header");
        match &error {
            ExtractError::BackendParseFailure { resource, message } => {
                assert_eq!(resource, "/ppt/media/image1.png");
                assert_eq!(message, "truncated header");
            }
            _ => panic!("Expected BackendParseFailure"),
        }
        assert_eq!(error.kind().to_string(), "BackendParseFailure");
    }

    #[test]
    fn test_error_size() {
        let size = std::mem::size_of::<ExtractError>();
        assert!(
            size < 128,
            "ExtractError size is {size} bytes, consider boxing large variants"
        );
    }
}
