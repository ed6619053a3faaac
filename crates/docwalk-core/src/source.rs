//! Byte sources: the root input and every embedded child a backend reports.

use crate::error::{ExtractError, Result};
use std::fmt;
use std::fs;
use std::path::Path;

/// An in-memory byte source for one document tree node.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteSource {
    name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

impl ByteSource {
    /// Wrap raw bytes
    #[inline]
    #[must_use = "creates a byte source"]
    pub const fn new(data: Vec<u8>) -> Self {
        Self {
            name: None,
            content_type: None,
            data,
        }
    }

    /// Read a file into a byte source.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::SourceUnavailable`] if the path cannot be opened
    /// or is not a regular file, and [`ExtractError::EmptyInput`] if the file
    /// exists but has zero length.
    pub fn from_path(path: &Path) -> Result<Self> {
        let unavailable = |source: std::io::Error| ExtractError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        };

        let meta = fs::metadata(path).map_err(unavailable)?;
        if !meta.is_file() {
            return Err(unavailable(std::io::Error::other("not a regular file")));
        }
        if meta.len() == 0 {
            return Err(ExtractError::EmptyInput);
        }

        let data = fs::read(path).map_err(unavailable)?;
        let mut source = Self::new(data);
        source.name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(source)
    }

    /// Attach a resource name (file name or archive entry name)
    #[inline]
    #[must_use = "returns the named byte source"]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a media type hint reported by the parent container
    #[inline]
    #[must_use = "returns the byte source with a media type hint"]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Resource name, if known
    #[inline]
    #[must_use = "returns the resource name"]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Media type hint, if the parent container declared one
    #[inline]
    #[must_use = "returns the media type hint"]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Raw bytes
    #[inline]
    #[must_use = "returns the raw bytes"]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length in bytes
    #[inline]
    #[must_use = "returns the byte length"]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the source holds zero bytes
    #[inline]
    #[must_use = "checks for an empty source"]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSource")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn temp_path(label: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("docwalk-source-{label}-{}", std::process::id()))
    }

    #[test]
    fn test_from_path_reads_bytes_and_name() {
        let path = temp_path("notes.txt");
        fs::write(&path, b"hello").unwrap();

        let source = ByteSource::from_path(&path).unwrap();
        assert_eq!(source.bytes(), b"hello");
        assert_eq!(source.len(), 5);
        assert!(source.name().unwrap().starts_with("docwalk-source-notes.txt"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_from_path_empty_file() {
        let path = temp_path("empty");
        fs::write(&path, b"").unwrap();

        let err = ByteSource::from_path(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
        assert!(err.to_string().contains("InputStream must have > 0 bytes"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = ByteSource::from_path(Path::new("definitely/not/here.docx")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    }

    #[test]
    fn test_from_path_directory() {
        let err = ByteSource::from_path(&std::env::temp_dir()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    }

    #[test]
    fn test_debug_hides_payload() {
        let source = ByteSource::new(vec![0u8; 1024]).with_name("blob.bin");
        let debug = format!("{source:?}");
        assert!(debug.contains("blob.bin"));
        assert!(debug.contains("1024"));
    }
}
