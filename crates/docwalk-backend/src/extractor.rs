//! Extractor - the public entry point
//!
//! An [`Extractor`] is an immutable configuration value. Every `set_*`
//! method consumes it and returns a new one, so an extractor can be shared
//! freely between threads and reused across calls.

use crate::registry::AutoDetectBackend;
use docwalk_core::engine::{ExtractionEngine, ExtractionOptions};
use docwalk_core::walker::{WalkPolicy, DEFAULT_MAX_DEPTH, DEFAULT_MAX_EMBEDDED_SIZE};
use docwalk_core::{ByteSource, ParserBackend, Result, ResultSet, DEFAULT_READ_BUFFER_SIZE};
use std::path::Path;
use std::sync::Arc;

/// Recursive document extractor
///
/// # Examples
///
/// ```rust,no_run
/// use docwalk_backend::Extractor;
///
/// let extractor = Extractor::new().set_extract_string_max_length(500);
/// let result = extractor.extract_file_recursive("report.docx")?;
/// assert_eq!(result.embedded_documents().len(), result.total_count() - 1);
/// # Ok::<(), docwalk_core::ExtractError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Extractor {
    backend: Arc<dyn ParserBackend>,
    string_max_length: Option<usize>,
    xml_output: bool,
    catch_embedded_errors: bool,
    max_embedded_depth: usize,
    max_embedded_size: u64,
    read_buffer_size: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    /// Extractor with format auto-detection and default limits
    #[must_use = "creates an extractor"]
    pub fn new() -> Self {
        Self::with_backend(Arc::new(AutoDetectBackend::new()))
    }

    /// Extractor driving a custom backend
    #[must_use = "creates an extractor"]
    pub fn with_backend(backend: Arc<dyn ParserBackend>) -> Self {
        Self {
            backend,
            string_max_length: None,
            xml_output: false,
            catch_embedded_errors: false,
            max_embedded_depth: DEFAULT_MAX_DEPTH,
            max_embedded_size: DEFAULT_MAX_EMBEDDED_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Default character cap for every extracted document
    #[inline]
    #[must_use = "returns a new extractor"]
    pub fn set_extract_string_max_length(self, max_length: usize) -> Self {
        Self {
            string_max_length: Some(max_length),
            ..self
        }
    }

    /// Default for XHTML-wrapped output
    #[inline]
    #[must_use = "returns a new extractor"]
    pub fn set_xml_output(self, xml_output: bool) -> Self {
        Self { xml_output, ..self }
    }

    /// Record failed embedded documents instead of aborting the whole call
    #[inline]
    #[must_use = "returns a new extractor"]
    pub fn set_catch_embedded_errors(self, catch_embedded_errors: bool) -> Self {
        Self {
            catch_embedded_errors,
            ..self
        }
    }

    /// Deepest nesting level visited (the container is depth 0)
    #[inline]
    #[must_use = "returns a new extractor"]
    pub fn set_max_embedded_depth(self, max_embedded_depth: usize) -> Self {
        Self {
            max_embedded_depth,
            ..self
        }
    }

    /// Largest embedded source, in bytes, that is parsed
    #[inline]
    #[must_use = "returns a new extractor"]
    pub fn set_max_embedded_size(self, max_embedded_size: u64) -> Self {
        Self {
            max_embedded_size,
            ..self
        }
    }

    /// Chunk size used when draining content streams
    #[inline]
    #[must_use = "returns a new extractor"]
    pub fn set_read_buffer_size(self, read_buffer_size: usize) -> Self {
        Self {
            read_buffer_size: read_buffer_size.max(1),
            ..self
        }
    }

    /// Default character cap, if any
    #[inline]
    #[must_use = "returns the default character cap"]
    pub const fn extract_string_max_length(&self) -> Option<usize> {
        self.string_max_length
    }

    /// Whether output is XHTML-wrapped by default
    #[inline]
    #[must_use = "returns the XML output default"]
    pub const fn xml_output(&self) -> bool {
        self.xml_output
    }

    /// Whether embedded failures are recorded instead of aborting
    #[inline]
    #[must_use = "returns the embedded error policy"]
    pub const fn catch_embedded_errors(&self) -> bool {
        self.catch_embedded_errors
    }

    /// Deepest nesting level visited
    #[inline]
    #[must_use = "returns the depth limit"]
    pub const fn max_embedded_depth(&self) -> usize {
        self.max_embedded_depth
    }

    /// Largest embedded source parsed
    #[inline]
    #[must_use = "returns the size limit"]
    pub const fn max_embedded_size(&self) -> u64 {
        self.max_embedded_size
    }

    /// Backend driven by this extractor
    #[inline]
    #[must_use = "returns the backend"]
    pub fn backend(&self) -> &dyn ParserBackend {
        self.backend.as_ref()
    }

    /// Extract a file and everything embedded in it with default options.
    ///
    /// # Errors
    ///
    /// `SourceUnavailable` if the path cannot be read, `EmptyInput` if the
    /// file is empty, or any error raised while walking the tree.
    pub fn extract_file_recursive(&self, path: impl AsRef<Path>) -> Result<ResultSet> {
        self.extract_file_recursive_opt(path, None, None)
    }

    /// Extract a file with per-call options; `None` falls back to the
    /// extractor's defaults.
    ///
    /// # Errors
    ///
    /// Same as [`Extractor::extract_file_recursive`].
    pub fn extract_file_recursive_opt(
        &self,
        path: impl AsRef<Path>,
        max_length: Option<usize>,
        as_xml: Option<bool>,
    ) -> Result<ResultSet> {
        let source = ByteSource::from_path(path.as_ref())?;
        self.extract_source(source, &self.resolve_options(max_length, as_xml))
    }

    /// Extract an in-memory document with default options.
    ///
    /// # Errors
    ///
    /// `EmptyInput` if `bytes` is empty, or any error raised while walking
    /// the tree.
    pub fn extract_bytes_recursive(&self, bytes: &[u8]) -> Result<ResultSet> {
        self.extract_bytes_recursive_opt(bytes, None, None)
    }

    /// Extract an in-memory document with per-call options.
    ///
    /// # Errors
    ///
    /// Same as [`Extractor::extract_bytes_recursive`].
    pub fn extract_bytes_recursive_opt(
        &self,
        bytes: &[u8],
        max_length: Option<usize>,
        as_xml: Option<bool>,
    ) -> Result<ResultSet> {
        let source = ByteSource::new(bytes.to_vec());
        self.extract_source(source, &self.resolve_options(max_length, as_xml))
    }

    /// Extract a prepared source with fully resolved options.
    ///
    /// # Errors
    ///
    /// Any [`ExtractError`](docwalk_core::ExtractError) aborts the call.
    pub fn extract_source(
        &self,
        source: ByteSource,
        options: &ExtractionOptions,
    ) -> Result<ResultSet> {
        ExtractionEngine::new(self.backend.as_ref())
            .with_policy(self.walk_policy())
            .with_read_buffer_size(self.read_buffer_size)
            .extract(source, options)
    }

    /// Per-call options with absent values taken from the defaults
    #[must_use = "returns the resolved options"]
    pub fn resolve_options(&self, max_length: Option<usize>, as_xml: Option<bool>) -> ExtractionOptions {
        ExtractionOptions::new(
            max_length.or(self.string_max_length),
            as_xml.unwrap_or(self.xml_output),
        )
    }

    const fn walk_policy(&self) -> WalkPolicy {
        WalkPolicy {
            max_depth: self.max_embedded_depth,
            max_embedded_size: self.max_embedded_size,
            catch_embedded_errors: self.catch_embedded_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docwalk_core::{ErrorKind, EMPTY_INPUT_MESSAGE};

    #[test]
    fn test_setters_return_new_values() {
        let base = Extractor::new();
        let capped = base.clone().set_extract_string_max_length(5);
        assert_eq!(base.extract_string_max_length(), None);
        assert_eq!(capped.extract_string_max_length(), Some(5));
        assert_eq!(capped.max_embedded_depth(), DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_option_resolution() {
        let extractor = Extractor::new()
            .set_extract_string_max_length(10)
            .set_xml_output(true);
        let defaults = extractor.resolve_options(None, None);
        assert_eq!(defaults.max_length, Some(10));
        assert!(defaults.as_xml);

        let overridden = extractor.resolve_options(Some(3), Some(false));
        assert_eq!(overridden.max_length, Some(3));
        assert!(!overridden.as_xml);
    }

    #[test]
    fn test_bytes_entry_point() {
        let result = Extractor::new()
            .extract_bytes_recursive(b"plain words")
            .unwrap();
        assert_eq!(result.total_count(), 1);
        assert_eq!(result.container().unwrap().content, "plain words");
    }

    #[test]
    fn test_empty_bytes() {
        let err = Extractor::new().extract_bytes_recursive(b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
        assert!(err.to_string().contains(EMPTY_INPUT_MESSAGE));
    }

    #[test]
    fn test_extractor_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Extractor>();
    }
}
