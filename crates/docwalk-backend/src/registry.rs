//! Format dispatch
//!
//! [`AutoDetectBackend`] sniffs every node's bytes with
//! [`InputFormat::detect`] and hands it to the matching backend, so one
//! walker can descend from a PDF into a ZIP into a DOCX.

use crate::archive::{GzipBackend, TarBackend, ZipBackend};
use crate::binary::BinaryBackend;
use crate::epub::EpubBackend;
use crate::format::InputFormat;
use crate::legacy::DocBackend;
use crate::ooxml::{OoxmlBackend, OoxmlKind};
use crate::opendocument::OdfBackend;
use crate::pdf::PdfBackend;
use crate::text::TextBackend;
use docwalk_core::backend::{BackendResult, ParsedNode, ParserBackend};
use docwalk_core::document::keys;
use docwalk_core::ByteSource;
use log::debug;

static TEXT: TextBackend = TextBackend::new();
static BINARY: BinaryBackend = BinaryBackend::new();
static ZIP: ZipBackend = ZipBackend;
static TAR: TarBackend = TarBackend;
static GZIP: GzipBackend = GzipBackend;
static DOCX: OoxmlBackend = OoxmlBackend::new(OoxmlKind::Docx);
static PPTX: OoxmlBackend = OoxmlBackend::new(OoxmlKind::Pptx);
static XLSX: OoxmlBackend = OoxmlBackend::new(OoxmlKind::Xlsx);
static ODF: OdfBackend = OdfBackend::new();
static EPUB: EpubBackend = EpubBackend::new();
static PDF: PdfBackend = PdfBackend::new();
static DOC: DocBackend = DocBackend::new();

/// Backend that detects each node's format and delegates to the matching
/// concrete backend.
///
/// The delegate's name is recorded in `X-Docwalk:Parsed-By`. Unless the
/// delegate already set one, `Content-Type` is the media type the parent
/// container declared for the source, or the detected one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AutoDetectBackend;

impl AutoDetectBackend {
    /// Create the auto-detecting backend
    #[inline]
    #[must_use = "creates auto-detecting backend"]
    pub const fn new() -> Self {
        Self
    }

    /// Concrete backend for a detected format
    #[must_use = "returns the backend for the format"]
    pub fn backend_for(format: InputFormat) -> &'static dyn ParserBackend {
        match format {
            InputFormat::Text => &TEXT,
            InputFormat::Zip => &ZIP,
            InputFormat::Tar => &TAR,
            InputFormat::Gzip => &GZIP,
            InputFormat::Docx => &DOCX,
            InputFormat::Pptx => &PPTX,
            InputFormat::Xlsx => &XLSX,
            InputFormat::Odt | InputFormat::Ods | InputFormat::Odp => &ODF,
            InputFormat::Epub => &EPUB,
            InputFormat::Pdf => &PDF,
            InputFormat::Doc => &DOC,
            InputFormat::Png
            | InputFormat::Jpeg
            | InputFormat::Gif
            | InputFormat::Bmp
            | InputFormat::Tiff
            | InputFormat::Binary => &BINARY,
        }
    }
}

impl ParserBackend for AutoDetectBackend {
    fn name(&self) -> &str {
        "auto"
    }

    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
        let format = InputFormat::detect(source.name(), source.bytes());
        let backend = Self::backend_for(format);
        debug!(
            "Detected {format} for {}, parsing with {}",
            source.name().unwrap_or("<bytes>"),
            backend.name()
        );

        let mut node = backend.parse(source)?;
        let metadata = node.metadata_mut();
        metadata.insert(keys::PARSED_BY.to_string(), vec![backend.name().to_string()]);
        // Backend value, then the type the parent declared, then the sniffed one
        let declared = source.content_type().unwrap_or_else(|| format.mime_type());
        metadata
            .entry(keys::CONTENT_TYPE.to_string())
            .or_insert_with(|| vec![declared.to_string()]);
        Ok(node)
    }
}
