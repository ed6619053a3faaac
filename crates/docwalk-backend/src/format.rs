//! Input format detection
//!
//! Detection order: magic bytes (sniffing inside ZIP and OLE2 containers to
//! tell office formats apart), then the file extension, then a plain-text
//! heuristic. Anything left over is opaque binary.

use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

/// ZIP local file header
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// ZIP end of central directory (archive with no entries)
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
/// PDF header
const PDF_MAGIC: &[u8] = b"%PDF-";
/// OLE2 compound file signature
pub(crate) const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
/// Gzip magic bytes (RFC 1952)
pub(crate) const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
/// POSIX tar magic, found at offset 257
const USTAR_MAGIC: &[u8] = b"ustar";
const USTAR_OFFSET: usize = 257;

/// Bytes inspected by the plain-text heuristic
const TEXT_SAMPLE_SIZE: usize = 8192;

/// Formats docwalk can route to a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InputFormat {
    /// Plain text
    Text,
    /// ZIP archive
    Zip,
    /// TAR archive
    Tar,
    /// Gzip stream (possibly a compressed TAR)
    Gzip,
    /// Microsoft Word (.docx)
    Docx,
    /// Microsoft `PowerPoint` (.pptx)
    Pptx,
    /// Microsoft Excel (.xlsx)
    Xlsx,
    /// `OpenDocument` Text
    Odt,
    /// `OpenDocument` Spreadsheet
    Ods,
    /// `OpenDocument` Presentation
    Odp,
    /// EPUB e-book
    Epub,
    /// PDF document
    Pdf,
    /// Microsoft Word 97-2003 (.doc)
    Doc,
    /// PNG image
    Png,
    /// JPEG image
    Jpeg,
    /// GIF image
    Gif,
    /// Windows bitmap
    Bmp,
    /// TIFF image
    Tiff,
    /// Anything else
    Binary,
}

impl InputFormat {
    /// Detect the format of `bytes`, using `name` for the extension fallback.
    #[must_use = "returns the detected format"]
    pub fn detect(name: Option<&str>, bytes: &[u8]) -> Self {
        let extension = name.and_then(|n| {
            Path::new(n)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_lowercase)
        });
        let by_extension = extension.as_deref().and_then(Self::from_extension);

        if let Some(format) = Self::from_magic_bytes(bytes, by_extension) {
            return format;
        }
        if let Some(format) = by_extension {
            return format;
        }
        if looks_like_text(bytes) {
            Self::Text
        } else {
            Self::Binary
        }
    }

    /// Detect format from file extension
    #[inline]
    #[must_use = "detects format from file extension"]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "text" | "md" | "csv" | "tsv" | "log" | "json" | "xml" | "html" | "htm" => {
                Some(Self::Text)
            }
            "zip" | "jar" => Some(Self::Zip),
            "tar" => Some(Self::Tar),
            "gz" | "tgz" => Some(Self::Gzip),
            "docx" | "docm" => Some(Self::Docx),
            "pptx" | "pptm" => Some(Self::Pptx),
            "xlsx" | "xlsm" => Some(Self::Xlsx),
            "odt" => Some(Self::Odt),
            "ods" => Some(Self::Ods),
            "odp" => Some(Self::Odp),
            "epub" => Some(Self::Epub),
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    /// Detect format from leading bytes.
    ///
    /// `hint` is the extension-based guess, used when a ZIP cannot be sniffed.
    #[must_use = "returns the detected format"]
    pub fn from_magic_bytes(bytes: &[u8], hint: Option<Self>) -> Option<Self> {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC) {
            return Some(sniff_zip(bytes).unwrap_or(match hint {
                Some(format) if format.is_zip_based() => format,
                _ => Self::Zip,
            }));
        }
        if bytes.starts_with(PDF_MAGIC) {
            return Some(Self::Pdf);
        }
        if bytes.starts_with(&OLE2_MAGIC) {
            return Some(if is_word_document(bytes) {
                Self::Doc
            } else {
                Self::Binary
            });
        }
        if bytes.starts_with(&GZIP_MAGIC) {
            return Some(Self::Gzip);
        }
        if bytes.len() >= USTAR_OFFSET + USTAR_MAGIC.len()
            && &bytes[USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len()] == USTAR_MAGIC
        {
            return Some(Self::Tar);
        }
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(Self::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }
        if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            return Some(Self::Tiff);
        }
        if bytes.starts_with(b"BM") && bytes.len() >= 26 && hint == Some(Self::Bmp) {
            return Some(Self::Bmp);
        }
        None
    }

    /// Media type reported in `Content-Type` metadata
    #[inline]
    #[must_use = "returns the media type"]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Zip => "application/zip",
            Self::Tar => "application/x-tar",
            Self::Gzip => "application/gzip",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Odt => "application/vnd.oasis.opendocument.text",
            Self::Ods => "application/vnd.oasis.opendocument.spreadsheet",
            Self::Odp => "application/vnd.oasis.opendocument.presentation",
            Self::Epub => "application/epub+zip",
            Self::Pdf => "application/pdf",
            Self::Doc => "application/msword",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Binary => "application/octet-stream",
        }
    }

    /// Whether the format is stored in a ZIP container
    #[inline]
    #[must_use = "checks for a ZIP-based format"]
    pub const fn is_zip_based(&self) -> bool {
        matches!(
            self,
            Self::Zip
                | Self::Docx
                | Self::Pptx
                | Self::Xlsx
                | Self::Odt
                | Self::Ods
                | Self::Odp
                | Self::Epub
        )
    }

    /// Whether the format is a raster image
    #[inline]
    #[must_use = "checks for an image format"]
    pub const fn is_image(&self) -> bool {
        matches!(
            self,
            Self::Png | Self::Jpeg | Self::Gif | Self::Bmp | Self::Tiff
        )
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Text => "TEXT",
            Self::Zip => "ZIP",
            Self::Tar => "TAR",
            Self::Gzip => "GZIP",
            Self::Docx => "DOCX",
            Self::Pptx => "PPTX",
            Self::Xlsx => "XLSX",
            Self::Odt => "ODT",
            Self::Ods => "ODS",
            Self::Odp => "ODP",
            Self::Epub => "EPUB",
            Self::Pdf => "PDF",
            Self::Doc => "DOC",
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Gif => "GIF",
            Self::Bmp => "BMP",
            Self::Tiff => "TIFF",
            Self::Binary => "BINARY",
        };
        f.write_str(name)
    }
}

/// Tell ZIP-based formats apart by their marker entries.
fn sniff_zip(bytes: &[u8]) -> Option<InputFormat> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).ok()?;

    // ODF and EPUB store their media type uncompressed in `mimetype`.
    if let Ok(mut entry) = archive.by_name("mimetype") {
        let mut mimetype = String::new();
        if entry.read_to_string(&mut mimetype).is_ok() {
            match mimetype.trim() {
                "application/epub+zip" => return Some(InputFormat::Epub),
                "application/vnd.oasis.opendocument.text" => return Some(InputFormat::Odt),
                "application/vnd.oasis.opendocument.spreadsheet" => {
                    return Some(InputFormat::Ods)
                }
                "application/vnd.oasis.opendocument.presentation" => {
                    return Some(InputFormat::Odp)
                }
                _ => {}
            }
        }
    }

    let has = |name: &str| archive.file_names().any(|n| n == name);
    if has("[Content_Types].xml") {
        if has("word/document.xml") {
            return Some(InputFormat::Docx);
        }
        if has("ppt/presentation.xml") {
            return Some(InputFormat::Pptx);
        }
        if has("xl/workbook.xml") {
            return Some(InputFormat::Xlsx);
        }
    }
    Some(InputFormat::Zip)
}

fn is_word_document(bytes: &[u8]) -> bool {
    cfb::CompoundFile::open(Cursor::new(bytes))
        .map(|comp| comp.is_stream("/WordDocument"))
        .unwrap_or(false)
}

/// Heuristic: BOM-marked UTF-16, or a sample free of NUL bytes with few
/// control characters.
fn looks_like_text(bytes: &[u8]) -> bool {
    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        return true;
    }
    let sample = &bytes[..bytes.len().min(TEXT_SAMPLE_SIZE)];
    if sample.contains(&0) {
        return false;
    }
    let controls = sample
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0C | 0x1B))
        .count();
    controls * 10 <= sample.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(InputFormat::from_extension("PDF"), Some(InputFormat::Pdf));
        assert_eq!(InputFormat::from_extension("pptx"), Some(InputFormat::Pptx));
        assert_eq!(InputFormat::from_extension("tgz"), Some(InputFormat::Gzip));
        assert_eq!(InputFormat::from_extension("unknown"), None);
    }

    #[test]
    fn test_detect_pdf_by_magic() {
        assert_eq!(
            InputFormat::detect(Some("renamed.txt"), b"%PDF-1.7\n..."),
            InputFormat::Pdf
        );
    }

    #[test]
    fn test_detect_zip_family() {
        let epub = zip_with(&[("mimetype", b"application/epub+zip")]);
        assert_eq!(InputFormat::detect(None, &epub), InputFormat::Epub);

        let odt = zip_with(&[("mimetype", b"application/vnd.oasis.opendocument.text")]);
        assert_eq!(InputFormat::detect(None, &odt), InputFormat::Odt);

        let pptx = zip_with(&[
            ("[Content_Types].xml", b"<Types/>"),
            ("ppt/presentation.xml", b"<p:presentation/>"),
        ]);
        assert_eq!(InputFormat::detect(Some("deck.bin"), &pptx), InputFormat::Pptx);

        let plain = zip_with(&[("a.txt", b"hello")]);
        assert_eq!(InputFormat::detect(Some("a.zip"), &plain), InputFormat::Zip);
    }

    #[test]
    fn test_detect_corrupt_zip_uses_extension_hint() {
        let bytes = b"PK\x03\x04 definitely not a zip";
        assert_eq!(
            InputFormat::detect(Some("report.docx"), bytes),
            InputFormat::Docx
        );
        assert_eq!(InputFormat::detect(Some("data.bin"), bytes), InputFormat::Zip);
    }

    #[test]
    fn test_detect_text_and_binary() {
        assert_eq!(InputFormat::detect(None, b"just words\n"), InputFormat::Text);
        assert_eq!(
            InputFormat::detect(None, &[0x00, 0x01, 0x02, 0x03]),
            InputFormat::Binary
        );
        assert_eq!(
            InputFormat::detect(Some("notes.txt"), "caf\u{e9}".as_bytes()),
            InputFormat::Text
        );
    }

    #[test]
    fn test_detect_tar_by_magic() {
        let mut bytes = vec![0u8; 512];
        bytes[..5].copy_from_slice(b"a.txt");
        bytes[257..262].copy_from_slice(b"ustar");
        assert_eq!(InputFormat::detect(None, &bytes), InputFormat::Tar);
    }

    #[test]
    fn test_detect_images() {
        assert_eq!(
            InputFormat::detect(None, b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"),
            InputFormat::Png
        );
        assert_eq!(InputFormat::detect(None, b"GIF89a...."), InputFormat::Gif);
        assert!(InputFormat::Png.is_image());
        assert!(!InputFormat::Pdf.is_image());
    }

    #[test]
    fn test_mime_and_display() {
        assert_eq!(InputFormat::Epub.mime_type(), "application/epub+zip");
        assert_eq!(InputFormat::Docx.to_string(), "DOCX");
        assert!(InputFormat::Odp.is_zip_based());
    }

    #[test]
    fn test_serde_uses_display_names() {
        assert_eq!(serde_json::to_string(&InputFormat::Pptx).unwrap(), "\"PPTX\"");
        let parsed: InputFormat = serde_json::from_str("\"TAR\"").unwrap();
        assert_eq!(parsed, InputFormat::Tar);
    }
}
