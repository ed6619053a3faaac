//! Archive backends (ZIP, TAR, GZIP)
//!
//! An archive node's content is its list of entry names, one per line. Every
//! regular file entry becomes an embedded child, in archive order. Entries
//! whose path escapes the archive root or whose size exceeds
//! [`MAX_FILE_SIZE`] are skipped with a warning.

use crate::error::{BackendError, Result};
use crate::format::GZIP_MAGIC;
use docwalk_core::backend::{BackendResult, ParsedNode, ParserBackend};
use docwalk_core::document::{set_value, Metadata};
use docwalk_core::ByteSource;
use flate2::read::GzDecoder;
use log::warn;
use std::io::{Cursor, Read, Seek};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use zip::ZipArchive;

/// Largest single entry read into memory (100 MB)
pub const MAX_FILE_SIZE: u64 = 100_000_000;

/// POSIX tar magic offset inside the first header block
const USTAR_OFFSET: usize = 257;

/// Sanitize a path to prevent path traversal attacks (e.g., ../../../etc/passwd)
///
/// Keeps only normal components, dropping `..`, `.`, roots and drive
/// prefixes. Returns `None` if nothing is left.
#[inline]
#[must_use = "returns the sanitized path"]
pub fn sanitize_path(path: &Path) -> Option<PathBuf> {
    let mut sanitized = PathBuf::new();
    for component in path.components() {
        if let Component::Normal(part) = component {
            sanitized.push(part);
        }
    }
    if sanitized.as_os_str().is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Check an entry path and size; returns the sanitized name if admitted.
pub(crate) fn admit_entry(raw_name: &str, size: u64) -> Option<String> {
    let path = Path::new(raw_name);
    let escapes = path.components().any(|c| {
        matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
    });
    let Some(sanitized) = sanitize_path(path).filter(|_| !escapes) else {
        warn!("Skipping invalid path: {raw_name} (path traversal attempt or empty)");
        return None;
    };
    let name = sanitized.to_string_lossy().replace('\\', "/");
    if size > MAX_FILE_SIZE {
        warn!("Skipping large file: {name} ({size} bytes exceeds {MAX_FILE_SIZE} bytes limit)");
        return None;
    }
    Some(name)
}

/// Admitted entries of one archive
#[derive(Debug, Default)]
struct Listing {
    names: Vec<String>,
    entries: Vec<ByteSource>,
}

impl Listing {
    fn push(&mut self, name: String, contents: Vec<u8>) {
        self.names.push(name.clone());
        self.entries.push(ByteSource::new(contents).with_name(name));
    }

    fn into_node(self) -> ParsedNode {
        let mut metadata = Metadata::new();
        set_value(&mut metadata, "meta:entry-count", self.entries.len().to_string());
        ParsedNode::from_text(self.names.join("\n"))
            .with_metadata(metadata)
            .with_embedded(self.entries)
    }
}

/// Read bounded contents of one entry
pub(crate) fn read_bounded<R: Read>(reader: R, declared: u64) -> Result<Vec<u8>> {
    let capacity = usize::try_from(declared.min(MAX_FILE_SIZE)).unwrap_or(0);
    let mut contents = Vec::with_capacity(capacity);
    reader.take(MAX_FILE_SIZE + 1).read_to_end(&mut contents)?;
    if contents.len() as u64 > MAX_FILE_SIZE {
        return Err(BackendError::InvalidStructure(format!(
            "entry inflates beyond {MAX_FILE_SIZE} bytes"
        )));
    }
    Ok(contents)
}

/// List and read a ZIP archive.
///
/// # Errors
///
/// Returns [`BackendError::PasswordProtected`] if any file entry is encrypted,
/// or a ZIP error if the archive is corrupt.
fn read_zip(bytes: &[u8]) -> Result<Listing> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut listing = Listing::default();

    for i in 0..archive.len() {
        let (raw_name, size, is_dir, encrypted) = {
            let file = archive.by_index_raw(i)?;
            (file.name().to_string(), file.size(), file.is_dir(), file.encrypted())
        };
        if is_dir {
            continue;
        }
        if encrypted {
            return Err(BackendError::PasswordProtected);
        }
        let Some(name) = admit_entry(&raw_name, size) else {
            continue;
        };
        let contents = read_bounded(archive.by_index(i)?, size)?;
        listing.push(name, contents);
    }
    Ok(listing)
}

/// Read the file entries of an already opened package whose path matches
/// `wanted`, in archive order.
///
/// Children are named by their file name; `content_type` supplies a type
/// hint per entry path.
pub(crate) fn zip_children<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    wanted: impl Fn(&str) -> bool,
    content_type: impl Fn(&str) -> Option<String>,
) -> Result<Vec<ByteSource>> {
    let mut children = Vec::new();
    for i in 0..archive.len() {
        let (raw_name, size, is_dir) = {
            let file = archive.by_index_raw(i)?;
            (file.name().to_string(), file.size(), file.is_dir())
        };
        if is_dir || !wanted(&raw_name) {
            continue;
        }
        let Some(path) = admit_entry(&raw_name, size) else {
            continue;
        };
        let contents = read_bounded(archive.by_index(i)?, size)?;
        let file_name = path.rsplit('/').next().unwrap_or(&path).to_string();
        let mut child = ByteSource::new(contents).with_name(file_name);
        if let Some(mime) = content_type(&path) {
            child = child.with_content_type(mime);
        }
        children.push(child);
    }
    Ok(children)
}

/// List and read a TAR stream.
fn read_tar<R: Read>(reader: R) -> Result<Listing> {
    let mut archive = Archive::new(reader);
    let mut listing = Listing::default();

    for entry in archive.entries()? {
        let entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let raw_name = entry.path()?.to_string_lossy().into_owned();
        let size = entry.size();
        let Some(name) = admit_entry(&raw_name, size) else {
            continue;
        };
        let contents = read_bounded(entry, size)?;
        listing.push(name, contents);
    }
    Ok(listing)
}

fn is_tar(bytes: &[u8]) -> bool {
    bytes.get(USTAR_OFFSET..USTAR_OFFSET + 5) == Some(b"ustar".as_slice())
}

/// Backend for ZIP archives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ZipBackend;

impl ParserBackend for ZipBackend {
    fn name(&self) -> &str {
        "zip"
    }

    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
        Ok(read_zip(source.bytes())?.into_node())
    }
}

/// Backend for TAR archives, plain or gzip compressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TarBackend;

impl ParserBackend for TarBackend {
    fn name(&self) -> &str {
        "tar"
    }

    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
        let bytes = source.bytes();
        let listing = if bytes.starts_with(&GZIP_MAGIC) {
            read_tar(GzDecoder::new(bytes))?
        } else {
            read_tar(bytes)?
        };
        Ok(listing.into_node())
    }
}

/// Backend for single-member gzip streams.
///
/// A compressed TAR is listed like a TAR; anything else yields one child
/// holding the decompressed payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GzipBackend;

impl GzipBackend {
    /// Name of the decompressed member: the final component of the gzip
    /// header's file name, or the source name without its `.gz` suffix.
    fn member_name(header_name: Option<&[u8]>, source_name: Option<&str>) -> String {
        let header_name = header_name
            .map(String::from_utf8_lossy)
            .and_then(|raw| {
                let file_name = sanitize_path(Path::new(&*raw))?
                    .file_name()?
                    .to_string_lossy()
                    .into_owned();
                if file_name != raw {
                    warn!("Gzip member name {raw:?} sanitized to {file_name:?}");
                }
                Some(file_name)
            });
        if let Some(name) = header_name {
            return name;
        }
        match source_name {
            Some(name) if name.to_ascii_lowercase().ends_with(".tgz") => {
                format!("{}.tar", &name[..name.len() - 4])
            }
            Some(name) if name.to_ascii_lowercase().ends_with(".gz") => {
                name[..name.len() - 3].to_string()
            }
            _ => "content".to_string(),
        }
    }
}

impl ParserBackend for GzipBackend {
    fn name(&self) -> &str {
        "gzip"
    }

    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
        let mut decoder = GzDecoder::new(source.bytes());
        let mut payload = Vec::new();
        (&mut decoder)
            .take(MAX_FILE_SIZE + 1)
            .read_to_end(&mut payload)?;
        if payload.len() as u64 > MAX_FILE_SIZE {
            return Err(BackendError::InvalidStructure(format!(
                "gzip member inflates beyond {MAX_FILE_SIZE} bytes"
            ))
            .into());
        }

        if is_tar(&payload) {
            return Ok(read_tar(payload.as_slice())?.into_node());
        }

        let header_name = decoder.header().and_then(|h| h.filename());
        let name = Self::member_name(header_name, source.name());
        let listing = Listing {
            names: vec![name.clone()],
            entries: vec![ByteSource::new(payload).with_name(name)],
        };
        Ok(listing.into_node())
    }
}
