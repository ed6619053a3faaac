//! Legacy Word (.doc) backend over OLE2 compound files
//!
//! Text is reassembled from the piece table in the table stream's CLX.
//! Summary metadata comes from the `\u{5}SummaryInformation` property set;
//! OLE objects under `ObjectPool` are reported as embedded children.

use crate::archive::MAX_FILE_SIZE;
use crate::error::{BackendError, Result};
use crate::xml_utils::format_utc;
use cfb::CompoundFile;
use chrono::DateTime;
use docwalk_core::backend::{BackendResult, ParsedNode, ParserBackend};
use docwalk_core::document::{add_value, set_value, Metadata};
use docwalk_core::ByteSource;
use log::{debug, warn};
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

const WORD_IDENT: u16 = 0xA5EC;
const FLAG_ENCRYPTED: u16 = 0x0100;
const FLAG_WHICH_TABLE: u16 = 0x0200;
/// Index of the fcClx/lcbClx pair in FibRgFcLcb97
const CLX_PAIR_INDEX: usize = 33;
const COMPRESSED_PIECE: u32 = 0x4000_0000;

/// Seconds between 1601-01-01 and the Unix epoch
const FILETIME_EPOCH_OFFSET: i64 = 11_644_473_600;

const VT_I2: u32 = 0x02;
const VT_I4: u32 = 0x03;
const VT_LPSTR: u32 = 0x1E;
const VT_LPWSTR: u32 = 0x1F;
const VT_FILETIME: u32 = 0x40;

/// Windows-1252 code points for bytes 0x80..=0x9F
const CP1252_HIGH: [char; 32] = [
    '\u{20ac}', '\u{81}', '\u{201a}', '\u{192}', '\u{201e}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{2c6}', '\u{2030}', '\u{160}', '\u{2039}', '\u{152}', '\u{8d}', '\u{17d}', '\u{8f}',
    '\u{90}', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{2dc}', '\u{2122}', '\u{161}', '\u{203a}', '\u{153}', '\u{9d}', '\u{17e}', '\u{178}',
];

fn cp1252_char(byte: u8) -> char {
    match byte {
        0x80..=0x9F => CP1252_HIGH[usize::from(byte - 0x80)],
        _ => char::from(byte),
    }
}

fn u16_at(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn u32_at(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

fn truncated(what: &str) -> BackendError {
    BackendError::InvalidStructure(format!("truncated {what}"))
}

/// The fields of the File Information Block the text reader needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fib {
    flags: u16,
    ccp_text: u32,
    fc_clx: u32,
    lcb_clx: u32,
}

impl Fib {
    fn parse(word: &[u8]) -> Result<Self> {
        let ident = u16_at(word, 0).ok_or_else(|| truncated("FIB"))?;
        if ident != WORD_IDENT {
            return Err(BackendError::InvalidStructure(format!(
                "unexpected Word identifier {ident:#06x}"
            )));
        }
        let flags = u16_at(word, 0x0A).ok_or_else(|| truncated("FIB"))?;

        // FibBase (32 bytes), then csw + fibRgW, cslw + fibRgLw, cbRgFcLcb + blob
        let csw = usize::from(u16_at(word, 0x20).ok_or_else(|| truncated("FIB"))?);
        let cslw_at = 0x22 + csw * 2;
        let cslw = usize::from(u16_at(word, cslw_at).ok_or_else(|| truncated("FIB"))?);
        let rg_lw = cslw_at + 2;
        let ccp_text = u32_at(word, rg_lw + 12).ok_or_else(|| truncated("FIB"))?;
        let blob = rg_lw + cslw * 4 + 2;
        let clx_at = blob + CLX_PAIR_INDEX * 8;
        let fc_clx = u32_at(word, clx_at).ok_or_else(|| truncated("FIB"))?;
        let lcb_clx = u32_at(word, clx_at + 4).ok_or_else(|| truncated("FIB"))?;

        Ok(Self {
            flags,
            ccp_text,
            fc_clx,
            lcb_clx,
        })
    }

    const fn encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    const fn table_stream(&self) -> &'static str {
        if self.flags & FLAG_WHICH_TABLE != 0 {
            "/1Table"
        } else {
            "/0Table"
        }
    }
}

/// One run of text from the piece table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Piece {
    cp_start: u32,
    cp_end: u32,
    fc: u32,
}

/// Locate the PlcPcd inside the CLX and read its pieces.
fn piece_table(table: &[u8], fc_clx: u32, lcb_clx: u32) -> Result<Vec<Piece>> {
    let start = fc_clx as usize;
    let end = start + lcb_clx as usize;
    let clx = table.get(start..end).ok_or_else(|| truncated("CLX"))?;

    let mut pos = 0;
    while pos < clx.len() {
        match clx[pos] {
            // Prc: skip the property modifiers
            0x01 => {
                let cb = u16_at(clx, pos + 1).ok_or_else(|| truncated("Prc"))?;
                pos += 3 + usize::from(cb);
            }
            0x02 => {
                let lcb = u32_at(clx, pos + 1).ok_or_else(|| truncated("Pcdt"))? as usize;
                let plc = clx.get(pos + 5..pos + 5 + lcb).ok_or_else(|| truncated("PlcPcd"))?;
                return read_plc_pcd(plc);
            }
            other => {
                return Err(BackendError::InvalidStructure(format!(
                    "unexpected CLX marker {other:#04x}"
                )))
            }
        }
    }
    Err(BackendError::MissingPart("piece table".to_string()))
}

fn read_plc_pcd(plc: &[u8]) -> Result<Vec<Piece>> {
    if plc.len() < 4 {
        return Err(truncated("PlcPcd"));
    }
    let count = (plc.len() - 4) / 12;
    let descriptors = (count + 1) * 4;
    let mut pieces = Vec::with_capacity(count);
    for i in 0..count {
        let cp_start = u32_at(plc, i * 4).ok_or_else(|| truncated("PlcPcd"))?;
        let cp_end = u32_at(plc, (i + 1) * 4).ok_or_else(|| truncated("PlcPcd"))?;
        let fc = u32_at(plc, descriptors + i * 8 + 2).ok_or_else(|| truncated("Pcd"))?;
        pieces.push(Piece {
            cp_start,
            cp_end,
            fc,
        });
    }
    Ok(pieces)
}

/// Decode the main document text (the first `ccp_text` characters).
fn decode_pieces(word: &[u8], pieces: &[Piece], ccp_text: u32) -> String {
    let mut text = String::new();
    for piece in pieces {
        if piece.cp_start >= ccp_text {
            break;
        }
        let count = (piece.cp_end.min(ccp_text)).saturating_sub(piece.cp_start) as usize;
        if piece.fc & COMPRESSED_PIECE != 0 {
            let offset = ((piece.fc & !COMPRESSED_PIECE) / 2) as usize;
            match word.get(offset..offset + count) {
                Some(bytes) => text.extend(bytes.iter().copied().map(cp1252_char)),
                None => warn!("Piece at {offset:#x} runs past the WordDocument stream"),
            }
        } else {
            let offset = piece.fc as usize;
            match word.get(offset..offset + count * 2) {
                Some(bytes) => {
                    let units = bytes
                        .chunks_exact(2)
                        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
                    text.extend(
                        char::decode_utf16(units).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)),
                    );
                }
                None => warn!("Piece at {offset:#x} runs past the WordDocument stream"),
            }
        }
    }
    text
}

/// Map Word control characters to plain text.
///
/// Paragraph, line and page breaks become newlines; cell marks become tabs.
/// Field instructions are dropped and field results kept.
fn clean_text(raw: &str) -> String {
    // one entry per open field: true while still in the instruction part
    let mut fields: Vec<bool> = Vec::new();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\u{13}' => fields.push(true),
            '\u{14}' => {
                if let Some(in_instruction) = fields.last_mut() {
                    *in_instruction = false;
                }
            }
            '\u{15}' => {
                fields.pop();
            }
            _ if fields.iter().any(|&in_instruction| in_instruction) => {}
            '\r' | '\u{0b}' | '\u{0c}' => out.push('\n'),
            '\u{07}' => out.push('\t'),
            '\u{1e}' => out.push('-'),
            c if c.is_control() && c != '\t' && c != '\n' => {}
            c => out.push(c),
        }
    }
    let trimmed = out.trim_end_matches('\n');
    trimmed.to_string()
}

fn read_stream<F: Read + Seek>(comp: &mut CompoundFile<F>, path: &str) -> Result<Vec<u8>> {
    if !comp.is_stream(path) {
        return Err(BackendError::MissingPart(path.trim_start_matches('/').to_string()));
    }
    let mut stream = comp.open_stream(path).map_err(BackendError::Cfb)?;
    let mut bytes = Vec::new();
    stream
        .by_ref()
        .take(MAX_FILE_SIZE + 1)
        .read_to_end(&mut bytes)
        .map_err(BackendError::Cfb)?;
    if bytes.len() as u64 > MAX_FILE_SIZE {
        return Err(BackendError::InvalidStructure(format!(
            "stream {path} exceeds {MAX_FILE_SIZE} bytes"
        )));
    }
    Ok(bytes)
}

/// Read the summary information property set into `metadata`.
fn summary_metadata(stream: &[u8], metadata: &mut Metadata) -> Result<()> {
    let section = u32_at(stream, 44).ok_or_else(|| truncated("property set"))? as usize;
    let count = u32_at(stream, section + 4).ok_or_else(|| truncated("property section"))? as usize;

    let mut properties = Vec::with_capacity(count.min(256));
    for i in 0..count.min(256) {
        let entry = section + 8 + i * 8;
        let (Some(pid), Some(offset)) = (u32_at(stream, entry), u32_at(stream, entry + 4)) else {
            break;
        };
        properties.push((pid, section + offset as usize));
    }

    let codepage = properties
        .iter()
        .find(|(pid, _)| *pid == 1)
        .and_then(|&(_, at)| match u32_at(stream, at)? {
            VT_I2 => u16_at(stream, at + 4),
            _ => None,
        });

    for (pid, at) in properties {
        let key = match pid {
            2 => "dc:title",
            3 => "dc:subject",
            4 => "dc:creator",
            5 => "meta:keyword",
            6 => "dc:description",
            8 => "meta:last-author",
            9 => "cp:revision",
            12 => "dcterms:created",
            13 => "dcterms:modified",
            14 => "meta:page-count",
            15 => "meta:word-count",
            16 => "meta:character-count",
            18 => "extended-properties:Application",
            _ => continue,
        };
        let Some(value) = property_value(stream, at, codepage) else {
            debug!("Skipping unreadable summary property {pid}");
            continue;
        };
        if value.is_empty() {
            continue;
        }
        if key == "dc:creator" || key == "meta:keyword" {
            add_value(metadata, key, value);
        } else {
            set_value(metadata, key, value);
        }
    }
    Ok(())
}

fn property_value(stream: &[u8], at: usize, codepage: Option<u16>) -> Option<String> {
    let value = match u32_at(stream, at)? {
        VT_I4 => u32_at(stream, at + 4)?.to_string(),
        VT_LPSTR => {
            let len = u32_at(stream, at + 4)? as usize;
            let bytes = stream.get(at + 8..at + 8 + len)?;
            let bytes = bytes.split(|&b| b == 0).next().unwrap_or(bytes);
            if codepage == Some(65001) {
                String::from_utf8_lossy(bytes).into_owned()
            } else {
                bytes.iter().copied().map(cp1252_char).collect()
            }
        }
        VT_LPWSTR => {
            let len = u32_at(stream, at + 4)? as usize;
            let bytes = stream.get(at + 8..at + 8 + len * 2)?;
            let units = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .take_while(|&u| u != 0);
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
        VT_FILETIME => {
            let low = u64::from(u32_at(stream, at + 4)?);
            let high = u64::from(u32_at(stream, at + 8)?);
            let ticks = (high << 32) | low;
            if ticks == 0 {
                return None;
            }
            let secs = i64::try_from(ticks / 10_000_000).ok()? - FILETIME_EPOCH_OFFSET;
            let nanos = u32::try_from((ticks % 10_000_000) * 100).ok()?;
            format_utc(DateTime::from_timestamp(secs, nanos)?)
        }
        _ => return None,
    };
    Some(value.trim().to_string())
}

/// Label and payload of an `\u{1}Ole10Native` stream
fn ole10_native(bytes: &[u8]) -> Option<(Option<String>, Vec<u8>)> {
    fn c_string(bytes: &[u8], at: &mut usize) -> Option<String> {
        let rest = bytes.get(*at..)?;
        let len = rest.iter().position(|&b| b == 0)?;
        *at += len + 1;
        Some(rest[..len].iter().copied().map(cp1252_char).collect())
    }

    let mut at = 6; // total size + flags
    let label = c_string(bytes, &mut at)?;
    let _file_name = c_string(bytes, &mut at)?;
    at += 4; // reserved
    let _temp_len = u32_at(bytes, at)?;
    at += 4;
    let _temp_path = c_string(bytes, &mut at)?;
    let size = u32_at(bytes, at)? as usize;
    at += 4;
    let data = bytes.get(at..at + size)?.to_vec();
    let label = Some(label).filter(|l| !l.is_empty());
    Some((label, data))
}

/// Embedded OLE objects, one per `ObjectPool` storage
fn object_pool<F: Read + Seek>(comp: &mut CompoundFile<F>) -> Vec<ByteSource> {
    let Ok(entries) = comp.read_storage("/ObjectPool") else {
        return Vec::new();
    };
    let mut storages: Vec<PathBuf> = entries
        .filter(|entry| entry.is_storage())
        .map(|entry| entry.path().to_path_buf())
        .collect();
    storages.sort();

    let mut children = Vec::new();
    for storage in storages {
        let storage_name = storage
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match object_payload(comp, &storage) {
            Ok(Some((label, data))) if !data.is_empty() => {
                let name = label.unwrap_or(storage_name);
                children.push(ByteSource::new(data).with_name(name));
            }
            Ok(_) => debug!("No extractable payload in {}", storage.display()),
            Err(e) => warn!("Skipping OLE object {}: {e}", storage.display()),
        }
    }
    children
}

fn object_payload<F: Read + Seek>(
    comp: &mut CompoundFile<F>,
    storage: &Path,
) -> Result<Option<(Option<String>, Vec<u8>)>> {
    for stream in ["Package", "CONTENTS"] {
        let path = storage.join(stream);
        if comp.is_stream(&path) {
            let path = path.to_string_lossy().into_owned();
            return Ok(Some((None, read_stream(comp, &path)?)));
        }
    }
    let native = storage.join("\u{1}Ole10Native");
    if comp.is_stream(&native) {
        let bytes = read_stream(comp, &native.to_string_lossy())?;
        return ole10_native(&bytes)
            .map(Some)
            .ok_or_else(|| truncated("Ole10Native stream"));
    }
    Ok(None)
}

/// Backend for Word 97-2003 documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DocBackend;

impl DocBackend {
    /// Create a new legacy Word backend
    #[inline]
    #[must_use = "creates legacy Word backend"]
    pub const fn new() -> Self {
        Self
    }

    fn parse_document(bytes: &[u8]) -> Result<ParsedNode> {
        let mut comp = CompoundFile::open(Cursor::new(bytes)).map_err(BackendError::Cfb)?;
        let word = read_stream(&mut comp, "/WordDocument")?;
        let fib = Fib::parse(&word)?;
        if fib.encrypted() {
            return Err(BackendError::PasswordProtected);
        }

        let table = read_stream(&mut comp, fib.table_stream())?;
        let pieces = piece_table(&table, fib.fc_clx, fib.lcb_clx)?;
        let text = clean_text(&decode_pieces(&word, &pieces, fib.ccp_text));

        let mut metadata = Metadata::new();
        if comp.is_stream("/\u{5}SummaryInformation") {
            let summary = read_stream(&mut comp, "/\u{5}SummaryInformation")?;
            if let Err(e) = summary_metadata(&summary, &mut metadata) {
                warn!("Ignoring unreadable summary information: {e}");
            }
        }

        let children = object_pool(&mut comp);
        Ok(ParsedNode::from_text(text)
            .with_metadata(metadata)
            .with_embedded(children))
    }
}

impl ParserBackend for DocBackend {
    fn name(&self) -> &str {
        "doc"
    }

    fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
        Ok(Self::parse_document(source.bytes())?)
    }
}
