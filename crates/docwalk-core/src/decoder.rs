//! Incremental UTF-8 decoding of backend content streams.
//!
//! [`StreamDecoder`] holds only the bytes of a multi-byte sequence that was cut
//! by a read boundary. [`read_to_string`] is the driver: it pulls chunks from a
//! reader, retries reads that report `WouldBlock` or `Interrupted`, and treats
//! only `Ok(0)` as end of stream.

use crate::error::{ExtractError, Result};
use std::io::{ErrorKind, Read};

/// Default chunk size used when pulling content streams.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Incremental UTF-8 decoder.
///
/// Never emits a partial character: a sequence straddling two chunks is held
/// back and prepended to the next chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDecoder {
    /// Incomplete trailing sequence, at most 3 bytes
    pending: Vec<u8>,
    /// Total bytes fed so far, for error offsets
    position: usize,
}

impl StreamDecoder {
    /// Create a decoder with no pending bytes
    #[inline]
    #[must_use = "creates a decoder"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes held back waiting for the rest of a sequence
    #[inline]
    #[must_use = "returns the pending byte count"]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Decode one chunk.
    ///
    /// With `is_final = false` an incomplete trailing sequence is retained.
    /// With `is_final = true` it is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidEncoding`] for bytes that can never form
    /// UTF-8, or for a sequence still incomplete on the final call.
    pub fn decode(&mut self, chunk: &[u8], is_final: bool) -> Result<String> {
        let start = self.position - self.pending.len();
        self.position += chunk.len();

        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        match std::str::from_utf8(&bytes) {
            Ok(text) => Ok(text.to_owned()),
            Err(e) => {
                let valid = e.valid_up_to();
                if let Some(len) = e.error_len() {
                    return Err(ExtractError::InvalidEncoding {
                        offset: start + valid,
                        message: format!("invalid UTF-8 sequence of {len} byte(s)"),
                    });
                }
                if is_final {
                    return Err(ExtractError::InvalidEncoding {
                        offset: start + valid,
                        message: format!(
                            "incomplete multi-byte sequence of {} byte(s) at end of stream",
                            bytes.len() - valid
                        ),
                    });
                }
                let tail = bytes.split_off(valid);
                self.pending = tail;
                String::from_utf8(bytes).map_err(|err| ExtractError::InvalidEncoding {
                    offset: start,
                    message: err.to_string(),
                })
            }
        }
    }

    /// Flush the decoder at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidEncoding`] if a partial sequence remains.
    pub fn finish(mut self) -> Result<String> {
        self.decode(&[], true)
    }
}

/// Pull `reader` to end of stream and decode it.
///
/// `resource` names the node in error messages.
///
/// # Errors
///
/// Returns [`ExtractError::InvalidEncoding`] on undecodable bytes and
/// [`ExtractError::BackendParseFailure`] if the stream itself fails.
pub fn read_to_string<R: Read + ?Sized>(
    reader: &mut R,
    buffer_size: usize,
    resource: &str,
) -> Result<String> {
    let mut decoder = StreamDecoder::new();
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut text = String::new();

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => text.push_str(&decoder.decode(&buf[..n], false)?),
            Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::yield_now(),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(ExtractError::backend(resource, e)),
        }
    }

    text.push_str(&decoder.finish()?);
    Ok(text)
}
