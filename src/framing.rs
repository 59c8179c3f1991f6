//! Separator framing for the camera byte stream.
//!
//! Wire unit: `<jpeg bytes><SEPARATOR>`, repeated, nothing else. There is no
//! length prefix and no escaping, so a payload must never contain
//! [`SEPARATOR`]; if one does, the receiver splits it in two and both halves
//! fail to decode. Senders check with [`contains_separator`] before framing.
//! Changing this would break every deployed client.

use bytes::{Bytes, BytesMut};

use crate::core::FramingError;

/// UTF-8 encoding of `ÿ\0\0\0ÿ\0\0\0ÿ`.
pub const SEPARATOR: &[u8] = b"\xc3\xbf\x00\x00\x00\xc3\xbf\x00\x00\x00\xc3\xbf";

pub const DEFAULT_MAX_PENDING: usize = 8 * 1024 * 1024;

pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + SEPARATOR.len());
    out.extend_from_slice(payload);
    out.extend_from_slice(SEPARATOR);
    out
}

pub fn contains_separator(payload: &[u8]) -> bool {
    find_separator(payload).is_some()
}

fn find_separator(buf: &[u8]) -> Option<usize> {
    buf.windows(SEPARATOR.len()).position(|w| w == SEPARATOR)
}

/// Reassembles frames from arbitrarily split reads.
pub struct FrameScanner {
    buffer: BytesMut,
    // bytes already known not to start a separator
    scanned: usize,
    max_pending: usize,
}

impl FrameScanner {
    pub fn new(max_pending: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            scanned: 0,
            max_pending,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete frame, `Ok(None)` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FramingError> {
        match find_separator(&self.buffer[self.scanned..]) {
            Some(rel) => {
                let end = self.scanned + rel;
                let mut chunk = self.buffer.split_to(end + SEPARATOR.len());
                chunk.truncate(end);
                self.scanned = 0;
                Ok(Some(chunk.freeze()))
            }
            None => {
                // ein angefangener Separator kann am Ende hängen
                self.scanned = self
                    .buffer
                    .len()
                    .saturating_sub(SEPARATOR.len() - 1);

                if self.buffer.len() > self.max_pending {
                    return Err(FramingError::Overflow {
                        pending: self.buffer.len(),
                        limit: self.max_pending,
                    });
                }
                Ok(None)
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}
