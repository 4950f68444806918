//! Transport framing for the Loupedeck wire protocol.
//!
//! Every transport-level frame starts with a magic byte followed by one of
//! two length encodings:
//! ```text
//! small:  ┌──────────┬──────────────┬─────────────────┐
//!         │  0x82    │ 0x80 | size  │    payload      │
//!         │  1 byte  │   1 byte     │  size bytes     │
//!         └──────────┴──────────────┴─────────────────┘
//! large:  ┌──────────┬──────────┬─────────┬────────────┬─────────────┐
//!         │  0x82    │  0xff    │ 4 bytes │ size (BE)  │  payload    │
//!         │  1 byte  │  1 byte  │ unused  │  4 bytes   │ size bytes  │
//!         └──────────┴──────────┴─────────┴────────────┴─────────────┘
//! ```
//! Send-side large frames carry four additional trailing mask bytes (all
//! zero) after the length, for a 14-byte header; the device never masks
//! its own frames, so received large headers are 10 bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Magic byte that begins every transport frame.
pub const FRAME_MAGIC: u8 = 0x82;

/// Length byte marking the large (32-bit length) encoding.
pub const LARGE_LENGTH_SENTINEL: u8 = 0xFF;

/// Sanity cap on a declared payload length.
///
/// The largest legitimate payload is a full center framebuffer
/// (360 * 270 * 2 bytes plus the draw header), so 1 MiB leaves ample room.
pub const MAX_PAYLOAD_SIZE: usize = 1 << 20;

/// Small-frame header: magic + length byte.
const SMALL_HEADER_LEN: usize = 2;

/// Received large-frame header: magic + sentinel + 8-byte length field.
const LARGE_HEADER_LEN: usize = 10;

/// Offset of the meaningful 4 length bytes within the large header.
const LARGE_LENGTH_OFFSET: usize = 6;

/// Encodes a payload into a transport frame for sending.
///
/// Payloads up to 255 bytes use the 2-byte header with the length folded
/// into the second byte (`0x80 + len`, wrapping — the device reads the low
/// 7 bits and commands never need more). Anything larger gets the 14-byte
/// header with a big-endian 32-bit length.
#[must_use]
pub fn encode(payload: &[u8]) -> Bytes {
    if payload.len() <= 0xFF {
        let mut buf = BytesMut::with_capacity(SMALL_HEADER_LEN + payload.len());
        buf.put_u8(FRAME_MAGIC);
        buf.put_u8(0x80u8.wrapping_add(payload.len() as u8));
        buf.put_slice(payload);
        buf.freeze()
    } else {
        let mut buf = BytesMut::with_capacity(LARGE_HEADER_LEN + 4 + payload.len());
        buf.put_u8(FRAME_MAGIC);
        buf.put_u8(LARGE_LENGTH_SENTINEL);
        buf.put_bytes(0, 4);
        buf.put_u32(payload.len() as u32);
        buf.put_bytes(0, 4);
        buf.put_slice(payload);
        buf.freeze()
    }
}

/// Incremental packet framer that tolerates arbitrarily fragmented input.
///
/// Feed raw serial reads with [`feed`](Self::feed) and drain completed
/// payloads with [`next_packet`](Self::next_packet). Bytes preceding the
/// first magic byte are discarded, which resynchronizes the stream after
/// corruption.
#[derive(Debug, Default)]
pub struct PacketFramer {
    buffer: BytesMut,
}

impl PacketFramer {
    /// Creates a new framer in the scanning state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Feeds raw bytes into the framer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to extract the next complete packet payload.
    ///
    /// Returns `Ok(Some(payload))` when a full packet is available,
    /// `Ok(None)` when more data is needed. A partial header is left in
    /// the buffer untouched so parsing resumes on the next call.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] when the declared length exceeds
    /// [`MAX_PAYLOAD_SIZE`]; the offending magic byte is skipped so the
    /// framer can resynchronize on subsequent calls.
    pub fn next_packet(&mut self) -> Result<Option<Bytes>, FrameError> {
        loop {
            match self.buffer.iter().position(|&b| b == FRAME_MAGIC) {
                Some(0) => {}
                Some(garbage) => self.buffer.advance(garbage),
                None => {
                    self.buffer.clear();
                    return Ok(None);
                }
            }

            if self.buffer.len() < SMALL_HEADER_LEN {
                return Ok(None);
            }

            let length_byte = self.buffer[1];
            let (header_len, payload_len) = if length_byte == LARGE_LENGTH_SENTINEL {
                if self.buffer.len() < LARGE_HEADER_LEN {
                    return Ok(None);
                }
                let len = u32::from_be_bytes([
                    self.buffer[LARGE_LENGTH_OFFSET],
                    self.buffer[LARGE_LENGTH_OFFSET + 1],
                    self.buffer[LARGE_LENGTH_OFFSET + 2],
                    self.buffer[LARGE_LENGTH_OFFSET + 3],
                ]) as usize;
                (LARGE_HEADER_LEN, len)
            } else if length_byte & 0x80 != 0 {
                (SMALL_HEADER_LEN, usize::from(length_byte & 0x7F))
            } else {
                // Magic byte was payload of something else; skip and rescan.
                self.buffer.advance(1);
                continue;
            };

            if payload_len > MAX_PAYLOAD_SIZE {
                self.buffer.advance(1);
                return Err(FrameError::TooLarge {
                    size: payload_len,
                    max: MAX_PAYLOAD_SIZE,
                });
            }

            if self.buffer.len() < header_len + payload_len {
                return Ok(None);
            }

            self.buffer.advance(header_len);
            return Ok(Some(self.buffer.split_to(payload_len).freeze()));
        }
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer, returning to the scanning state.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
