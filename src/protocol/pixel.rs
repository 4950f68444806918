//! RGB565 pixel format conversion.
//!
//! The device framebuffers take 16-bit 5-6-5 pixels, little-endian on the
//! wire. Channels are truncated, not rounded, matching the device's own
//! reference conversion.

use bytes::{BufMut, Bytes, BytesMut};

/// Bytes per framebuffer pixel.
pub const BYTES_PER_PIXEL: usize = 2;

/// Packs an RGB888 color into RGB565.
#[must_use]
pub const fn pack(r: u8, g: u8, b: u8) -> u16 {
    let r5 = r as u16 * 31 / 255;
    let g6 = g as u16 * 63 / 255;
    let b5 = b as u16 * 31 / 255;
    (r5 << 11) | (g6 << 5) | b5
}

/// Expands an RGB565 value back to RGB888.
///
/// Inverse of [`pack`] up to quantization (5-bit channels reconstruct
/// within ±8, the 6-bit channel within ±4).
#[must_use]
pub const fn unpack(value: u16) -> (u8, u8, u8) {
    let r5 = (value >> 11) & 0x1F;
    let g6 = (value >> 5) & 0x3F;
    let b5 = value & 0x1F;
    ((r5 * 255 / 31) as u8, (g6 * 255 / 63) as u8, (b5 * 255 / 31) as u8)
}

/// Converts a packed RGBA8888 buffer to RGB565 little-endian bytes.
///
/// Alpha is dropped. Trailing bytes that do not form a whole pixel are
/// ignored.
#[must_use]
pub fn convert_rgba(data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len() / 4 * BYTES_PER_PIXEL);
    for px in data.chunks_exact(4) {
        out.put_u16_le(pack(px[0], px[1], px[2]));
    }
    out.freeze()
}

/// Fills a buffer with one RGB565 color repeated `count` times.
#[must_use]
pub fn solid(r: u8, g: u8, b: u8, count: usize) -> Bytes {
    let value = pack(r, g, b).to_le_bytes();
    let mut out = BytesMut::with_capacity(count * BYTES_PER_PIXEL);
    for _ in 0..count {
        out.put_slice(&value);
    }
    out.freeze()
}
