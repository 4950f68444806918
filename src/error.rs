//! Error types for the loupedeck library.

use thiserror::Error;

/// The main error type for loupedeck operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Packet framing error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The device rejected or never completed the handshake.
    #[error("handshake failed: {message}")]
    Handshake { message: String },

    /// Protocol error from the device.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Command timed out waiting for response.
    #[error("command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// Pixel buffer does not match the requested draw region.
    #[error("pixel buffer size mismatch: expected {expected} bytes, got {got}")]
    PixelCount { expected: usize, got: usize },

    /// Channel send error.
    #[error("channel send error")]
    ChannelSend,

    /// Channel receive error.
    #[error("channel closed")]
    ChannelClosed,
}

/// Framing-specific errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Declared payload length exceeds the sanity maximum.
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },
}

/// Result type alias for loupedeck operations.
pub type Result<T> = std::result::Result<T, Error>;
