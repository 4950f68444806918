//! Transport layer for Loupedeck communication.
//!
//! This module provides the abstraction for different transport methods.
//! The device enumerates as a USB CDC serial port, which is the only
//! implementation.

pub mod serial;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::Result;

/// Trait for transport implementations.
pub trait Transport: Send + Sync {
    /// Connects to the device, including any link-level handshake.
    fn connect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Disconnects from the device. Idempotent.
    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Sends one payload, framed, as a single uninterleaved write.
    fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Returns true if connected.
    fn is_connected(&self) -> bool;
}

pub use serial::SerialTransport;
