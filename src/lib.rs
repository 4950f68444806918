//! # loupedeck
//!
//! A Rust client library for Loupedeck USB-serial control surfaces.
//!
//! The device enumerates as a CDC serial port; after an HTTP-upgrade-style
//! handshake it speaks a framed binary protocol carrying commands,
//! responses and unsolicited hardware reports.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Event-driven reporting of button, knob and multi-touch activity
//! - Transaction-correlated commands with mandatory response timeouts
//! - RGB565 framebuffer drawing with per-region refresh
//! - Automatic reconnection after an unexpected disconnect
//!
//! ## Quick Start
//!
//! ```no_run
//! use loupedeck::{Event, Loupedeck};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), loupedeck::Error> {
//!     // Connect to a Loupedeck device
//!     let mut deck = Loupedeck::serial("/dev/ttyACM0");
//!     deck.connect().await?;
//!
//!     let info = deck.get_info().await?;
//!     println!("Connected to {} ({})", info.serial, info.version);
//!
//!     deck.set_brightness(0.7).await?;
//!
//!     // React to hardware activity
//!     let mut events = deck.subscribe();
//!     while let Some(event) = events.recv().await {
//!         if let Event::Button { key, pressed } = event {
//!             println!("{key:?} {}", if pressed { "down" } else { "up" });
//!         }
//!     }
//!
//!     deck.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Low-level protocol pieces (framing, opcodes, pixels)
//! - [`types`] - Data structures (keys, screens, touches, device identity)
//! - [`transport`] - Transport implementations (USB/Serial)
//! - [`event`] - Async event system for hardware notifications
//! - [`commands`] - Transaction correlation and device operations
//! - [`client`] - High-level [`Loupedeck`] client

pub mod client;
pub mod commands;
pub mod error;
pub mod event;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{DEFAULT_RECONNECT_INTERVAL, Loupedeck};
pub use commands::{CommandHandler, DEFAULT_TIMEOUT, TransactionTable};
pub use error::{Error, FrameError, Result};
pub use event::{Event, EventDispatcher, Subscription};
pub use protocol::{Haptic, MAX_BRIGHTNESS, Opcode, PacketFramer};
pub use transport::{SerialTransport, serial::list_ports};
pub use types::{
    Button, DeviceInfo, DisplayDescriptor, Key, Knob, Screen, TouchContact, TouchKind,
    TouchTarget, TouchTracker,
};
