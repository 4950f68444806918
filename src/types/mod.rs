//! Data types for Loupedeck entities.
//!
//! This module contains the core data structures used throughout the
//! library:
//! - Knob and button identities
//! - Display surface geometry
//! - Touch contacts and tracking
//! - Device identity

pub mod device;
pub mod display;
pub mod key;
pub mod touch;

pub use device::DeviceInfo;
pub use display::{DisplayDescriptor, KEY_COLUMNS, KEY_ROWS, KEY_SIZE, Screen};
pub use key::{Button, Key, Knob};
pub use touch::{TouchContact, TouchKind, TouchTarget, TouchTracker};
