//! Device identity types.

/// Identity reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Serial number string.
    pub serial: String,
    /// Firmware version as a dotted string, e.g. "0.2.5".
    pub version: String,
}
