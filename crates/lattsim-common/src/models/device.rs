//! Device identity and firmware versioning.

use serde::{Deserialize, Serialize};

/// Firmware feature floor for the key/value store operations.
pub const KV_FIRMWARE_FLOOR: FirmwareVersion = FirmwareVersion {
    major: 0,
    minor: 12,
    patch: 0,
};

/// Semantic firmware version reported by a simulated device.
///
/// The wire form is the 4-byte array `[major, minor, patch, 0]` — the UI
/// persists it in exactly that shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl FirmwareVersion {
    pub fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self { major, minor, patch }
    }

    /// 4-byte wire representation.
    pub fn wire_bytes(&self) -> [u8; 4] {
        [self.major, self.minor, self.patch, 0]
    }

    /// Parse the 4-byte wire representation; the trailing byte is reserved.
    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 4 {
            return None;
        }
        Some(Self::new(bytes[0], bytes[1], bytes[2]))
    }

    pub fn at_least(&self, floor: FirmwareVersion) -> bool {
        *self >= floor
    }
}

impl std::str::FromStr for FirmwareVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut next = || {
            parts
                .next()
                .and_then(|p| p.parse::<u8>().ok())
                .ok_or_else(|| format!("invalid firmware version: {s}"))
        };
        let (major, minor, patch) = (next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(format!("invalid firmware version: {s}"));
        }
        Ok(Self::new(major, minor, patch))
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Identity of a simulated device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub name: String,
    pub firmware_version: FirmwareVersion,
}
