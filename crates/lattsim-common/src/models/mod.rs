//! Domain models shared across the simulator crates.

pub mod device;
pub mod kv;
pub mod safecard;
pub mod wallet;

pub use device::{DeviceInfo, FirmwareVersion};
pub use kv::{KV_ENTRY_MAX_BYTES, KvRecord};
pub use safecard::SafeCard;
pub use wallet::{WalletCapabilities, WalletDescriptor};
