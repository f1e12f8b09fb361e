//! # lattsim-device
//!
//! Everything a simulated device owns: its state, its sessions and their
//! cryptographic rotation, the pairing window, pending signing approvals,
//! the UI-link correlator, and the process-wide registry of devices.

pub mod handle;
pub mod kv;
pub mod link;
pub mod pairing;
pub mod registry;
pub mod session;
pub mod signing;
pub mod state;

pub use handle::DeviceHandle;
pub use registry::DeviceRegistry;
