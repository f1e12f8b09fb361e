//! # lattsim-protocol
//!
//! The binary wire format spoken between client SDKs and a simulated
//! device. Three layers, all pure — no I/O, no state:
//!
//! - [`frame`] — the outer checksummed frame carrying CONNECT and SECURE
//!   messages.
//! - [`secure`] — the SECURE envelope (request type, ephemeral id,
//!   ciphertext) and the plaintext reply layouts.
//! - [`ops`] — per-operation TLV request parsing and response encoding.

pub mod frame;
pub mod ops;
pub mod secure;

pub use frame::{Frame, FrameError, FrameType, PROTOCOL_VERSION};
pub use ops::OpCode;
