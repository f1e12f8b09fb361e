//! Operation handlers, one module per operation family.
//!
//! Handlers take the device handle plus the decrypted payload and return
//! the reply `data` bytes; the dispatcher owns framing, codes, and
//! rotation. Handlers that need the UI suspend on the link correlator.

pub mod addresses;
pub mod kv;
pub mod pairing;
pub mod sign;
pub mod wallets;

use lattsim_common::error::SimError;
use lattsim_protocol::ops::TlvError;

/// Every TLV parse failure surfaces as `invalidMsg`.
pub(crate) fn invalid(err: TlvError) -> SimError {
    SimError::Invalid(err.to_string())
}
