//! Wallet descriptors — the internal (device) seed and the optional
//! external (SafeCard) seed a device exposes to clients.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Byte length of a wallet uid.
pub const WALLET_UID_LEN: usize = 32;

bitflags! {
    /// Capability bits advertised in a wallet descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WalletCapabilities: u32 {
        /// Seed lives in the secure element (always set for the internal wallet).
        const SECURE_ELEMENT = 1 << 0;
        /// Seed can be exported to a SafeCard backup.
        const EXPORTABLE = 1 << 1;
        /// Wallet can sign arbitrary message payloads, not just transactions.
        const GENERIC_SIGNING = 1 << 2;
    }
}

/// A wallet slot as reported by `getWallets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDescriptor {
    /// 32-byte uid; all zeroes marks an empty slot on the wire.
    #[serde(with = "serde_uid")]
    pub uid: [u8; WALLET_UID_LEN],
    pub external: bool,
    /// Display name, raw bytes as the hardware stores it.
    pub name: Vec<u8>,
    pub capabilities: u32,
}

impl WalletDescriptor {
    /// Fresh internal wallet with a random uid.
    pub fn internal(name: &str) -> Self {
        Self {
            uid: crate::crypto::random_wallet_uid(),
            external: false,
            name: name.as_bytes().to_vec(),
            capabilities: (WalletCapabilities::SECURE_ELEMENT | WalletCapabilities::GENERIC_SIGNING)
                .bits(),
        }
    }

    /// External wallet backed by a SafeCard uid.
    pub fn external(uid: [u8; WALLET_UID_LEN], name: &str) -> Self {
        Self {
            uid,
            external: true,
            name: name.as_bytes().to_vec(),
            capabilities: (WalletCapabilities::EXPORTABLE | WalletCapabilities::GENERIC_SIGNING)
                .bits(),
        }
    }

    pub fn capability_flags(&self) -> WalletCapabilities {
        WalletCapabilities::from_bits_truncate(self.capabilities)
    }

    pub fn name_string(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Hex (de)serialization for 32-byte uids embedded in UI JSON.
pub(crate) mod serde_uid {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(uid: &[u8; 32], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(uid))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(de)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("wallet uid must be 32 bytes"))
    }
}
