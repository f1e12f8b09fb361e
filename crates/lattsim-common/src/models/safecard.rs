//! SafeCard — an external seed profile the UI can make active.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// The active SafeCard reference used for external-wallet derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeCard {
    pub id: String,
    #[serde(with = "super::wallet::serde_uid")]
    pub uid: [u8; 32],
    pub name: String,
    /// BIP-39 phrase, normalized on construction.
    pub mnemonic: String,
}

impl SafeCard {
    pub fn new(id: String, uid: [u8; 32], name: String, mnemonic: &str) -> Self {
        Self {
            id,
            uid,
            name,
            mnemonic: normalize_mnemonic(mnemonic),
        }
    }
}

/// Normalize a mnemonic phrase: trim, collapse inner whitespace to single
/// spaces, then NFKD-normalize. Derivation collaborators expect this exact
/// canonical form.
pub fn normalize_mnemonic(phrase: &str) -> String {
    let collapsed = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.nfkd().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(
            normalize_mnemonic("  abandon   abandon\tabandon \n"),
            "abandon abandon abandon"
        );
    }

    #[test]
    fn applies_nfkd() {
        // U+00E9 (é, NFC) decomposes to U+0065 U+0301 under NFKD.
        let normalized = normalize_mnemonic("caf\u{00e9}");
        assert_eq!(normalized, "cafe\u{0301}");
    }
}
