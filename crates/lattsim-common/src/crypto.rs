//! Crypto primitives — thin adapters over the RustCrypto stack.
//!
//! Everything the protocol engine needs and nothing more:
//!
//! - **P-256 key generation** — ephemeral key-pairs for the per-session
//!   rotation protocol, public side always 65-byte uncompressed SEC1.
//! - **ECDH** — the shared secret is the 32-byte big-endian X coordinate of
//!   the Diffie-Hellman point, used directly as the AES-256 key.
//! - **AES-256-CBC** — fixed all-zero IV, PKCS#7 padding. The hardware wire
//!   format carries no IV; freshness comes from the key rotation.
//! - **SHA-256** — pairing hash and identifiers.
//! - **Randoms** — device ids, request ids, wallet uids, pairing codes.
//! - **Pairing signature validation** — recover the signer from a DER ECDSA
//!   signature and compare against the key seen at CONNECT.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use ecdsa::RecoveryId;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey, ecdh};
use rand::Rng;
use rand_core::OsRng;
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Byte length of an uncompressed SEC1 P-256 public key.
pub const PUBLIC_KEY_LEN: usize = 65;
/// Byte length of a derived shared secret (AES-256 key).
pub const SHARED_SECRET_LEN: usize = 32;

/// The wire format carries no IV; both sides use the fixed zero IV.
const ZERO_IV: [u8; 16] = [0u8; 16];

/// Error raised by the crypto adapters.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("public key is not a 65-byte uncompressed P-256 point")]
    BadPublicKey,
    #[error("AES-256-CBC encryption/decryption failed")]
    Aes,
    #[error("signature is not valid DER")]
    BadSignature,
    #[error("signature does not recover to the expected public key")]
    SignerMismatch,
}

/// A P-256 key-pair with the public side pre-encoded for the wire.
pub struct KeyPair {
    secret: SecretKey,
    public: [u8; PUBLIC_KEY_LEN],
}

impl KeyPair {
    /// Generate a fresh random key-pair.
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let point = secret.public_key().to_encoded_point(false);
        let mut public = [0u8; PUBLIC_KEY_LEN];
        public.copy_from_slice(point.as_bytes());
        Self { secret, public }
    }

    /// The 65-byte uncompressed public key.
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.public
    }

    /// Derive the shared secret with a peer public key: the 32-byte
    /// big-endian X coordinate of the ECDH point.
    pub fn shared_secret(&self, peer: &PublicKey) -> [u8; SHARED_SECRET_LEN] {
        let shared = ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());
        let mut out = [0u8; SHARED_SECRET_LEN];
        out.copy_from_slice(shared.raw_secret_bytes());
        out
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never format the secret half.
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

/// Parse a 65-byte uncompressed SEC1 public key. Compressed encodings are
/// rejected — the wire format is explicit about the `0x04` form.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    if bytes.len() != PUBLIC_KEY_LEN || bytes[0] != 0x04 {
        return Err(CryptoError::BadPublicKey);
    }
    PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::BadPublicKey)
}

/// AES-256-CBC encrypt with the fixed zero IV. PKCS#7 padding is always
/// applied, so block-aligned plaintexts grow by one full block.
pub fn aes256_cbc_encrypt(
    key: &[u8; SHARED_SECRET_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let enc = Aes256CbcEnc::new_from_slices(key, &ZERO_IV).map_err(|_| CryptoError::Aes)?;
    Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// AES-256-CBC decrypt with the fixed zero IV, stripping PKCS#7 padding.
pub fn aes256_cbc_decrypt(
    key: &[u8; SHARED_SECRET_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let dec = Aes256CbcDec::new_from_slices(key, &ZERO_IV).map_err(|_| CryptoError::Aes)?;
    dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Aes)
}

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// The prehash a client signs to finalize pairing:
/// `SHA-256(client_pub ‖ app_name ‖ pairing_code)`.
pub fn pairing_prehash(client_pub: &[u8], app_name: &[u8], code: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(client_pub);
    hasher.update(app_name);
    hasher.update(code.as_bytes());
    hasher.finalize().into()
}

/// Validate a DER-encoded ECDSA pairing signature by recovering the signer's
/// public key from the prehash and comparing it to the key the session saw
/// at CONNECT.
pub fn validate_pairing_signature(
    der: &[u8],
    prehash: &[u8; 32],
    expected_pub: &[u8; PUBLIC_KEY_LEN],
) -> Result<(), CryptoError> {
    let sig = Signature::from_der(der).map_err(|_| CryptoError::BadSignature)?;
    let sig = sig.normalize_s().unwrap_or(sig);

    for byte in 0u8..=1 {
        let Some(recovery_id) = RecoveryId::from_byte(byte) else {
            continue;
        };
        if let Ok(recovered) = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id) {
            if recovered.to_encoded_point(false).as_bytes() == expected_pub {
                return Ok(());
            }
        }
    }
    Err(CryptoError::SignerMismatch)
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill(bytes.as_mut_slice());
    bytes
}

/// Random 16-byte device serial.
pub fn random_device_id() -> [u8; 16] {
    random_bytes()
}

/// Random 8-byte request/window identifier.
pub fn random_request_id() -> [u8; 8] {
    random_bytes()
}

/// Random 32-byte wallet uid.
pub fn random_wallet_uid() -> [u8; 32] {
    random_bytes()
}

/// 8-digit decimal pairing code, uniform over `10^8`.
pub fn pairing_code() -> String {
    format!("{:08}", rand::rng().random_range(0..100_000_000u32))
}

/// Starting value for a session's ephemeral-id counter.
///
/// The counter doubles as the session discriminator on SECURE frames, so
/// starts are spread over the lower half of the u32 range — the counter
/// then increments monotonically with no risk of wrapping.
pub fn ephemeral_id_seed() -> u32 {
    rand::rng().random_range(0..u32::MAX / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;
    use proptest::prelude::*;

    #[test]
    fn ecdh_both_sides_agree() {
        let ours = KeyPair::generate();
        let theirs = KeyPair::generate();

        let our_view = parse_public_key(&theirs.public_bytes()).unwrap();
        let their_view = parse_public_key(&ours.public_bytes()).unwrap();

        assert_eq!(ours.shared_secret(&our_view), theirs.shared_secret(&their_view));
    }

    #[test]
    fn rejects_compressed_and_short_keys() {
        let pair = KeyPair::generate();
        let mut compressed = [0u8; 33];
        compressed[0] = 0x02;
        compressed[1..].copy_from_slice(&pair.public_bytes()[1..33]);
        assert!(parse_public_key(&compressed).is_err());
        assert!(parse_public_key(&pair.public_bytes()[..64]).is_err());
    }

    #[test]
    fn aligned_plaintext_gains_a_full_padding_block() {
        let key = [7u8; 32];
        let ct = aes256_cbc_encrypt(&key, &[0u8; 32]).unwrap();
        assert_eq!(ct.len(), 48);
    }

    #[test]
    fn pairing_signature_recovers_signer() {
        let signer = SigningKey::random(&mut OsRng);
        let verifier = VerifyingKey::from(&signer);
        let mut client_pub = [0u8; PUBLIC_KEY_LEN];
        client_pub.copy_from_slice(verifier.to_encoded_point(false).as_bytes());

        let prehash = pairing_prehash(&client_pub, b"Test", "01234567");
        let (sig, _) = signer.sign_prehash_recoverable(&prehash).unwrap();
        let der = sig.to_der();

        assert!(validate_pairing_signature(der.as_bytes(), &prehash, &client_pub).is_ok());

        // A different key must not validate.
        let other = KeyPair::generate();
        assert!(validate_pairing_signature(der.as_bytes(), &prehash, &other.public_bytes()).is_err());
    }

    #[test]
    fn pairing_codes_are_eight_digits() {
        for _ in 0..32 {
            let code = pairing_code();
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    proptest! {
        #[test]
        fn aes_round_trip_is_identity(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let key = [42u8; 32];
            let ct = aes256_cbc_encrypt(&key, &plaintext).unwrap();
            prop_assert_eq!(aes256_cbc_decrypt(&key, &ct).unwrap(), plaintext);
        }

        #[test]
        fn ciphertext_is_block_aligned(plaintext in proptest::collection::vec(any::<u8>(), 0..256)) {
            let key = [1u8; 32];
            let ct = aes256_cbc_encrypt(&key, &plaintext).unwrap();
            prop_assert_eq!(ct.len() % 16, 0);
            prop_assert!(ct.len() > plaintext.len());
        }
    }
}
