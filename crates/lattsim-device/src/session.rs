//! Per-client session state and the ephemeral-key rotation protocol.
//!
//! A session is keyed by the client's long-term public key. Its lifetime:
//! created on CONNECT, re-keyed on every encrypted reply, disposed on reset
//! or on an ephemeral-id regression. The owning `DeviceHandle` wraps each
//! session in a `tokio::sync::Mutex`; every method here is synchronous, so
//! decrypt → process → rotate cannot be observed half-complete.

use lattsim_common::crypto::{self, CryptoError, KeyPair, PUBLIC_KEY_LEN, SHARED_SECRET_LEN};
use lattsim_protocol::secure::ReplyPlaintext;
use p256::PublicKey;

/// Outcome of checking the ephemeral id presented by a SECURE request
/// against the session counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EphemeralIdCheck {
    Valid,
    /// Lower than current: a stale or replayed frame. Fatal to the session.
    Stale,
    /// Higher than current: the client ran ahead. Rejected, not fatal.
    Future,
}

#[derive(Debug)]
pub struct Session {
    client_pub: [u8; PUBLIC_KEY_LEN],
    client_key: PublicKey,
    keypair: KeyPair,
    shared_secret: [u8; SHARED_SECRET_LEN],
    ephemeral_id: u32,
    is_paired: bool,
    pairing_code: Option<String>,
}

impl Session {
    /// Establish a session from the client public key in a CONNECT body.
    pub fn connect(client_pub_bytes: &[u8]) -> Result<Self, CryptoError> {
        let client_key = crypto::parse_public_key(client_pub_bytes)?;
        let mut client_pub = [0u8; PUBLIC_KEY_LEN];
        client_pub.copy_from_slice(client_pub_bytes);

        let keypair = KeyPair::generate();
        let shared_secret = keypair.shared_secret(&client_key);
        Ok(Self {
            client_pub,
            client_key,
            keypair,
            shared_secret,
            // The counter doubles as the session discriminator on SECURE
            // frames, so each session starts from its own random seed.
            ephemeral_id: crypto::ephemeral_id_seed(),
            is_paired: false,
            pairing_code: None,
        })
    }

    /// A repeat CONNECT from the same client: fresh ephemeral material and a
    /// fresh counter seed, but the pairing bit survives.
    pub fn reconnect(&mut self) {
        self.keypair = KeyPair::generate();
        self.shared_secret = self.keypair.shared_secret(&self.client_key);
        self.ephemeral_id = crypto::ephemeral_id_seed();
    }

    pub fn client_pub(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.client_pub
    }

    pub fn ephemeral_pub(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.keypair.public_bytes()
    }

    pub fn ephemeral_id(&self) -> u32 {
        self.ephemeral_id
    }

    pub fn is_paired(&self) -> bool {
        self.is_paired
    }

    pub fn set_paired(&mut self, paired: bool) {
        self.is_paired = paired;
    }

    pub fn pairing_code(&self) -> Option<&str> {
        self.pairing_code.as_deref()
    }

    pub fn set_pairing_code(&mut self, code: Option<String>) {
        self.pairing_code = code;
    }

    pub fn check_ephemeral_id(&self, presented: u32) -> EphemeralIdCheck {
        use std::cmp::Ordering::*;
        match presented.cmp(&self.ephemeral_id) {
            Equal => EphemeralIdCheck::Valid,
            Less => EphemeralIdCheck::Stale,
            Greater => EphemeralIdCheck::Future,
        }
    }

    /// Decrypt an incoming SECURE ciphertext under the current secret.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        crypto::aes256_cbc_decrypt(&self.shared_secret, ciphertext)
    }

    /// Build and encrypt a reply, rotating the session in the same step.
    ///
    /// The reply plaintext carries the incremented counter and the *new*
    /// ephemeral public key, but is encrypted under the *old* secret — the
    /// client decrypts with what it knows, then re-derives for next time.
    /// Keypair generation, re-derivation, and the state swap happen
    /// back-to-back with no intervening await point.
    pub fn encrypt_reply_and_rotate(&mut self, data: Vec<u8>) -> Result<Vec<u8>, CryptoError> {
        let next_keypair = KeyPair::generate();
        let next_secret = next_keypair.shared_secret(&self.client_key);
        let next_id = self.ephemeral_id + 1;

        let plaintext = ReplyPlaintext {
            ephemeral_id: next_id,
            ephemeral_pub: next_keypair.public_bytes(),
            data,
        };
        let ciphertext = crypto::aes256_cbc_encrypt(&self.shared_secret, &plaintext.encode())?;

        self.keypair = next_keypair;
        self.shared_secret = next_secret;
        self.ephemeral_id = next_id;
        Ok(ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The client half of the handshake, as the SDK implements it.
    struct ClientSide {
        keypair: KeyPair,
        secret: [u8; SHARED_SECRET_LEN],
    }

    impl ClientSide {
        fn connect(server_ephemeral_pub: &[u8]) -> Self {
            let keypair = KeyPair::generate();
            let server_key = crypto::parse_public_key(server_ephemeral_pub).unwrap();
            let secret = keypair.shared_secret(&server_key);
            Self { keypair, secret }
        }

        fn absorb_reply(&mut self, ciphertext: &[u8]) -> ReplyPlaintext {
            let plaintext = crypto::aes256_cbc_decrypt(&self.secret, ciphertext).unwrap();
            let reply = ReplyPlaintext::decode(&plaintext).unwrap();
            let next_key = crypto::parse_public_key(&reply.ephemeral_pub).unwrap();
            self.secret = self.keypair.shared_secret(&next_key);
            reply
        }
    }

    #[test]
    fn both_sides_stay_in_sync_across_rotations() {
        let client_keys = KeyPair::generate();
        let mut session = Session::connect(&client_keys.public_bytes()).unwrap();

        let mut client = ClientSide {
            keypair: client_keys,
            secret: [0; SHARED_SECRET_LEN],
        };
        let server_key = crypto::parse_public_key(&session.ephemeral_pub()).unwrap();
        client.secret = client.keypair.shared_secret(&server_key);

        let mut last_id = session.ephemeral_id();
        for round in 0..5u8 {
            let ct = session.encrypt_reply_and_rotate(vec![round]).unwrap();
            let reply = client.absorb_reply(&ct);
            assert_eq!(reply.data, vec![round]);
            assert!(reply.ephemeral_id > last_id, "counter must strictly increase");
            last_id = reply.ephemeral_id;
        }
    }

    #[test]
    fn reconnect_reseeds_counter_but_keeps_pairing() {
        let client = KeyPair::generate();
        let mut session = Session::connect(&client.public_bytes()).unwrap();
        session.set_paired(true);
        let seed = session.ephemeral_id();
        session.encrypt_reply_and_rotate(vec![]).unwrap();
        assert_eq!(session.ephemeral_id(), seed + 1);

        let old_pub = session.ephemeral_pub();
        session.reconnect();
        assert!(session.is_paired());
        assert_ne!(session.ephemeral_pub(), old_pub);
    }

    #[test]
    fn ephemeral_id_checks_classify_both_directions() {
        let client = KeyPair::generate();
        let mut session = Session::connect(&client.public_bytes()).unwrap();
        session.encrypt_reply_and_rotate(vec![]).unwrap();

        let current = session.ephemeral_id();
        assert_eq!(session.check_ephemeral_id(current), EphemeralIdCheck::Valid);
        assert_eq!(session.check_ephemeral_id(current - 1), EphemeralIdCheck::Stale);
        assert_eq!(session.check_ephemeral_id(current + 1), EphemeralIdCheck::Future);
    }

    #[test]
    fn rejects_garbage_client_keys() {
        assert!(Session::connect(&[0u8; 65]).is_err());
        assert!(Session::connect(&[0u8; 10]).is_err());
    }
}
