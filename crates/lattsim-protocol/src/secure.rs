//! SECURE envelope and reply plaintext layouts.
//!
//! A SECURE request body is:
//!
//! ```text
//! request_type:u8 | ephemeral_id:u32 LE | ciphertext
//! ```
//!
//! Replies (both CONNECT and SECURE) share the outer frame with body
//! `response_code:u8 | payload`. The CONNECT payload travels in the clear;
//! a SECURE payload is AES-256-CBC ciphertext of [`ReplyPlaintext`],
//! encrypted under the pre-rotation shared secret so the client can always
//! decrypt it, then learn the next key from the embedded public key.

use lattsim_common::crypto::PUBLIC_KEY_LEN;
use lattsim_common::error::ResponseCode;

use crate::frame::FrameError;

/// Minimum SECURE request body: type byte plus ephemeral id.
const ENVELOPE_MIN: usize = 5;

/// Decoded SECURE request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureEnvelope {
    pub request_type: u8,
    /// Little-endian on the wire, unlike every other integer field.
    pub ephemeral_id: u32,
    pub ciphertext: Vec<u8>,
}

impl SecureEnvelope {
    pub fn decode(body: &[u8]) -> Result<Self, FrameError> {
        if body.len() < ENVELOPE_MIN {
            return Err(FrameError::TruncatedEnvelope);
        }
        Ok(Self {
            request_type: body[0],
            ephemeral_id: u32::from_le_bytes([body[1], body[2], body[3], body[4]]),
            ciphertext: body[ENVELOPE_MIN..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENVELOPE_MIN + self.ciphertext.len());
        out.push(self.request_type);
        out.extend_from_slice(&self.ephemeral_id.to_le_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }
}

/// Assemble a reply frame body: `response_code:u8 | payload`.
pub fn reply_body(code: ResponseCode, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(code as u8);
    out.extend_from_slice(payload);
    out
}

/// Split a reply frame body back into code and payload.
pub fn split_reply_body(body: &[u8]) -> Result<(ResponseCode, &[u8]), FrameError> {
    let (&code, payload) = body.split_first().ok_or(FrameError::TruncatedEnvelope)?;
    let code = ResponseCode::from_u8(code).ok_or(FrameError::TruncatedEnvelope)?;
    Ok((code, payload))
}

/// Plaintext CONNECT reply payload. Carries the counter seed the session
/// starts from — the client echoes it on its first SECURE request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReply {
    pub is_paired: bool,
    pub firmware: [u8; 4],
    pub ephemeral_pub: [u8; PUBLIC_KEY_LEN],
    /// Little-endian, like the envelope's copy of it.
    pub ephemeral_id: u32,
}

impl ConnectReply {
    const LEN: usize = 1 + 4 + PUBLIC_KEY_LEN + 4;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(self.is_paired as u8);
        out.extend_from_slice(&self.firmware);
        out.extend_from_slice(&self.ephemeral_pub);
        out.extend_from_slice(&self.ephemeral_id.to_le_bytes());
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() != Self::LEN {
            return Err(FrameError::TruncatedEnvelope);
        }
        let mut firmware = [0u8; 4];
        firmware.copy_from_slice(&payload[1..5]);
        let mut ephemeral_pub = [0u8; PUBLIC_KEY_LEN];
        ephemeral_pub.copy_from_slice(&payload[5..5 + PUBLIC_KEY_LEN]);
        let tail = &payload[5 + PUBLIC_KEY_LEN..];
        Ok(Self {
            is_paired: payload[0] != 0,
            firmware,
            ephemeral_pub,
            ephemeral_id: u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]),
        })
    }
}

/// Plaintext of an encrypted SECURE reply, before encryption:
///
/// ```text
/// ephemeral_id:u32 LE | new_ephemeral_pub[65] | data
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPlaintext {
    pub ephemeral_id: u32,
    pub ephemeral_pub: [u8; PUBLIC_KEY_LEN],
    pub data: Vec<u8>,
}

impl ReplyPlaintext {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + PUBLIC_KEY_LEN + self.data.len());
        out.extend_from_slice(&self.ephemeral_id.to_le_bytes());
        out.extend_from_slice(&self.ephemeral_pub);
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(plaintext: &[u8]) -> Result<Self, FrameError> {
        if plaintext.len() < 4 + PUBLIC_KEY_LEN {
            return Err(FrameError::TruncatedEnvelope);
        }
        let ephemeral_id =
            u32::from_le_bytes([plaintext[0], plaintext[1], plaintext[2], plaintext[3]]);
        let mut ephemeral_pub = [0u8; PUBLIC_KEY_LEN];
        ephemeral_pub.copy_from_slice(&plaintext[4..4 + PUBLIC_KEY_LEN]);
        Ok(Self {
            ephemeral_id,
            ephemeral_pub,
            data: plaintext[4 + PUBLIC_KEY_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn envelope_ephemeral_id_is_little_endian() {
        let env = SecureEnvelope::decode(&[0x01, 0x02, 0x00, 0x00, 0x00, 0xff]).unwrap();
        assert_eq!(env.ephemeral_id, 2);
        assert_eq!(env.ciphertext, vec![0xff]);
    }

    #[test]
    fn envelope_rejects_truncation() {
        assert_eq!(
            SecureEnvelope::decode(&[0x01, 0x02]),
            Err(FrameError::TruncatedEnvelope)
        );
    }

    #[test]
    fn connect_reply_round_trip() {
        let reply = ConnectReply {
            is_paired: false,
            firmware: [0, 15, 0, 0],
            ephemeral_pub: [0x04; PUBLIC_KEY_LEN],
            ephemeral_id: 0x1234_5678,
        };
        assert_eq!(ConnectReply::decode(&reply.encode()).unwrap(), reply);
    }

    proptest! {
        #[test]
        fn secure_envelope_round_trip(
            request_type in any::<u8>(),
            ephemeral_id in any::<u32>(),
            ciphertext in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let env = SecureEnvelope { request_type, ephemeral_id, ciphertext };
            prop_assert_eq!(SecureEnvelope::decode(&env.encode()).unwrap(), env);
        }

        #[test]
        fn reply_plaintext_round_trip(
            ephemeral_id in any::<u32>(),
            data in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let reply = ReplyPlaintext {
                ephemeral_id,
                ephemeral_pub: [0x04; PUBLIC_KEY_LEN],
                data,
            };
            prop_assert_eq!(ReplyPlaintext::decode(&reply.encode()).unwrap(), reply);
        }
    }
}
