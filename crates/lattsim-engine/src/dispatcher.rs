//! Request dispatcher.
//!
//! CONNECT frames establish or re-key a session; SECURE frames resolve
//! their session by ephemeral id, decrypt, run the operation handler under
//! the session lock (which is what serializes replies per session), then
//! encrypt-and-rotate in the same critical section. Every error is mapped
//! to a response code at this boundary — handlers never write frames.

use std::sync::Arc;

use lattsim_common::error::{ResponseCode, SimError};
use lattsim_device::DeviceHandle;
use lattsim_device::session::{EphemeralIdCheck, Session};
use lattsim_protocol::frame::{Frame, FrameType};
use lattsim_protocol::ops::OpCode;
use lattsim_protocol::secure::{ConnectReply, SecureEnvelope, reply_body};

use crate::handlers;

/// Process one raw frame and produce the raw reply frame.
pub async fn dispatch(device: &Arc<DeviceHandle>, raw: &[u8]) -> Vec<u8> {
    match Frame::decode(raw) {
        Ok(frame) => match frame.frame_type {
            FrameType::Connect => handle_connect(device, frame).await,
            FrameType::Secure => handle_secure(device, frame).await,
        },
        Err(err) => {
            tracing::warn!(device = %device.id, %err, "Rejected malformed frame");
            error_frame(0, ResponseCode::InvalidMsg)
        }
    }
}

/// CONNECT: (re)establish the session, open a pairing window when the
/// client is not yet paired, reply with the server's ephemeral material.
async fn handle_connect(device: &Arc<DeviceHandle>, frame: Frame) -> Vec<u8> {
    let session = match device.connect_session(&frame.body).await {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(device = %device.id, %err, "CONNECT rejected");
            return error_frame(frame.id, err.response_code());
        }
    };

    let mut session = session.lock().await;
    let is_paired = session.is_paired();
    if !is_paired {
        let window = device.start_pairing().await;
        session.set_pairing_code(Some(window.code));
    }

    let firmware = device.state.read().await.firmware().wire_bytes();
    let reply = ConnectReply {
        is_paired,
        firmware,
        ephemeral_pub: session.ephemeral_pub(),
        ephemeral_id: session.ephemeral_id(),
    };
    tracing::debug!(device = %device.id, is_paired, "CONNECT handled");
    encode_reply(frame.id, ResponseCode::Success, &reply.encode())
}

/// SECURE: resolve session → decrypt → handle → encrypt-and-rotate.
async fn handle_secure(device: &Arc<DeviceHandle>, frame: Frame) -> Vec<u8> {
    let envelope = match SecureEnvelope::decode(&frame.body) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!(device = %device.id, %err, "Bad secure envelope");
            return error_frame(frame.id, ResponseCode::InvalidMsg);
        }
    };

    let Some(op) = OpCode::from_u8(envelope.request_type) else {
        tracing::warn!(device = %device.id, request_type = envelope.request_type, "Unknown operation");
        return error_frame(frame.id, ResponseCode::InvalidMsg);
    };

    let Some((client_key, session)) =
        device.find_session_by_ephemeral_id(envelope.ephemeral_id).await
    else {
        return error_frame(frame.id, ResponseCode::InvalidEphemId);
    };

    // The session lock is held from here through reply encryption: this is
    // the per-session ordered queue, and it makes decrypt/process/rotate
    // atomic with respect to other requests.
    let mut session = session.lock().await;

    match session.check_ephemeral_id(envelope.ephemeral_id) {
        EphemeralIdCheck::Valid => {}
        EphemeralIdCheck::Stale => {
            // Replayed or rolled-back counter: unrecoverable crypto state.
            tracing::error!(device = %device.id, "Ephemeral id regression, disposing session");
            drop(session);
            device.dispose_session(&client_key).await;
            return error_frame(frame.id, ResponseCode::InvalidEphemId);
        }
        EphemeralIdCheck::Future => {
            return error_frame(frame.id, ResponseCode::InvalidEphemId);
        }
    }

    let plaintext = match session.decrypt(&envelope.ciphertext) {
        Ok(plaintext) => plaintext,
        Err(err) => {
            // Without a shared secret in sync there is nothing to encrypt
            // a reply under; the code goes back in the clear.
            tracing::warn!(device = %device.id, %err, "Secure payload failed to decrypt");
            return error_frame(frame.id, ResponseCode::InvalidMsg);
        }
    };

    let (code, data) = match handle_operation(device, &mut session, op, &plaintext).await {
        Ok(data) => (ResponseCode::Success, data),
        Err(err) => {
            if let SimError::Internal(ref inner) = err {
                tracing::error!(device = %device.id, ?op, %inner, "Handler fault");
            } else {
                tracing::debug!(device = %device.id, ?op, %err, "Operation refused");
            }
            (err.response_code(), Vec::new())
        }
    };

    match session.encrypt_reply_and_rotate(data) {
        Ok(ciphertext) => {
            device
                .index_ephemeral(session.ephemeral_id(), client_key)
                .await;
            encode_reply(frame.id, code, &ciphertext)
        }
        Err(err) => {
            tracing::error!(device = %device.id, %err, "Reply encryption failed");
            error_frame(frame.id, ResponseCode::InternalError)
        }
    }
}

/// Run one operation with the shared precondition chain: locked, unpaired,
/// firmware floor — in that order, first failure wins. Payload validation
/// is the handler's own first step.
async fn handle_operation(
    device: &Arc<DeviceHandle>,
    session: &mut Session,
    op: OpCode,
    payload: &[u8],
) -> Result<Vec<u8>, SimError> {
    {
        let state = device.state.read().await;
        if state.is_locked {
            return Err(SimError::DeviceLocked);
        }
        if op != OpCode::FinalizePairing && !session.is_paired() {
            return Err(SimError::NotPaired);
        }
        let is_kv_op = matches!(
            op,
            OpCode::GetKvRecords | OpCode::AddKvRecords | OpCode::RemoveKvRecords
        );
        if is_kv_op
            && !state
                .firmware()
                .at_least(lattsim_common::models::device::KV_FIRMWARE_FLOOR)
        {
            return Err(SimError::UnsupportedVersion);
        }
    }

    match op {
        OpCode::FinalizePairing => handlers::pairing::finalize(device, session, payload).await,
        OpCode::GetAddresses => handlers::addresses::get_addresses(device, payload).await,
        OpCode::Sign => handlers::sign::sign(device, payload).await,
        OpCode::GetWallets => handlers::wallets::get_wallets(device).await,
        OpCode::GetKvRecords => handlers::kv::get_records(device, payload).await,
        OpCode::AddKvRecords => handlers::kv::add_records(device, payload).await,
        OpCode::RemoveKvRecords => handlers::kv::remove_records(device, payload).await,
        OpCode::FetchEncryptedData => Err(SimError::Disabled),
        OpCode::Test => Ok(payload.to_vec()),
    }
}

fn encode_reply(id: u32, code: ResponseCode, payload: &[u8]) -> Vec<u8> {
    let frame = Frame::new(FrameType::Secure, id, reply_body(code, payload));
    frame.encode().unwrap_or_else(|err| {
        // A reply too large for the length field is a handler bug; degrade
        // to a bare error code rather than an empty response.
        tracing::error!(%err, "Reply frame encoding failed");
        error_frame(id, ResponseCode::InternalError)
    })
}

fn error_frame(id: u32, code: ResponseCode) -> Vec<u8> {
    let frame = Frame::new(FrameType::Secure, id, reply_body(code, &[]));
    frame.encode().expect("error frames are always tiny")
}
