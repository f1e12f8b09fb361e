//! `finalizePairing` — DER-validated completion of the pairing ceremony.

use std::sync::Arc;

use lattsim_common::crypto;
use lattsim_common::error::{SimError, SimResult};
use lattsim_common::uimsg::{SigningRequestKind, UiMessage};
use lattsim_device::DeviceHandle;
use lattsim_device::session::Session;
use lattsim_device::signing::Decision;
use lattsim_protocol::ops::FinalizePairingRequest;
use serde_json::json;

/// Validate the client's signature over
/// `SHA-256(client_pub ‖ app_name ‖ code)` and flip the session pairing
/// bit. The ceremony is recorded as a PAIR-type pending request resolved
/// in-line, so the UI sees created/completed events for pairing too.
pub async fn finalize(
    device: &Arc<DeviceHandle>,
    session: &mut Session,
    payload: &[u8],
) -> SimResult<Vec<u8>> {
    let request = FinalizePairingRequest::decode(payload).map_err(super::invalid)?;
    let app_name = String::from_utf8_lossy(&request.app_name).into_owned();

    let (info, _decision_rx) = device
        .signing
        .create(
            SigningRequestKind::Pair,
            json!({ "appName": app_name }),
            device.pairing.current().await.map_or(0, |w| w.timeout_ms),
        )
        .await;
    device
        .link
        .broadcast(UiMessage::SigningRequestCreated(info.clone()));

    let validated = validate(device, session, &request).await;

    let decision = if validated { Decision::Approved } else { Decision::Rejected };
    if let Some(completed) = device.signing.resolve(info.request_id, decision).await {
        device.link.broadcast(UiMessage::SigningRequestCompleted {
            request_id: completed.request_id,
            status: completed.status,
        });
    }

    if !validated {
        // The window stays open until its timer ends; the client may retry.
        return Err(SimError::PairFailed);
    }

    session.set_paired(true);
    session.set_pairing_code(None);
    device.end_pairing().await;
    device
        .link
        .broadcast(UiMessage::PairingChanged { is_paired: true });
    tracing::info!(device = %device.id, app = %app_name, "Pairing finalized");
    Ok(Vec::new())
}

async fn validate(
    device: &Arc<DeviceHandle>,
    session: &Session,
    request: &FinalizePairingRequest,
) -> bool {
    // The code signed must be the one this session was shown, and its
    // window must still be open.
    let Some(window) = device.pairing.current().await else {
        tracing::warn!(device = %device.id, "finalizePairing with no open window");
        return false;
    };
    if session.pairing_code() != Some(window.code.as_str()) {
        tracing::warn!(device = %device.id, "finalizePairing against a different window");
        return false;
    }

    let prehash = crypto::pairing_prehash(session.client_pub(), &request.app_name, &window.code);
    match crypto::validate_pairing_signature(&request.signature_der, &prehash, session.client_pub())
    {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(device = %device.id, %err, "Pairing signature rejected");
            false
        }
    }
}
