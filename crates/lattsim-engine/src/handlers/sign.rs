//! `sign` — the blocking user-approval flow.
//!
//! Create a pending signing request, announce it, park on the decision
//! oneshot, then (on approval) run the UI signing service round-trip. The
//! session lock stays held by the dispatcher throughout, so later requests
//! on the same session queue behind the decision by design.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use lattsim_common::config;
use lattsim_common::error::{SimError, SimResult};
use lattsim_common::uimsg::{SigningRequestKind, UiMessage};
use lattsim_device::DeviceHandle;
use lattsim_device::signing::Decision;
use lattsim_protocol::ops::{self, SignRequest};
use serde_json::{Value, json};

pub async fn sign(device: &Arc<DeviceHandle>, payload: &[u8]) -> SimResult<Vec<u8>> {
    let request = SignRequest::decode(payload).map_err(super::invalid)?;
    if request.data.is_empty() {
        return Err(SimError::Invalid("nothing to sign".into()));
    }
    if !(3..=6).contains(&request.path.len()) {
        return Err(SimError::Invalid("derivation path must have 3..=6 segments".into()));
    }

    let cfg = config::get();
    let wallet_uid = hex::encode(device.state.read().await.active_wallet().uid);
    let request_payload = json!({
        "path": request.path,
        "schema": request.schema,
        "curve": request.curve,
        "encoding": request.encoding,
        "hashType": request.hash_type,
        "data": B64.encode(&request.data),
        "walletUid": wallet_uid,
    });

    let (info, decision_rx) = device
        .signing
        .create(
            SigningRequestKind::Sign,
            request_payload.clone(),
            cfg.signing.timeout_ms,
        )
        .await;
    device
        .link
        .broadcast(UiMessage::SigningRequestCreated(info.clone()));

    let decision = match tokio::time::timeout(
        Duration::from_millis(info.timeout_ms),
        decision_rx,
    )
    .await
    {
        Ok(Ok(decision)) => decision,
        // Channel gone without a decision: the device was disposed under us.
        Ok(Err(_)) => return Err(SimError::ChannelClosed),
        Err(_) => {
            if let Some(expired) = device.signing.expire(info.request_id).await {
                device.link.broadcast(UiMessage::SigningRequestCompleted {
                    request_id: expired.request_id,
                    status: expired.status,
                });
            }
            return Err(SimError::UserTimeout);
        }
    };

    match decision {
        Decision::Rejected => Err(SimError::UserDeclined),
        Decision::Approved => {
            let response = device
                .link
                .request(
                    "wallet_sign_request",
                    json!({
                        "requestId": info.request_id,
                        "request": request_payload,
                    }),
                    Duration::from_millis(cfg.ui.request_timeout_ms),
                )
                .await?;
            let (recovery, der) = parse_signature(&response)?;
            Ok(ops::encode_signature(recovery, &der))
        }
    }
}

/// The UI signing service answers `{signature: <base64 DER>, recovery?: u8}`.
fn parse_signature(response: &Value) -> SimResult<(u8, Vec<u8>)> {
    let der = response
        .get("signature")
        .and_then(Value::as_str)
        .and_then(|s| B64.decode(s).ok())
        .ok_or_else(|| SimError::Internal(anyhow::anyhow!("UI returned no usable signature")))?;
    let recovery = response
        .get("recovery")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u8;
    Ok((recovery, der))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_parsing_requires_base64_der() {
        let good = serde_json::json!({"signature": B64.encode([0x30, 0x44, 0xaa, 0xbb]), "recovery": 1});
        assert_eq!(parse_signature(&good).unwrap(), (1, vec![0x30, 0x44, 0xaa, 0xbb]));

        let no_recovery = serde_json::json!({"signature": B64.encode([0u8])});
        assert_eq!(parse_signature(&no_recovery).unwrap(), (0, vec![0]));

        assert!(parse_signature(&serde_json::json!({"signature": "!!!"})).is_err());
        assert!(parse_signature(&serde_json::json!({})).is_err());
    }
}
