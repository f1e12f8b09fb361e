//! `device_command` dispatch — the imperative controls the UI exercises
//! over a device.
//!
//! Commands mutate device-scoped state only. Session pairing bits are the
//! server's; the single exception is the explicit unpair
//! (`pairing_changed {isPaired: false}`).

use std::sync::Arc;
use std::time::Duration;

use lattsim_common::config;
use lattsim_common::uimsg::{DeviceCommand, DeviceEvent, UiMessage};
use lattsim_device::DeviceHandle;
use lattsim_device::signing::Decision;
use serde_json::json;
use uuid::Uuid;

pub async fn handle_command(device: &Arc<DeviceHandle>, command: DeviceCommand) {
    tracing::debug!(device = %device.id, ?command, "UI command");
    match command {
        DeviceCommand::ConnectionChanged { is_connected } => {
            device.state.write().await.is_connected = is_connected;
            device
                .link
                .broadcast(UiMessage::ConnectionChanged { is_connected });
        }
        DeviceCommand::PairingChanged { is_paired } => {
            if is_paired {
                // The server is the authority for granting pairing; a true
                // flag from the UI is only re-announced to other listeners.
                device.link.broadcast(UiMessage::PairingChanged { is_paired });
            } else {
                device.unpair_all().await;
            }
        }
        DeviceCommand::EnterPairingMode => {
            device.start_pairing().await;
        }
        DeviceCommand::ExitPairingMode => {
            device.end_pairing().await;
        }
        DeviceCommand::SetLocked { locked } => {
            device.state.write().await.is_locked = locked;
            device.broadcast_state().await;
        }
        DeviceCommand::ResetDevice { reset_type } => {
            device.reset(reset_type).await;
        }
        DeviceCommand::UpdateConfig { config } => {
            device.state.write().await.ui_config = config;
            device.broadcast_state().await;
        }
        DeviceCommand::SyncClientState(sync) => {
            device.state.write().await.apply_sync(sync);
            device.broadcast_state().await;
        }
        DeviceCommand::SetActiveSafecard { safecard } => {
            device.state.write().await.set_active_safecard(safecard);
            device.broadcast_state().await;
        }
        DeviceCommand::SetActiveWallet { wallet } => {
            device.state.write().await.set_active_wallet(wallet);
            device.broadcast_state().await;
        }
        DeviceCommand::SyncWalletAccounts { accounts } => {
            device.state.write().await.wallet_accounts = accounts;
            device.broadcast_state().await;
        }
        DeviceCommand::DeriveAddresses {
            start_path,
            count,
            flag,
            coin_type,
        } => {
            // The round-trip back to the UI's derivation service can take
            // minutes; never park the receive loop on it.
            let device = Arc::clone(device);
            tokio::spawn(async move {
                derive_addresses(&device, start_path, count, flag, coin_type).await;
            });
        }
        DeviceCommand::ApproveSigningRequest { request_id } => {
            complete_signing(device, request_id, Decision::Approved).await;
        }
        DeviceCommand::RejectSigningRequest { request_id } => {
            complete_signing(device, request_id, Decision::Rejected).await;
        }
    }
}

async fn complete_signing(device: &Arc<DeviceHandle>, request_id: Uuid, decision: Decision) {
    match device.signing.resolve(request_id, decision).await {
        Some(info) => {
            device.link.broadcast(UiMessage::SigningRequestCompleted {
                request_id: info.request_id,
                status: info.status,
            });
        }
        None => {
            tracing::warn!(device = %device.id, %request_id, "Decision for unknown signing request");
        }
    }
}

/// UI-triggered derivation refresh: run the standard derivation round-trip
/// and publish the result as a device event.
async fn derive_addresses(
    device: &Arc<DeviceHandle>,
    start_path: Vec<u32>,
    count: u8,
    flag: Option<u8>,
    coin_type: Option<String>,
) {
    let deadline = Duration::from_millis(config::get().ui.request_timeout_ms);
    let payload = json!({
        "startPath": start_path,
        "count": count,
        "flag": flag,
        "coinType": coin_type,
    });
    match device
        .link
        .request("wallet_addresses_request", payload.clone(), deadline)
        .await
    {
        Ok(data) => {
            device.link.broadcast(UiMessage::DeviceEvent(DeviceEvent {
                event_type: "address_derivation_result".into(),
                data,
            }));
        }
        Err(err) => {
            tracing::warn!(device = %device.id, %err, "Derivation refresh failed");
        }
    }
}
