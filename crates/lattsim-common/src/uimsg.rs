//! UI-channel message types — shared between the engine and the WebSocket
//! transport crate.
//!
//! The engine issues correlated `server_request`s and broadcast events; the
//! UI answers with `client_response`s and pushes `device_command`s and
//! `device_event`s of its own. This module lives in `lattsim-common` so both
//! crates can use it without circular deps.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{FirmwareVersion, KvRecord};

/// Outer envelope of every UI-channel message: `{type, data, timestamp}`.
/// Timestamps are client-side milliseconds and monotonically increasing per
/// sender; the server stamps its own on send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiEnvelope {
    #[serde(flatten)]
    pub message: UiMessage,
    #[serde(default)]
    pub timestamp: i64,
}

impl UiEnvelope {
    /// Wrap a message with the current server-side timestamp.
    pub fn now(message: UiMessage) -> Self {
        Self {
            message,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Every message that travels the UI channel, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UiMessage {
    /// Server → UI: invitation to perform work, correlated by `requestId`.
    ServerRequest(ServerRequest),
    /// UI → Server: correlated reply resolving a pending `server_request`.
    ClientResponse(ClientResponse),
    /// UI → Server: out-of-band notification.
    DeviceEvent(DeviceEvent),
    /// UI → Server: imperative control.
    DeviceCommand(DeviceCommand),
    /// Bidirectional keepalive.
    Heartbeat,
    HeartbeatResponse,

    // === Server → UI broadcasts ===
    DeviceState(Value),
    PairingModeStarted {
        code: String,
        #[serde(rename = "startedAt")]
        started_at: i64,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    PairingModeEnded,
    ConnectionChanged {
        #[serde(rename = "isConnected")]
        is_connected: bool,
    },
    PairingChanged {
        #[serde(rename = "isPaired")]
        is_paired: bool,
    },
    SigningRequestCreated(SigningRequestInfo),
    SigningRequestCompleted {
        #[serde(rename = "requestId")]
        request_id: Uuid,
        status: SigningRequestStatus,
    },
}

/// Work the server asks the UI to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRequest {
    pub request_id: Uuid,
    pub request_type: String,
    pub payload: Value,
}

/// Correlated reply from the UI. Exactly one of `data`/`error` is expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    pub request_id: Uuid,
    #[serde(default)]
    pub request_type: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Out-of-band notification pushed by the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Imperative controls the UI sends as `device_command {command, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "command",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum DeviceCommand {
    ConnectionChanged {
        is_connected: bool,
    },
    PairingChanged {
        is_paired: bool,
    },
    EnterPairingMode,
    ExitPairingMode,
    SetLocked {
        locked: bool,
    },
    ResetDevice {
        reset_type: ResetType,
    },
    UpdateConfig {
        config: Value,
    },
    SyncClientState(ClientStateSync),
    SetActiveSafecard {
        safecard: Option<SafeCardSync>,
    },
    SetActiveWallet {
        wallet: Option<WalletSync>,
    },
    SyncWalletAccounts {
        accounts: Value,
    },
    DeriveAddresses {
        start_path: Vec<u32>,
        count: u8,
        #[serde(default)]
        flag: Option<u8>,
        #[serde(default)]
        coin_type: Option<String>,
    },
    ApproveSigningRequest {
        request_id: Uuid,
    },
    RejectSigningRequest {
        request_id: Uuid,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetType {
    Connection,
    Full,
}

/// The UI's persisted state, replayed on channel open via
/// `sync_client_state`. This is a versioned envelope: unknown fields are
/// ignored, every known field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStateSync {
    #[serde(default)]
    pub device_info: Option<DeviceInfoSync>,
    #[serde(default)]
    pub active_wallets: Option<ActiveWalletsSync>,
    #[serde(default)]
    pub kv_records: Option<Vec<KvRecordSync>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfoSync {
    #[serde(default)]
    pub name: Option<String>,
    /// Firmware in the persisted 4-byte wire form.
    #[serde(default)]
    pub firmware_version: Option<Vec<u8>>,
}

impl DeviceInfoSync {
    pub fn firmware(&self) -> Option<FirmwareVersion> {
        self.firmware_version
            .as_deref()
            .and_then(FirmwareVersion::from_wire)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveWalletsSync {
    #[serde(default)]
    pub internal: Option<WalletSync>,
    #[serde(default)]
    pub external: Option<WalletSync>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSync {
    /// Hex-encoded 32-byte uid.
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub capabilities: u32,
    #[serde(default)]
    pub external: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvRecordSync {
    #[serde(default)]
    pub id: Option<u32>,
    pub key: String,
    pub value: String,
}

impl From<&KvRecord> for KvRecordSync {
    fn from(record: &KvRecord) -> Self {
        Self {
            id: Some(record.id),
            key: record.key.clone(),
            value: record.value.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeCardSync {
    pub id: String,
    /// Hex-encoded 32-byte uid.
    pub uid: String,
    pub name: String,
    pub mnemonic: String,
}

/// Kind of a pending user-approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SigningRequestKind {
    Sign,
    Pair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningRequestStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// JSON projection of a pending signing request, broadcast on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequestInfo {
    pub request_id: Uuid,
    pub kind: SigningRequestKind,
    pub created_at: i64,
    pub timeout_ms: u64,
    pub payload: Value,
    pub status: SigningRequestStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_has_type_data_timestamp_shape() {
        let env = UiEnvelope {
            message: UiMessage::PairingChanged { is_paired: true },
            timestamp: 123,
        };
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["type"], "pairing_changed");
        assert_eq!(value["data"]["isPaired"], true);
        assert_eq!(value["timestamp"], 123);
    }

    #[test]
    fn commands_parse_from_ui_json() {
        let env: UiEnvelope = serde_json::from_value(json!({
            "type": "device_command",
            "data": {
                "command": "reset_device",
                "data": { "resetType": "full" }
            },
            "timestamp": 1
        }))
        .unwrap();
        match env.message {
            UiMessage::DeviceCommand(DeviceCommand::ResetDevice { reset_type }) => {
                assert_eq!(reset_type, ResetType::Full);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_sync_fields_are_ignored() {
        let sync: ClientStateSync = serde_json::from_value(json!({
            "deviceInfo": { "name": "bench", "firmwareVersion": [0, 15, 0, 0] },
            "someFutureField": { "nested": true }
        }))
        .unwrap();
        let info = sync.device_info.unwrap();
        assert_eq!(info.firmware().unwrap().minor, 15);
    }

    #[test]
    fn heartbeat_needs_no_data() {
        let env: UiEnvelope =
            serde_json::from_value(json!({ "type": "heartbeat", "timestamp": 9 })).unwrap();
        assert!(matches!(env.message, UiMessage::Heartbeat));
    }
}
