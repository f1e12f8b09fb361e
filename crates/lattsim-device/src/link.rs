//! The server side of the UI channel: outbound event fan-out and the
//! pending-correlation table for `server_request` round-trips.
//!
//! `request()` is the single correlator primitive every handler uses:
//! issue a typed request, suspend on a oneshot, get the UI's data or a
//! typed timeout. Duplicate or late `client_response`s find no waiter and
//! are dropped.

use std::collections::HashMap;
use std::time::Duration;

use lattsim_common::error::{SimError, SimResult};
use lattsim_common::uimsg::{ClientResponse, ServerRequest, UiEnvelope, UiMessage};
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, oneshot};
use uuid::Uuid;

/// Outbound broadcast depth. UI channels are low-traffic; this is sized for
/// burstiness around state syncs, not throughput.
const BROADCAST_CAPACITY: usize = 1024;

struct PendingUiRequest {
    request_type: String,
    created_at: i64,
    reply_tx: oneshot::Sender<SimResult<Value>>,
}

/// Per-device UI link shared by the engine (issuing requests and events)
/// and the WebSocket transport (delivering both ways).
pub struct UiLink {
    events: broadcast::Sender<UiEnvelope>,
    pending: Mutex<HashMap<Uuid, PendingUiRequest>>,
}

impl Default for UiLink {
    fn default() -> Self {
        Self::new()
    }
}

impl UiLink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            events,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe an outbound consumer (one per WebSocket connection).
    pub fn subscribe(&self) -> broadcast::Receiver<UiEnvelope> {
        self.events.subscribe()
    }

    /// Broadcast a message to every connected UI. A send error only means
    /// no UI is listening right now, which is fine — events are advisory.
    pub fn broadcast(&self, message: UiMessage) {
        let _ = self.events.send(UiEnvelope::now(message));
    }

    /// Issue a correlated `server_request` and await the UI's response.
    pub async fn request(
        &self,
        request_type: &str,
        payload: Value,
        deadline: Duration,
    ) -> SimResult<Value> {
        let request_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.pending.lock().await.insert(
            request_id,
            PendingUiRequest {
                request_type: request_type.to_owned(),
                created_at: chrono::Utc::now().timestamp_millis(),
                reply_tx,
            },
        );

        self.broadcast(UiMessage::ServerRequest(ServerRequest {
            request_id,
            request_type: request_type.to_owned(),
            payload,
        }));

        match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SimError::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                tracing::warn!(request_type, %request_id, "UI request timed out");
                Err(SimError::UserTimeout)
            }
        }
    }

    /// Resolve a waiter from an inbound `client_response`. Returns whether a
    /// waiter existed — duplicates and late arrivals return false.
    pub async fn resolve(&self, response: ClientResponse) -> bool {
        let Some(entry) = self.pending.lock().await.remove(&response.request_id) else {
            tracing::debug!(
                request_id = %response.request_id,
                "Dropping response with no waiter (duplicate or expired)"
            );
            return false;
        };

        let age_ms = chrono::Utc::now().timestamp_millis() - entry.created_at;
        tracing::debug!(
            request_type = %entry.request_type,
            request_id = %response.request_id,
            age_ms,
            "UI response correlated"
        );

        let result = match response.error {
            Some(error) => Err(SimError::from_ui_error(&error)),
            None => Ok(response.data.unwrap_or(Value::Null)),
        };
        let _ = entry.reply_tx.send(result);
        true
    }

    /// Fail every outstanding waiter — device disposal or reset.
    pub async fn fail_all(&self) {
        let mut pending = self.pending.lock().await;
        for (_, entry) in pending.drain() {
            let _ = entry.reply_tx.send(Err(SimError::ChannelClosed));
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}
