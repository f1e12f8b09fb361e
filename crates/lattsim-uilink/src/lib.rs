//! # lattsim-uilink
//!
//! Per-device WebSocket control channel at `/ws/device/{device_id}`.
//! Handles:
//! - Outbound fan-out of broadcast events and `server_request`s
//! - Inbound `client_response` correlation, `device_command` dispatch, and
//!   `device_event` relay
//! - Heartbeat/keepalive in both directions
//!
//! The link itself is connection-agnostic: state lives on the device, so a
//! UI may drop and reconnect freely. Its own retry queue handles responses
//! it failed to deliver while offline; duplicates are dropped by the
//! correlator.

pub mod commands;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use lattsim_common::config;
use lattsim_common::uimsg::{UiEnvelope, UiMessage};
use lattsim_device::{DeviceHandle, DeviceRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Build the UI-channel router.
pub fn build_router(registry: Arc<DeviceRegistry>) -> Router {
    Router::new()
        .route("/ws/device/{device_id}", get(ws_handler))
        .with_state(registry)
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(device_id): Path<String>,
    State(registry): State<Arc<DeviceRegistry>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, registry, device_id))
}

/// Handle a single UI connection for the lifetime of the socket.
async fn handle_connection(socket: WebSocket, registry: Arc<DeviceRegistry>, device_id: String) {
    let device = registry.get_or_create(&device_id).await;
    let (mut sender, mut receiver) = socket.split();

    let mut events = device.link.subscribe();
    // Direct lane for replies addressed to this connection only
    // (heartbeat responses), bypassing the device-wide broadcast.
    let (direct_tx, mut direct_rx) = mpsc::channel::<UiEnvelope>(32);

    tracing::info!(device = %device_id, "UI connected");

    // Greet the UI with the current device state so it can reconcile.
    let snapshot = device.state.read().await.snapshot();
    if send_envelope(&mut sender, &UiEnvelope::now(UiMessage::DeviceState(snapshot)))
        .await
        .is_err()
    {
        return;
    }

    let heartbeat_secs = config::get().ui.heartbeat_interval_secs;
    let send_task = tokio::spawn({
        let device_id = device_id.clone();
        async move {
            let mut heartbeat = tokio::time::interval(Duration::from_secs(heartbeat_secs));
            heartbeat.tick().await; // first tick fires immediately; skip it
            loop {
                let envelope = tokio::select! {
                    event = events.recv() => match event {
                        Ok(envelope) => envelope,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(device = %device_id, missed, "UI receiver lagged");
                            continue;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                    direct = direct_rx.recv() => match direct {
                        Some(envelope) => envelope,
                        None => break,
                    },
                    _ = heartbeat.tick() => UiEnvelope::now(UiMessage::Heartbeat),
                };
                if send_envelope(&mut sender, &envelope).await.is_err() {
                    break;
                }
            }
        }
    });

    // Receive loop
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<UiEnvelope>(&text) {
                Ok(envelope) => {
                    handle_inbound(&device, envelope.message, &direct_tx).await;
                }
                Err(err) => {
                    tracing::warn!(device = %device_id, %err, "Unparseable UI message");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    tracing::info!(device = %device_id, "UI disconnected");
}

async fn handle_inbound(
    device: &Arc<DeviceHandle>,
    message: UiMessage,
    direct_tx: &mpsc::Sender<UiEnvelope>,
) {
    match message {
        UiMessage::DeviceCommand(command) => {
            commands::handle_command(device, command).await;
        }
        UiMessage::ClientResponse(response) => {
            device.link.resolve(response).await;
        }
        UiMessage::DeviceEvent(event) => {
            tracing::debug!(device = %device.id, event = %event.event_type, "UI device event");
            // Relay to every listener on the channel; the UI dedupes its own.
            device.link.broadcast(UiMessage::DeviceEvent(event));
        }
        UiMessage::Heartbeat => {
            let _ = direct_tx
                .send(UiEnvelope::now(UiMessage::HeartbeatResponse))
                .await;
        }
        UiMessage::HeartbeatResponse => {}
        other => {
            tracing::warn!(device = %device.id, ?other, "Unexpected message direction from UI");
        }
    }
}

async fn send_envelope(
    sender: &mut (impl futures_util::Sink<Message> + Unpin),
    envelope: &UiEnvelope,
) -> Result<(), ()> {
    let Ok(text) = serde_json::to_string(envelope) else {
        return Err(());
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
