//! `DeviceHandle` — one simulated device and everything attached to it.
//!
//! Lock layout follows the resource model: the registry guards the handle
//! map, each handle guards its own state behind a `RwLock`, each session
//! sits behind its own `Mutex`. Handlers lock exactly what they touch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lattsim_common::config;
use lattsim_common::crypto::PUBLIC_KEY_LEN;
use lattsim_common::error::{SimError, SimResult};
use lattsim_common::uimsg::{ResetType, UiMessage};
use tokio::sync::{Mutex, RwLock};

use crate::link::UiLink;
use crate::pairing::{PairingController, PairingWindow};
use crate::session::Session;
use crate::signing::SigningStore;
use crate::state::DeviceState;

pub struct DeviceHandle {
    pub id: String,
    pub state: RwLock<DeviceState>,
    sessions: Mutex<HashMap<[u8; PUBLIC_KEY_LEN], Arc<Mutex<Session>>>>,
    /// Every ephemeral id a session has ever issued, mapped back to its
    /// client key. SECURE frames carry only the id, so this is both the
    /// session lookup and the replay detector: a hit on a no-longer-current
    /// id is a regression.
    ephem_index: Mutex<HashMap<u32, [u8; PUBLIC_KEY_LEN]>>,
    pub pairing: PairingController,
    pub signing: SigningStore,
    pub link: UiLink,
}

impl DeviceHandle {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_owned(),
            state: RwLock::new(DeviceState::new(id)),
            sessions: Mutex::new(HashMap::new()),
            ephem_index: Mutex::new(HashMap::new()),
            pairing: PairingController::new(),
            signing: SigningStore::new(),
            link: UiLink::new(),
        })
    }

    /// Session lookup/creation for a CONNECT frame. An existing session is
    /// re-keyed in place; pairing survives the reconnect.
    pub async fn connect_session(
        &self,
        client_pub: &[u8],
    ) -> SimResult<Arc<Mutex<Session>>> {
        let key: [u8; PUBLIC_KEY_LEN] = client_pub
            .try_into()
            .map_err(|_| SimError::Invalid("client public key must be 65 bytes".into()))?;

        let existing = self.sessions.lock().await.get(&key).cloned();
        let session = match existing {
            Some(session) => {
                // Re-key outside the map lock; a long-running request on
                // this session delays only this client, not the device.
                let seed = {
                    let mut guard = session.lock().await;
                    guard.reconnect();
                    guard.ephemeral_id()
                };
                self.index_ephemeral(seed, key).await;
                session
            }
            None => {
                let session = Session::connect(client_pub)
                    .map_err(|err| SimError::Invalid(format!("bad client public key: {err}")))?;
                let seed = session.ephemeral_id();
                let session = Arc::new(Mutex::new(session));
                let session = self
                    .sessions
                    .lock()
                    .await
                    .entry(key)
                    .or_insert(session)
                    .clone();
                self.index_ephemeral(seed, key).await;
                tracing::debug!(device = %self.id, client = %hex::encode(&key[1..9]), "Session created");
                session
            }
        };
        Ok(session)
    }

    pub async fn session(&self, client_pub: &[u8; PUBLIC_KEY_LEN]) -> Option<Arc<Mutex<Session>>> {
        self.sessions.lock().await.get(client_pub).cloned()
    }

    /// Record an ephemeral id a session has issued. Called on connect and
    /// after every rotation, while the session lock is held.
    pub async fn index_ephemeral(&self, ephemeral_id: u32, client_pub: [u8; PUBLIC_KEY_LEN]) {
        if let Some(previous) = self
            .ephem_index
            .lock()
            .await
            .insert(ephemeral_id, client_pub)
        {
            if previous != client_pub {
                tracing::warn!(device = %self.id, ephemeral_id, "Ephemeral id collision across sessions");
            }
        }
    }

    /// Resolve the session a SECURE frame addresses via its ephemeral id.
    pub async fn find_session_by_ephemeral_id(
        &self,
        ephemeral_id: u32,
    ) -> Option<([u8; PUBLIC_KEY_LEN], Arc<Mutex<Session>>)> {
        let key = *self.ephem_index.lock().await.get(&ephemeral_id)?;
        let session = self.sessions.lock().await.get(&key).cloned()?;
        Some((key, session))
    }

    /// Drop a single session — the ephemeral-id-regression path.
    pub async fn dispose_session(&self, client_pub: &[u8; PUBLIC_KEY_LEN]) {
        if self.sessions.lock().await.remove(client_pub).is_some() {
            self.ephem_index
                .lock()
                .await
                .retain(|_, key| key != client_pub);
            tracing::warn!(device = %self.id, "Session disposed");
        }
    }

    /// Open the pairing window, announce it, and arm the expiry timer.
    /// A window already open is replaced without an end event.
    pub async fn start_pairing(self: &Arc<Self>) -> PairingWindow {
        let timeout_ms = config::get().pairing.window_ms;
        let window = self.pairing.open(timeout_ms).await;

        self.link.broadcast(UiMessage::PairingModeStarted {
            code: window.code.clone(),
            started_at: window.started_at,
            timeout_ms: window.timeout_ms,
        });
        tracing::info!(device = %self.id, "Pairing window opened");

        let handle = Arc::clone(self);
        let window_id = window.window_id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            if handle.pairing.close_if(window_id).await {
                tracing::info!(device = %handle.id, "Pairing window timed out");
                handle.link.broadcast(UiMessage::PairingModeEnded);
            }
        });

        window
    }

    /// Close the pairing window if one is open, emitting exactly one
    /// `pairing_mode_ended`. Returns whether a window was closed.
    pub async fn end_pairing(&self) -> bool {
        if self.pairing.close().await {
            self.link.broadcast(UiMessage::PairingModeEnded);
            true
        } else {
            false
        }
    }

    /// Clear the pairing bit on every session and close any open window —
    /// the UI-driven unpair.
    pub async fn unpair_all(&self) {
        {
            let sessions = self.sessions.lock().await;
            for session in sessions.values() {
                session.lock().await.set_paired(false);
            }
        }
        self.end_pairing().await;
        self.link
            .broadcast(UiMessage::PairingChanged { is_paired: false });
        tracing::info!(device = %self.id, "All sessions unpaired");
    }

    /// Dispose every session: waiters fail, pending signing requests expire
    /// (with completion broadcasts), the session table empties.
    pub async fn dispose_sessions(&self) {
        self.sessions.lock().await.clear();
        self.ephem_index.lock().await.clear();
        self.link.fail_all().await;
        for info in self.signing.expire_all().await {
            self.link.broadcast(UiMessage::SigningRequestCompleted {
                request_id: info.request_id,
                status: info.status,
            });
        }
        tracing::info!(device = %self.id, "Sessions disposed");
    }

    pub async fn reset(self: &Arc<Self>, reset_type: ResetType) {
        self.dispose_sessions().await;
        self.end_pairing().await;
        if reset_type == ResetType::Full {
            self.state.write().await.reset_full();
        }
        self.broadcast_state().await;
        tracing::info!(device = %self.id, ?reset_type, "Device reset");
    }

    /// Push the current `device_state` snapshot to the UI.
    pub async fn broadcast_state(&self) {
        let snapshot = self.state.read().await.snapshot();
        self.link.broadcast(UiMessage::DeviceState(snapshot));
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattsim_common::crypto::KeyPair;

    #[tokio::test]
    async fn reconnect_reuses_the_session() {
        let handle = DeviceHandle::new("dev-a");
        let client = KeyPair::generate();

        let first = handle.connect_session(&client.public_bytes()).await.unwrap();
        first.lock().await.set_paired(true);

        let second = handle.connect_session(&client.public_bytes()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.lock().await.is_paired());
        assert_eq!(handle.session_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pairing_window_times_out_with_exactly_one_end_event() {
        let handle = DeviceHandle::new("dev-b");
        let mut rx = handle.link.subscribe();

        handle.start_pairing().await;
        let UiMessage::PairingModeStarted { code, .. } = rx.recv().await.unwrap().message else {
            panic!("expected pairing_mode_started");
        };
        assert_eq!(code.len(), 8);

        // Run past the window plus slack; only one end event may appear.
        tokio::time::sleep(Duration::from_millis(61_000)).await;
        let UiMessage::PairingModeEnded = rx.recv().await.unwrap().message else {
            panic!("expected pairing_mode_ended");
        };
        assert!(rx.try_recv().is_err());
        assert!(!handle.pairing.is_active().await);
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_window_suppresses_the_stale_timer() {
        let handle = DeviceHandle::new("dev-c");
        let mut rx = handle.link.subscribe();

        handle.start_pairing().await;
        tokio::time::sleep(Duration::from_millis(30_000)).await;
        handle.start_pairing().await;

        // 31s later the first timer has fired against a replaced window.
        tokio::time::sleep(Duration::from_millis(31_000)).await;
        assert!(handle.pairing.is_active().await);

        // Drain: two starts, no end yet.
        let mut ends = 0;
        while let Ok(envelope) = rx.try_recv() {
            if matches!(envelope.message, UiMessage::PairingModeEnded) {
                ends += 1;
            }
        }
        assert_eq!(ends, 0);
    }

    #[tokio::test]
    async fn disposal_expires_signing_and_fails_waiters() {
        let handle = DeviceHandle::new("dev-d");
        let client = KeyPair::generate();
        handle.connect_session(&client.public_bytes()).await.unwrap();

        let (_info, rx) = handle
            .signing
            .create(
                lattsim_common::uimsg::SigningRequestKind::Sign,
                serde_json::Value::Null,
                1000,
            )
            .await;

        let mut events = handle.link.subscribe();
        handle.dispose_sessions().await;

        assert_eq!(handle.session_count().await, 0);
        assert!(rx.await.is_err());
        let completed = events.recv().await.unwrap();
        assert!(matches!(
            completed.message,
            UiMessage::SigningRequestCompleted { .. }
        ));
    }
}
