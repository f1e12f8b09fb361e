//! Pending user-approval requests (signing and pairing ceremonies).
//!
//! A SIGN request parks its handler on a oneshot until the UI decides or
//! the deadline passes; terminal states are terminal.

use std::collections::HashMap;

use lattsim_common::uimsg::{SigningRequestInfo, SigningRequestKind, SigningRequestStatus};
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn status(self) -> SigningRequestStatus {
        match self {
            Decision::Approved => SigningRequestStatus::Approved,
            Decision::Rejected => SigningRequestStatus::Rejected,
        }
    }
}

struct PendingEntry {
    info: SigningRequestInfo,
    decision_tx: oneshot::Sender<Decision>,
}

/// Store of pending approval requests for one device.
#[derive(Default)]
pub struct SigningStore {
    pending: Mutex<HashMap<Uuid, PendingEntry>>,
}

impl SigningStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending request. Returns its broadcastable info and the
    /// receiver the handler suspends on.
    pub async fn create(
        &self,
        kind: SigningRequestKind,
        payload: Value,
        timeout_ms: u64,
    ) -> (SigningRequestInfo, oneshot::Receiver<Decision>) {
        let (decision_tx, decision_rx) = oneshot::channel();
        let info = SigningRequestInfo {
            request_id: Uuid::new_v4(),
            kind,
            created_at: chrono::Utc::now().timestamp_millis(),
            timeout_ms,
            payload,
            status: SigningRequestStatus::Pending,
        };
        self.pending.lock().await.insert(
            info.request_id,
            PendingEntry {
                info: info.clone(),
                decision_tx,
            },
        );
        (info, decision_rx)
    }

    /// Resolve a pending request with a user decision. Returns the request
    /// info with its terminal status, or `None` if the id is unknown or
    /// already terminal.
    pub async fn resolve(&self, request_id: Uuid, decision: Decision) -> Option<SigningRequestInfo> {
        let entry = self.pending.lock().await.remove(&request_id)?;
        let mut info = entry.info;
        info.status = decision.status();
        // The handler may have timed out already; its receiver being gone is fine.
        let _ = entry.decision_tx.send(decision);
        Some(info)
    }

    /// Expire one request (deadline passed). The waiting handler, if any,
    /// observes a closed channel.
    pub async fn expire(&self, request_id: Uuid) -> Option<SigningRequestInfo> {
        let entry = self.pending.lock().await.remove(&request_id)?;
        let mut info = entry.info;
        info.status = SigningRequestStatus::Expired;
        Some(info)
    }

    /// Expire everything — device disposal. Returns the expired infos so the
    /// caller can broadcast completions.
    pub async fn expire_all(&self) -> Vec<SigningRequestInfo> {
        let mut pending = self.pending.lock().await;
        pending
            .drain()
            .map(|(_, entry)| {
                let mut info = entry.info;
                info.status = SigningRequestStatus::Expired;
                info
            })
            .collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}
