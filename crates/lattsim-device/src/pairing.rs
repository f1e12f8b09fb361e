//! Pairing window lifecycle.
//!
//! At most one window is active per device. Windows are identified by a
//! random id so the expiry timer for a replaced window can never close its
//! successor.

use lattsim_common::crypto;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct PairingWindow {
    pub code: String,
    pub window_id: [u8; 8],
    /// Unix millis.
    pub started_at: i64,
    pub timeout_ms: u64,
}

#[derive(Debug, Default)]
pub struct PairingController {
    window: Mutex<Option<PairingWindow>>,
}

impl PairingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a window (replacing any active one) and return it. The caller
    /// broadcasts `pairing_mode_started` and arms the expiry timer.
    pub async fn open(&self, timeout_ms: u64) -> PairingWindow {
        let window = PairingWindow {
            code: crypto::pairing_code(),
            window_id: crypto::random_request_id(),
            started_at: chrono::Utc::now().timestamp_millis(),
            timeout_ms,
        };
        *self.window.lock().await = Some(window.clone());
        window
    }

    /// Close the window only if it is still the one identified by
    /// `window_id` — the expiry-timer path. Returns whether a close happened.
    pub async fn close_if(&self, window_id: [u8; 8]) -> bool {
        let mut guard = self.window.lock().await;
        if guard.as_ref().is_some_and(|w| w.window_id == window_id) {
            *guard = None;
            true
        } else {
            false
        }
    }

    /// Close whatever window is active. Returns whether one was.
    pub async fn close(&self) -> bool {
        self.window.lock().await.take().is_some()
    }

    pub async fn current(&self) -> Option<PairingWindow> {
        self.window.lock().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.window.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_window_at_a_time() {
        let controller = PairingController::new();
        let first = controller.open(60_000).await;
        let second = controller.open(60_000).await;

        let current = controller.current().await.unwrap();
        assert_eq!(current.window_id, second.window_id);
        assert_ne!(first.window_id, second.window_id);
    }

    #[tokio::test]
    async fn stale_timer_cannot_close_a_newer_window() {
        let controller = PairingController::new();
        let first = controller.open(60_000).await;
        let second = controller.open(60_000).await;

        assert!(!controller.close_if(first.window_id).await);
        assert!(controller.is_active().await);
        assert!(controller.close_if(second.window_id).await);
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn explicit_close_reports_whether_a_window_existed() {
        let controller = PairingController::new();
        assert!(!controller.close().await);
        controller.open(60_000).await;
        assert!(controller.close().await);
        assert!(!controller.close().await);
    }
}
