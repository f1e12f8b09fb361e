//! Process-wide registry of simulated devices.
//!
//! The only global mutable state in the system. Owned at process root and
//! passed by reference; the map's own lock guards structural mutation only,
//! each device guards its fields itself.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::handle::DeviceHandle;

#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Arc<DeviceHandle>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a device, creating it on first reference.
    pub async fn get_or_create(&self, device_id: &str) -> Arc<DeviceHandle> {
        if let Some(handle) = self.devices.read().await.get(device_id) {
            return handle.clone();
        }
        let mut devices = self.devices.write().await;
        // Racing creators may both reach the write lock; second one reuses.
        devices
            .entry(device_id.to_owned())
            .or_insert_with(|| {
                tracing::info!(device = %device_id, "Device created");
                DeviceHandle::new(device_id)
            })
            .clone()
    }

    pub async fn get(&self, device_id: &str) -> Option<Arc<DeviceHandle>> {
        self.devices.read().await.get(device_id).cloned()
    }

    /// Remove a device entirely, disposing its sessions first.
    pub async fn remove(&self, device_id: &str) -> bool {
        let removed = self.devices.write().await.remove(device_id);
        match removed {
            Some(handle) => {
                handle.dispose_sessions().await;
                true
            }
            None => false,
        }
    }

    pub async fn active_count(&self) -> usize {
        self.devices.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_on_first_reference() {
        let registry = DeviceRegistry::new();
        assert_eq!(registry.active_count().await, 0);

        let a = registry.get_or_create("alpha").await;
        let b = registry.get_or_create("alpha").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn remove_disposes_and_forgets() {
        let registry = DeviceRegistry::new();
        registry.get_or_create("alpha").await;
        assert!(registry.remove("alpha").await);
        assert!(!registry.remove("alpha").await);
        assert!(registry.get("alpha").await.is_none());
    }
}
