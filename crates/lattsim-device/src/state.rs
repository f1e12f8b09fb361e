//! Mutable per-device state: identity, lock flag, wallets, SafeCard, K/V.
//!
//! All of this sits behind the device `RwLock` on [`crate::DeviceHandle`];
//! nothing here is concurrency-aware on its own.

use lattsim_common::config;
use lattsim_common::crypto;
use lattsim_common::models::{DeviceInfo, FirmwareVersion, SafeCard, WalletDescriptor};
use lattsim_common::uimsg::{ActiveWalletsSync, ClientStateSync, SafeCardSync, WalletSync};
use serde_json::{Value, json};

use crate::kv::KvStore;

#[derive(Debug)]
pub struct DeviceState {
    pub info: DeviceInfo,
    /// 16-byte hardware serial, random unless the UI syncs one.
    pub serial: [u8; 16],
    pub is_locked: bool,
    /// Client-visible connection flag, owned by the UI.
    pub is_connected: bool,
    pub internal_wallet: WalletDescriptor,
    pub external_wallet: Option<WalletDescriptor>,
    pub active_safecard: Option<SafeCard>,
    pub kv: KvStore,
    /// Opaque UI-owned configuration blob, echoed back on state broadcasts.
    pub ui_config: Value,
    /// Opaque UI-owned account cache keyed by wallet.
    pub wallet_accounts: Value,
}

impl DeviceState {
    pub fn new(device_id: &str) -> Self {
        let cfg = config::get();
        let firmware = cfg
            .device
            .firmware
            .parse::<FirmwareVersion>()
            .unwrap_or_else(|err| {
                tracing::warn!(%err, "Bad configured firmware version, using 0.15.0");
                FirmwareVersion::new(0, 15, 0)
            });
        Self {
            info: DeviceInfo {
                device_id: device_id.to_owned(),
                name: cfg.device.name.clone(),
                firmware_version: firmware,
            },
            serial: crypto::random_device_id(),
            is_locked: false,
            is_connected: false,
            internal_wallet: WalletDescriptor::internal(&cfg.device.name),
            external_wallet: None,
            active_safecard: None,
            kv: KvStore::new(),
            ui_config: Value::Null,
            wallet_accounts: Value::Null,
        }
    }

    pub fn firmware(&self) -> FirmwareVersion {
        self.info.firmware_version
    }

    /// The wallet descriptor derivation and signing should target: the
    /// SafeCard-backed external wallet when one is active, otherwise the
    /// internal seed.
    pub fn active_wallet(&self) -> &WalletDescriptor {
        self.external_wallet.as_ref().unwrap_or(&self.internal_wallet)
    }

    /// Overwrite device-scoped fields from UI-persisted state. Session
    /// pairing bits are deliberately out of reach from here.
    pub fn apply_sync(&mut self, sync: ClientStateSync) {
        if let Some(info) = sync.device_info {
            if let Some(firmware) = info.firmware() {
                self.info.firmware_version = firmware;
            }
            if let Some(name) = info.name {
                self.info.name = name;
            }
        }
        if let Some(wallets) = sync.active_wallets {
            self.apply_wallet_sync(wallets);
        }
        if let Some(records) = sync.kv_records {
            self.kv
                .replace_all(records.into_iter().map(|r| (r.id, r.key, r.value)));
        }
    }

    fn apply_wallet_sync(&mut self, wallets: ActiveWalletsSync) {
        if let Some(internal) = wallets.internal.as_ref().and_then(wallet_from_sync) {
            self.internal_wallet = internal;
        }
        self.external_wallet = wallets.external.as_ref().and_then(wallet_from_sync);
    }

    pub fn set_active_wallet(&mut self, wallet: Option<WalletSync>) {
        match wallet.as_ref().and_then(wallet_from_sync) {
            Some(descriptor) if descriptor.external => self.external_wallet = Some(descriptor),
            Some(descriptor) => self.internal_wallet = descriptor,
            None => self.external_wallet = None,
        }
    }

    /// Make a SafeCard active (or clear it). The external wallet slot
    /// follows the SafeCard.
    pub fn set_active_safecard(&mut self, sync: Option<SafeCardSync>) {
        match sync {
            Some(card) => {
                let uid = parse_uid(&card.uid).unwrap_or_else(crypto::random_wallet_uid);
                let safecard = SafeCard::new(card.id, uid, card.name, &card.mnemonic);
                self.external_wallet = Some(WalletDescriptor::external(uid, &safecard.name));
                self.active_safecard = Some(safecard);
            }
            None => {
                self.active_safecard = None;
                self.external_wallet = None;
            }
        }
    }

    /// Wipe everything back to factory state, keeping the device id.
    pub fn reset_full(&mut self) {
        let device_id = self.info.device_id.clone();
        *self = Self::new(&device_id);
    }

    /// Snapshot broadcast to the UI as `device_state`.
    pub fn snapshot(&self) -> Value {
        json!({
            "deviceId": self.info.device_id,
            "name": self.info.name,
            "firmwareVersion": self.info.firmware_version.wire_bytes(),
            "serial": hex::encode(self.serial),
            "isLocked": self.is_locked,
            "isConnected": self.is_connected,
            "activeWallets": {
                "internal": self.internal_wallet,
                "external": self.external_wallet,
            },
            "activeSafeCardId": self.active_safecard.as_ref().map(|c| c.id.clone()),
            "kvRecords": self.kv.records(),
            "config": self.ui_config,
            "walletAccounts": self.wallet_accounts,
        })
    }
}

fn wallet_from_sync(sync: &WalletSync) -> Option<WalletDescriptor> {
    Some(WalletDescriptor {
        uid: parse_uid(&sync.uid)?,
        external: sync.external,
        name: sync.name.as_bytes().to_vec(),
        capabilities: sync.capabilities,
    })
}

fn parse_uid(hex_uid: &str) -> Option<[u8; 32]> {
    hex::decode(hex_uid).ok()?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattsim_common::uimsg::{DeviceInfoSync, KvRecordSync};

    #[test]
    fn sync_overwrites_device_fields() {
        let mut state = DeviceState::new("bench-0");
        state.kv.add("old", "gone").unwrap();

        state.apply_sync(ClientStateSync {
            device_info: Some(DeviceInfoSync {
                name: Some("renamed".into()),
                firmware_version: Some(vec![0, 14, 2, 0]),
            }),
            active_wallets: None,
            kv_records: Some(vec![KvRecordSync {
                id: Some(7),
                key: "Tag".into(),
                value: "synced".into(),
            }]),
        });

        assert_eq!(state.info.name, "renamed");
        assert_eq!(state.firmware(), FirmwareVersion::new(0, 14, 2));
        assert!(state.kv.get("old").is_none());
        assert_eq!(state.kv.get("tag").unwrap().value, "synced");
    }

    #[test]
    fn safecard_drives_the_external_wallet_slot() {
        let mut state = DeviceState::new("bench-1");
        assert!(!state.active_wallet().external);

        state.set_active_safecard(Some(SafeCardSync {
            id: "card-1".into(),
            uid: "11".repeat(32),
            name: "Backup".into(),
            mnemonic: "  abandon   abandon ".into(),
        }));
        let active = state.active_wallet();
        assert!(active.external);
        assert_eq!(active.uid, [0x11; 32]);
        assert_eq!(
            state.active_safecard.as_ref().unwrap().mnemonic,
            "abandon abandon"
        );

        state.set_active_safecard(None);
        assert!(!state.active_wallet().external);
    }

    #[test]
    fn full_reset_returns_to_factory_state() {
        let mut state = DeviceState::new("bench-2");
        state.is_locked = true;
        state.kv.add("tag", "v").unwrap();
        let old_uid = state.internal_wallet.uid;

        state.reset_full();
        assert!(!state.is_locked);
        assert!(state.kv.is_empty());
        assert_eq!(state.info.device_id, "bench-2");
        // Factory reset rolls a fresh seed.
        assert_ne!(state.internal_wallet.uid, old_uid);
    }
}
