//! Key/value store operations.
//!
//! Reads come straight from device state. Mutations validate locally
//! first (a duplicate key costs no user interaction), then mirror to the
//! UI — which both captures the user's approval and keeps the UI's
//! persisted copy authoritative — and only then touch the store.

use std::sync::Arc;
use std::time::Duration;

use lattsim_common::config;
use lattsim_common::error::{SimError, SimResult};
use lattsim_common::models::KV_ENTRY_MAX_BYTES;
use lattsim_common::uimsg::KvRecordSync;
use lattsim_device::DeviceHandle;
use lattsim_protocol::ops::{
    self, AddKvRecordsRequest, GetKvRecordsRequest, RemoveKvRecordsRequest,
};
use serde_json::json;

/// Page-size ceiling, matching the address-count ceiling.
const MAX_PAGE: u8 = 10;

pub async fn get_records(device: &Arc<DeviceHandle>, payload: &[u8]) -> SimResult<Vec<u8>> {
    let request = GetKvRecordsRequest::decode(payload).map_err(super::invalid)?;
    if request.count == 0 || request.count > MAX_PAGE {
        return Err(SimError::Invalid(format!("page size must be 1..={MAX_PAGE}")));
    }

    let state = device.state.read().await;
    let (total, records) = state.kv.page(request.start, request.count);
    Ok(ops::encode_kv_page(total, &records))
}

pub async fn add_records(device: &Arc<DeviceHandle>, payload: &[u8]) -> SimResult<Vec<u8>> {
    let request = AddKvRecordsRequest::decode(payload).map_err(super::invalid)?;
    if request.records.is_empty() || request.records.len() > MAX_PAGE as usize {
        return Err(SimError::Invalid(format!("record count must be 1..={MAX_PAGE}")));
    }

    // Decode and bound-check up front; reject duplicates (against the store
    // and within the batch) before involving the user.
    let mut records: Vec<(String, String)> = Vec::with_capacity(request.records.len());
    for (key, value) in &request.records {
        let key = String::from_utf8(key.clone())
            .map_err(|_| SimError::Invalid("key is not valid UTF-8".into()))?;
        let value = String::from_utf8(value.clone())
            .map_err(|_| SimError::Invalid("value is not valid UTF-8".into()))?;
        if key.is_empty() || key.len() > KV_ENTRY_MAX_BYTES || value.len() > KV_ENTRY_MAX_BYTES {
            return Err(SimError::Invalid(format!(
                "keys and values must be 1..={KV_ENTRY_MAX_BYTES} bytes"
            )));
        }
        records.push((key, value));
    }

    {
        let state = device.state.read().await;
        for (i, (key, _)) in records.iter().enumerate() {
            if state.kv.get(key).is_some() {
                return Err(SimError::AlreadyExists);
            }
            let lowered = key.to_lowercase();
            if records[..i].iter().any(|(k, _)| k.to_lowercase() == lowered) {
                return Err(SimError::AlreadyExists);
            }
        }
    }

    // UI round-trip: approval plus persistence, before the store mutates.
    device
        .link
        .request(
            "kv_add_request",
            json!({
                "records": records
                    .iter()
                    .map(|(key, value)| json!({"key": key, "value": value}))
                    .collect::<Vec<_>>(),
            }),
            ui_deadline(),
        )
        .await?;

    {
        let mut state = device.state.write().await;
        // A concurrent add may have landed while the UI was deciding;
        // re-check the whole batch before mutating anything.
        if records.iter().any(|(key, _)| state.kv.get(key).is_some()) {
            return Err(SimError::AlreadyExists);
        }
        for (key, value) in &records {
            state.kv.add(key, value)?;
        }
    }
    device.broadcast_state().await;
    Ok(Vec::new())
}

pub async fn remove_records(device: &Arc<DeviceHandle>, payload: &[u8]) -> SimResult<Vec<u8>> {
    let request = RemoveKvRecordsRequest::decode(payload).map_err(super::invalid)?;
    if request.ids.is_empty() || request.ids.len() > MAX_PAGE as usize {
        return Err(SimError::Invalid(format!("id count must be 1..={MAX_PAGE}")));
    }

    let doomed: Vec<KvRecordSync> = {
        let state = device.state.read().await;
        request
            .ids
            .iter()
            .map(|&id| {
                state
                    .kv
                    .records()
                    .iter()
                    .find(|r| r.id == id)
                    .map(KvRecordSync::from)
                    .ok_or_else(|| SimError::Invalid(format!("no record with id {id}")))
            })
            .collect::<SimResult<_>>()?
    };

    device
        .link
        .request("kv_remove_request", json!({ "records": doomed }), ui_deadline())
        .await?;

    {
        let mut state = device.state.write().await;
        for id in &request.ids {
            state.kv.remove(*id);
        }
    }
    device.broadcast_state().await;
    Ok(Vec::new())
}

fn ui_deadline() -> Duration {
    Duration::from_millis(config::get().ui.request_timeout_ms)
}
