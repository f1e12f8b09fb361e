//! `getAddresses` — derive addresses through the UI's derivation service.

use std::sync::Arc;
use std::time::Duration;

use lattsim_common::config;
use lattsim_common::error::{SimError, SimResult};
use lattsim_device::DeviceHandle;
use lattsim_protocol::ops::{self, GetAddressesRequest};
use serde_json::{Value, json};

/// BIP-44 coin types the simulator derives for, by hardened path segment.
fn coin_type(segment: u32) -> Option<&'static str> {
    match segment {
        0x8000_003c => Some("ETH"),
        0x8000_0000 => Some("BTC"),
        _ => None,
    }
}

pub async fn get_addresses(device: &Arc<DeviceHandle>, payload: &[u8]) -> SimResult<Vec<u8>> {
    let request = GetAddressesRequest::decode(payload).map_err(super::invalid)?;
    let cfg = config::get();

    if !(3..=6).contains(&request.start_path.len()) {
        return Err(SimError::Invalid("derivation path must have 3..=6 segments".into()));
    }
    if request.count == 0 || request.count > cfg.limits.max_addresses {
        return Err(SimError::Invalid(format!(
            "address count must be 1..={}",
            cfg.limits.max_addresses
        )));
    }
    let coin = coin_type(request.start_path[1])
        .ok_or_else(|| SimError::Invalid("unsupported coin type".into()))?;

    let wallet_uid = hex::encode(device.state.read().await.active_wallet().uid);
    let response = device
        .link
        .request(
            "wallet_addresses_request",
            json!({
                "startPath": request.start_path,
                "count": request.count,
                "coinType": coin,
                "flag": request.flag,
                "walletUid": wallet_uid,
            }),
            Duration::from_millis(cfg.ui.request_timeout_ms),
        )
        .await?;

    let addresses = parse_addresses(&response, request.count as usize)?;
    Ok(ops::encode_addresses(&addresses))
}

/// The UI answers with `{addresses: [{address, publicKey, path}, ...]}`;
/// bare strings are tolerated.
fn parse_addresses(response: &Value, expected: usize) -> SimResult<Vec<String>> {
    let entries = response
        .get("addresses")
        .and_then(Value::as_array)
        .ok_or_else(|| SimError::Internal(anyhow::anyhow!("UI derivation result has no addresses")))?;

    let addresses: Vec<String> = entries
        .iter()
        .filter_map(|entry| {
            entry
                .as_str()
                .or_else(|| entry.get("address").and_then(Value::as_str))
                .map(str::to_owned)
        })
        .collect();

    if addresses.len() != expected {
        return Err(SimError::Internal(anyhow::anyhow!(
            "UI derived {} addresses, expected {expected}",
            addresses.len()
        )));
    }
    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_supported_coin_types() {
        assert_eq!(coin_type(0x8000003c), Some("ETH"));
        assert_eq!(coin_type(0x80000000), Some("BTC"));
        assert_eq!(coin_type(0x80000002), None);
        assert_eq!(coin_type(60), None); // unhardened
    }

    #[test]
    fn parses_both_address_shapes() {
        let objects = serde_json::json!({
            "addresses": [
                {"address": "0xabc", "publicKey": "04..", "path": [1]},
                {"address": "0xdef", "publicKey": "04..", "path": [2]},
            ]
        });
        assert_eq!(parse_addresses(&objects, 2).unwrap(), vec!["0xabc", "0xdef"]);

        let strings = serde_json::json!({ "addresses": ["bc1q..."] });
        assert_eq!(parse_addresses(&strings, 1).unwrap(), vec!["bc1q..."]);

        assert!(parse_addresses(&strings, 2).is_err());
        assert!(parse_addresses(&serde_json::json!({}), 1).is_err());
    }
}
