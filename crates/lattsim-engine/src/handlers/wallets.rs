//! `getWallets` — report the active wallet slots.

use std::sync::Arc;

use lattsim_common::error::SimResult;
use lattsim_device::DeviceHandle;
use lattsim_protocol::ops;

pub async fn get_wallets(device: &Arc<DeviceHandle>) -> SimResult<Vec<u8>> {
    let state = device.state.read().await;
    Ok(ops::encode_wallets(
        Some(&state.internal_wallet),
        state.external_wallet.as_ref(),
    ))
}
