//! # lattsim server
//!
//! Main binary wiring the simulator together:
//! - Wire protocol endpoint (client SDKs POST frames to `/{device_id}`)
//! - UI control channel (WebSocket at `/ws/device/{device_id}`)
//!
//! Devices are created lazily on first reference from either side and live
//! in a process-wide registry.

use lattsim_device::DeviceRegistry;
use lattsim_engine::AppState;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = lattsim_common::config::init()?;

    // Initialize tracing (structured logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lattsim=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .init();

    tracing::info!("🔐 Starting lattsim v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "   Simulated firmware {} · pairing window {}s",
        config.device.firmware,
        config.pairing.window_ms / 1000
    );

    // === Device registry ===
    // The only global mutable state: deviceId → device, created on demand.
    let registry = Arc::new(DeviceRegistry::new());

    // === Routers ===
    // Both endpoints share one listener; the wire protocol posts frames to
    // /{device_id}, the UI connects to /ws/device/{device_id}.
    let app = lattsim_engine::build_router(AppState {
        registry: registry.clone(),
    })
    .merge(lattsim_uilink::build_router(registry));

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("📡 Wire protocol listening on http://{addr}/{{device_id}}");
    tracing::info!("🔌 UI channel listening on ws://{addr}/ws/device/{{device_id}}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
