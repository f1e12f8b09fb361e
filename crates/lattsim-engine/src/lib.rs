//! # lattsim-engine
//!
//! The client-facing side of a simulated device: an HTTP endpoint accepting
//! raw protocol frames (`POST /{device_id}`, octet body in, octet body out)
//! and the dispatcher that turns them into operation handler calls.

pub mod dispatcher;
pub mod handlers;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
};
use lattsim_device::DeviceRegistry;
use std::sync::Arc;

/// Shared application state available to the wire endpoint.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DeviceRegistry>,
}

/// Build the wire-protocol router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/{device_id}", post(wire_endpoint))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// One protocol exchange: a frame in the request body, a frame back.
/// Every outcome — including malformed input — is an HTTP 200 carrying a
/// well-formed reply frame; response codes travel inside the protocol.
async fn wire_endpoint(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let device = state.registry.get_or_create(&device_id).await;
    let reply = dispatcher::dispatch(&device, &body).await;
    (
        [(axum::http::header::CONTENT_TYPE, "application/octet-stream")],
        reply,
    )
}
