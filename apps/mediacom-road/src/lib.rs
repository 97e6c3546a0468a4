//! MediaCom road: the signaling broker behind the walkie-talkie app.
//!
//! Clients hold one WebSocket each, join a named room, and use the broker to
//! swap WebRTC offers, answers and ICE candidates with their peers. Presence
//! (`user-joined`, `user-left`) and push-to-talk state (`user-speaking`) fan
//! out to the rest of the room. Media never passes through here.

pub mod broker;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod handlers;
pub mod hub;
pub mod signaling;
pub mod telemetry;
pub mod websocket;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{get_status, health_check};
use crate::hub::HubHandle;
use crate::websocket::websocket_handler;

/// HTTP + WebSocket routes backed by `hub`
pub fn router(hub: HubHandle) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .route("/ws", get(websocket_handler))
        .route("/status", get(get_status))
        .route("/health", get(health_check))
        .with_state(hub)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve `router(hub)` on an already bound listener until the server stops
pub async fn serve(listener: TcpListener, hub: HubHandle) -> std::io::Result<()> {
    axum::serve(
        listener,
        router(hub).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
