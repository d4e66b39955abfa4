use crate::config::ServerConfig;
use crate::room::RoomManager;
use crate::signaling::{SignalingService, ws_handler};
use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared handles every WebSocket connection works with.
#[derive(Clone)]
pub struct RelayState {
    pub signaling: SignalingService,
    pub rooms: RoomManager,
}

impl RelayState {
    pub fn new(config: &ServerConfig) -> Self {
        let signaling = SignalingService::new(config.ice_servers.clone());
        let rooms = RoomManager::new(Arc::new(signaling.clone()), config.room_queue_capacity);
        Self { signaling, rooms }
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

pub async fn serve(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    serve_with_listener(listener, config).await
}

pub async fn serve_with_listener(listener: TcpListener, config: ServerConfig) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("Signaling relay listening on {}", addr);

    axum::serve(listener, router(RelayState::new(&config)))
        .await
        .context("Relay server stopped")?;
    Ok(())
}
