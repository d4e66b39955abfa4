use anyhow::{Context, Result};
use dropmesh_core::IceServerConfig;
use std::net::{Ipv4Addr, SocketAddr};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Relay server settings.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Handed to every client on connect for building its peer transports.
    pub ice_servers: Vec<IceServerConfig>,
    /// Depth of each room's command queue.
    pub room_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            ice_servers: vec![IceServerConfig::from_url(DEFAULT_STUN_SERVER)],
            room_queue_capacity: 100,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `PORT` and `DROPMESH_ICE_SERVERS`
    /// (comma separated URLs).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a valid port: {port:?}"))?;
            config.bind_addr.set_port(port);
        }

        if let Ok(servers) = std::env::var("DROPMESH_ICE_SERVERS") {
            config.ice_servers = parse_ice_servers(&servers);
        }

        Ok(config)
    }
}

pub(crate) fn parse_ice_servers(raw: &str) -> Vec<IceServerConfig> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(IceServerConfig::from_url)
        .collect()
}
