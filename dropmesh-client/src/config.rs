use dropmesh_core::IceServerConfig;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3000/ws";
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_HIGH_WATER_MARK: usize = 4 * 1024 * 1024;
pub const DEFAULT_BACKPRESSURE_POLL: Duration = Duration::from_millis(10);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Client settings.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub server_url: String,
    /// When empty, the servers announced by the relay are used.
    pub ice_servers: Vec<IceServerConfig>,
    pub chunk_size: usize,
    /// Sending pauses while any target buffers more than this many bytes.
    pub high_water_mark: usize,
    pub backpressure_poll: Duration,
    /// How long a finished send waits for targets to flush their buffers.
    pub drain_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_owned(),
            ice_servers: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            backpressure_poll: DEFAULT_BACKPRESSURE_POLL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Defaults with `DROPMESH_SERVER` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("DROPMESH_SERVER") {
            let url = url.trim();
            if !url.is_empty() {
                config.server_url = url.to_owned();
            }
        }
        config
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }
}
