//! Server configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! or partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BIND_ADDRESS, DEFAULT_SIDE_CHANNEL_ACCEPT_TIMEOUT, DEFAULT_SIDE_CHANNEL_HOST,
    DEFAULT_STREAM_HIGH_WATER_MARK,
};
use crate::error::{ServerError, ServerResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address of the main channel.
    pub bind: String,
    /// Host side-channel listeners bind to, on an ephemeral port.
    pub side_channel_host: String,
    pub side_channel_accept_timeout_secs: u64,
    pub stream_high_water_mark: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDRESS.to_string(),
            side_channel_host: DEFAULT_SIDE_CHANNEL_HOST.to_string(),
            side_channel_accept_timeout_secs: DEFAULT_SIDE_CHANNEL_ACCEPT_TIMEOUT.as_secs(),
            stream_high_water_mark: DEFAULT_STREAM_HIGH_WATER_MARK,
        }
    }
}

impl ServerConfig {
    /// Config for tests: ephemeral main port, short accept timeout.
    pub fn ephemeral() -> Self {
        Self {
            bind: "127.0.0.1:0".to_string(),
            side_channel_accept_timeout_secs: 5,
            ..Self::default()
        }
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(ServerError::from)
    }

    /// Read a config file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn side_channel_accept_timeout(&self) -> Duration {
        Duration::from_secs(self.side_channel_accept_timeout_secs)
    }
}
