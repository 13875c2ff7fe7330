//! Client configuration
//!
//! Loaded from a JSON file; every field is optional:
//!
//! ```json
//! {"base_url": "https://relay.example.com", "heartbeat_interval_secs": 30}
//! ```

use crate::channel::ChannelOptions;
use crate::error::ConfigError;
use crate::heartbeat::HEARTBEAT_INTERVAL;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "http://localhost:4321/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin of the session directory; the channel is reached on the same
    /// origin over ws/wss
    pub base_url: String,
    pub heartbeat_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            heartbeat_interval_secs: HEARTBEAT_INTERVAL.as_secs(),
        }
    }
}

impl ClientConfig {
    /// Load from a JSON file, rejecting an unparsable base URL
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.base_url()?;
        Ok(config)
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Ok(Url::parse(&self.base_url)?)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Channel options carrying the configured heartbeat
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            heartbeat_interval: self.heartbeat_interval(),
            ..ChannelOptions::default()
        }
    }
}
