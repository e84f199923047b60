//! Configuration management
//!
//! Settings come from an optional TOML file, then `AVIATOR__<SECTION>__<KEY>`
//! environment variables. `PORT` overrides the API port.

use crate::error::Result;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment prefix for overrides, e.g. `AVIATOR__FEED__ACCESS_TOKEN`
pub const ENV_PREFIX: &str = "AVIATOR";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Upstream feed connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// WebSocket endpoint (wss://...)
    pub url: String,
    /// Origin header presented during the upgrade
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_zone")]
    pub zone: String,
    #[serde(default = "default_plugin")]
    pub plugin: String,
    /// Delay after open before subscribing
    #[serde(default = "default_subscribe_delay_ms")]
    pub subscribe_delay_ms: u64,
    /// Delay after open before requesting initial state
    #[serde(default = "default_state_request_delay_ms")]
    pub state_request_delay_ms: u64,
    /// Fixed wait between a close and the next attempt
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Latest-result poll period
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Wait after startup before the first poll
    #[serde(default = "default_poll_grace_ms")]
    pub poll_grace_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36".to_string()
}

fn default_agent_id() -> String {
    "1".to_string()
}

fn default_zone() -> String {
    "MiniGame".to_string()
}

fn default_plugin() -> String {
    "aviatorPlugin".to_string()
}

fn default_subscribe_delay_ms() -> u64 {
    1000
}

fn default_state_request_delay_ms() -> u64 {
    2000
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_poll_grace_ms() -> u64 {
    5000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl FeedConfig {
    /// Settings with every optional field at its default
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: None,
            user_agent: default_user_agent(),
            agent_id: default_agent_id(),
            access_token: String::new(),
            zone: default_zone(),
            plugin: default_plugin(),
            subscribe_delay_ms: default_subscribe_delay_ms(),
            state_request_delay_ms: default_state_request_delay_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_grace_ms: default_poll_grace_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    pub fn subscribe_delay(&self) -> Duration {
        Duration::from_millis(self.subscribe_delay_ms)
    }

    pub fn state_request_delay(&self) -> Duration {
        Duration::from_millis(self.state_request_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        // tokio intervals panic on a zero period
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn poll_grace(&self) -> Duration {
        Duration::from_millis(self.poll_grace_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Query API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Rows returned by /api/history without a usable `limit`
    #[serde(default = "default_history_limit")]
    pub history_default_limit: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_history_limit() -> usize {
    20
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            history_default_limit: default_history_limit(),
        }
    }
}

impl Config {
    /// Load from `path` (optional) and the environment
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(Path::new(path)).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;

        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.server.port = port;
        }

        Ok(config)
    }
}
