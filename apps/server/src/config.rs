//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tandem_core::StoreConfig;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = first free port in 49500-49510).
    /// Override: `TANDEM_BIND_PORT`
    pub bind_port: u16,

    /// Idle window after which a session is reclaimed, in seconds.
    /// Override: `TANDEM_IDLE_TIMEOUT_SECS`
    pub idle_timeout_secs: u64,

    /// Interval of the background sweep in seconds (0 = only on access).
    pub sweep_interval_secs: u64,

    /// Length of generated session codes.
    pub code_length: usize,

    /// Attempts to find an unused session code before giving up.
    pub max_code_attempts: u32,

    /// Capacity of the session event channel behind the event stream.
    pub event_channel_capacity: usize,

    /// Base URL of the HTTP key-value store. Unset means in-memory.
    /// Override: `TANDEM_STORE_URL`
    pub store_url: Option<String>,

    /// Bearer token for the key-value store.
    /// Override: `TANDEM_STORE_TOKEN`
    pub store_token: String,

    /// Refuse to start when the key-value store is unreachable.
    pub store_required: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = tandem_core::Config::default();
        Self {
            bind_port: core.preferred_port,
            idle_timeout_secs: core.idle_timeout_secs,
            sweep_interval_secs: 300,
            code_length: core.code_length,
            max_code_attempts: core.max_code_attempts,
            event_channel_capacity: core.event_channel_capacity,
            store_url: None,
            store_token: String::new(),
            store_required: false,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides from `lookup`, skipping values that do not parse.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("TANDEM_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }

        if let Some(secs) = lookup("TANDEM_IDLE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.idle_timeout_secs = secs;
        }

        if let Some(url) = lookup("TANDEM_STORE_URL").filter(|v| !v.trim().is_empty()) {
            self.store_url = Some(url);
        }

        if let Some(token) = lookup("TANDEM_STORE_TOKEN") {
            self.store_token = token;
        }
    }

    /// Converts to tandem-core's Config type.
    pub fn to_core_config(&self) -> tandem_core::Config {
        let store = match &self.store_url {
            Some(url) => StoreConfig::Http {
                url: url.clone(),
                token: self.store_token.clone(),
                require: self.store_required,
            },
            None => StoreConfig::Memory,
        };
        tandem_core::Config {
            preferred_port: self.bind_port,
            idle_timeout_secs: self.idle_timeout_secs,
            sweep_interval_secs: self.sweep_interval_secs,
            code_length: self.code_length,
            max_code_attempts: self.max_code_attempts,
            event_channel_capacity: self.event_channel_capacity,
            store,
        }
    }
}
