//! Core configuration types.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_CODE_ATTEMPTS, DEFAULT_SESSION_CODE_LENGTH,
    EVENT_CHANNEL_CAPACITY, MAX_SESSION_CODE_LENGTH, MIN_IDLE_TIMEOUT_SECS,
    MIN_SESSION_CODE_LENGTH,
};

/// Which session store backend to use.
///
/// Selected once at startup; services only ever see the `SessionStore` trait.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-process map. Sessions do not survive a restart.
    #[default]
    Memory,
    /// External HTTP key-value backend.
    Http {
        /// Base URL of the REST API.
        url: String,
        /// Bearer token.
        #[serde(default)]
        token: String,
        /// Fail startup instead of falling back to memory when unreachable.
        #[serde(default)]
        require: bool,
    },
}

/// Configuration for the Tandem session service.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP server (0 = auto-allocate).
    pub preferred_port: u16,

    // Sessions
    /// Sessions idle for longer than this are reclaimed (seconds).
    pub idle_timeout_secs: u64,

    /// Interval for the background staleness sweep (seconds, 0 = disabled).
    ///
    /// Reclamation always runs opportunistically at the start of session
    /// operations; the sweep only bounds how long an idle session lingers
    /// when nobody is calling in.
    pub sweep_interval_secs: u64,

    /// Length of generated session codes.
    pub code_length: usize,

    /// Attempts to find an unused session code before giving up.
    pub max_code_attempts: u32,

    // Storage
    /// Session store backend.
    pub store: StoreConfig,

    // Events
    /// Capacity of the session event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Config {
    /// Idle window in milliseconds.
    #[must_use]
    pub fn idle_timeout_millis(&self) -> u64 {
        self.idle_timeout_secs.saturating_mul(1000)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.idle_timeout_secs < MIN_IDLE_TIMEOUT_SECS {
            return Err(format!(
                "idle_timeout_secs must be >= {}",
                MIN_IDLE_TIMEOUT_SECS
            ));
        }
        if !(MIN_SESSION_CODE_LENGTH..=MAX_SESSION_CODE_LENGTH).contains(&self.code_length) {
            return Err(format!(
                "code_length must be between {} and {}",
                MIN_SESSION_CODE_LENGTH, MAX_SESSION_CODE_LENGTH
            ));
        }
        if self.max_code_attempts == 0 {
            return Err("max_code_attempts must be >= 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if let StoreConfig::Http { url, .. } = &self.store {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("store url must be http(s), got {:?}", url));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            sweep_interval_secs: 0,
            code_length: DEFAULT_SESSION_CODE_LENGTH,
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
            store: StoreConfig::Memory,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}
