//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section is `#[serde(default)]`,
//! so a partial file only needs the keys it changes.

use nsboot_core::ReconnectPolicy;
use nsboot_core::backoff::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};
use nsboot_core::endpoint::DEFAULT_PATH;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the dashboard client.
///
/// ```json
/// {
///   "realtime": { "origin": "https://boot.lan", "channels": ["images"] },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardSettings {
    /// Realtime connection settings.
    pub realtime: RealtimeSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl DashboardSettings {
    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.realtime.origin.trim().is_empty() {
            return Err(SettingsError::InvalidValue("realtime.origin is empty".into()));
        }
        if !self.realtime.path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "realtime.path must start with '/': {}",
                self.realtime.path
            )));
        }
        if self.realtime.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "realtime.connectTimeoutMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Realtime connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Origin of the NSBoot server, e.g. `https://boot.lan`.
    pub origin: String,
    /// Realtime endpoint path.
    pub path: String,
    /// Delay before the first retry, in ms.
    pub base_delay_ms: u64,
    /// Retries before giving up.
    pub max_reconnect_attempts: u32,
    /// Bound on each open attempt, in ms.
    pub connect_timeout_ms: u64,
    /// Re-send channel subscriptions after each reconnect.
    pub resubscribe_on_reconnect: bool,
    /// Channels to subscribe on startup.
    pub channels: Vec<String>,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_owned(),
            path: DEFAULT_PATH.to_owned(),
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            connect_timeout_ms: 10_000,
            resubscribe_on_reconnect: true,
            channels: Vec::new(),
        }
    }
}

impl RealtimeSettings {
    /// The reconnection policy these settings describe.
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: self.base_delay_ms,
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// One JSON object per line instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}
