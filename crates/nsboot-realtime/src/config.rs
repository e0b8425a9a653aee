//! Client configuration.

use std::time::Duration;

use nsboot_core::ReconnectPolicy;
use nsboot_core::endpoint::DEFAULT_PATH;

/// Default bound on a single open attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything [`RealtimeClient`](crate::RealtimeClient) needs to run.
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    /// Dashboard origin, e.g. `https://boot.example.com`.
    pub origin: String,
    /// Path of the realtime endpoint on that origin.
    pub path: String,
    /// Backoff base and retry ceiling.
    pub policy: ReconnectPolicy,
    /// Bound on each open attempt.
    pub connect_timeout: Duration,
    /// Re-send `subscribe` for tracked channels after every open.
    pub resubscribe_on_reconnect: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_owned(),
            path: DEFAULT_PATH.to_owned(),
            policy: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            resubscribe_on_reconnect: true,
        }
    }
}

impl RealtimeConfig {
    /// Default config for `origin`.
    pub fn for_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }
}
