//! Connection session state.

use std::fmt;

use serde::Serialize;

/// Lifecycle phase of the duplex connection.
///
/// `Idle -> Connecting -> Open -> Closing -> Closed`, then back to
/// `Connecting` through the reconnection policy, or into `Exhausted` once the
/// retry ceiling is hit. `Exhausted` is left only by an explicit connect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never connected, or reset by shutdown.
    #[default]
    Idle,
    /// One open attempt in flight.
    Connecting,
    /// Link established; frames flow both ways.
    Open,
    /// Explicit teardown in progress.
    Closing,
    /// No link. A retry may be pending.
    Closed,
    /// Retry ceiling reached; no further automatic attempts.
    Exhausted,
}

impl ConnectionState {
    /// Whether outbound frames can be written.
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
