//! Wire envelope and typed event model.
//!
//! Every frame on the duplex connection is a JSON object
//! `{"type": ..., "data": ..., "timestamp": ...}`. Inbound envelopes are
//! validated and lifted into [`ServerEvent`], a variant per known `type`
//! with its own payload shape; unknown types stay as raw JSON in
//! [`ServerEvent::Other`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::DecodeError;

/// Subscription key that receives every dispatched event.
pub const WILDCARD: &str = "*";
/// Local event emitted when a connection opens.
pub const CONNECTED: &str = "connected";
/// Local event emitted when an open connection goes away.
pub const DISCONNECTED: &str = "disconnected";
/// Periodic server metrics push.
pub const SYSTEM_STATS: &str = "system_stats";
/// Outbound channel subscription command.
pub const SUBSCRIBE: &str = "subscribe";
/// Outbound channel unsubscription command.
pub const UNSUBSCRIBE: &str = "unsubscribe";

/// The unit exchanged over the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Discriminator naming the event or command category.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Payload; its shape is a convention between client and server.
    #[serde(default)]
    pub data: Value,
    /// Milliseconds since the epoch. Advisory only.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<i64>,
}

/// Accept integer or fractional timestamps; anything else is treated as absent.
#[allow(clippy::cast_possible_truncation)]
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    })
}

/// Live server metrics carried by `system_stats`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemStats {
    /// CPU utilisation, percent.
    pub cpu: f64,
    /// Memory utilisation, percent.
    pub memory: f64,
    /// Receive throughput.
    pub network_rx: f64,
    /// Transmit throughput.
    pub network_tx: f64,
    /// Diskless clients currently booted.
    pub active_clients: u64,
}

/// A decoded, typed event ready for dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// A connection was opened (local).
    Connected,
    /// An open connection was lost or closed (local).
    Disconnected,
    /// Server metrics update.
    SystemStats(SystemStats),
    /// Any other server-pushed type, payload kept as raw JSON.
    Other {
        /// The envelope's `type`.
        event_type: String,
        /// The envelope's `data`.
        data: Value,
    },
}

impl ServerEvent {
    /// Lift a structurally valid envelope into its typed variant.
    ///
    /// Known types validate their payload; a mismatch is a decode error.
    /// Server frames never produce the local lifecycle variants: a server
    /// sending `"connected"` is delivered as [`ServerEvent::Other`].
    pub fn from_envelope(envelope: Envelope) -> Result<Self, DecodeError> {
        match envelope.event_type.as_str() {
            SYSTEM_STATS => serde_json::from_value(envelope.data)
                .map(ServerEvent::SystemStats)
                .map_err(|source| DecodeError::InvalidPayload {
                    event_type: envelope.event_type,
                    source,
                }),
            _ => Ok(ServerEvent::Other {
                event_type: envelope.event_type,
                data: envelope.data,
            }),
        }
    }

    /// The dispatch key for this event.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Connected => CONNECTED,
            Self::Disconnected => DISCONNECTED,
            Self::SystemStats(_) => SYSTEM_STATS,
            Self::Other { event_type, .. } => event_type,
        }
    }

    /// The payload as JSON. Lifecycle events carry an empty object.
    pub fn data(&self) -> Value {
        match self {
            Self::Connected | Self::Disconnected => Value::Object(Map::new()),
            Self::SystemStats(stats) => {
                serde_json::to_value(stats).unwrap_or_else(|_| Value::Object(Map::new()))
            }
            Self::Other { data, .. } => data.clone(),
        }
    }
}

/// Built-in outbound channel commands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ChannelCommand {
    /// Ask the server to start pushing a channel.
    Subscribe {
        /// Channel name.
        channel: String,
    },
    /// Ask the server to stop pushing a channel.
    Unsubscribe {
        /// Channel name.
        channel: String,
    },
}

impl ChannelCommand {
    /// Wire `type` of this command.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => SUBSCRIBE,
            Self::Unsubscribe { .. } => UNSUBSCRIBE,
        }
    }

    /// Target channel.
    pub fn channel(&self) -> &str {
        match self {
            Self::Subscribe { channel } | Self::Unsubscribe { channel } => channel,
        }
    }
}
