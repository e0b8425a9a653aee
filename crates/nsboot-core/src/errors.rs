//! Error hierarchy for the realtime client.
//!
//! Every kind here is recovered locally: none is fatal to the host process.
//!
//! - [`DecodeError`]: an inbound frame was malformed; the frame is dropped
//! - [`EncodeError`]: an outbound payload could not be serialized; `send` fails
//! - [`EndpointError`]: the configured origin cannot be turned into a duplex URL
//! - [`TransportError`]: the duplex connection could not be opened or broke
//! - [`RealtimeError`]: top-level enum used for logging and `try_send` results

use thiserror::Error;

/// Failure to turn an inbound frame into a typed event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// A binary frame did not contain UTF-8 text.
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,

    /// The frame parsed, but is not a JSON object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The frame has no string `type` discriminator.
    #[error("frame is missing a string `type` field")]
    MissingType,

    /// The payload does not match the shape registered for its type.
    #[error("invalid `{event_type}` payload: {source}")]
    InvalidPayload {
        /// The event type whose payload was rejected.
        event_type: String,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to serialize an outbound envelope.
#[derive(Debug, Error)]
#[error("failed to encode `{event_type}` envelope: {source}")]
pub struct EncodeError {
    /// The envelope type being encoded.
    pub event_type: String,
    /// Underlying serialization error.
    #[source]
    pub source: serde_json::Error,
}

/// The configured origin cannot be mapped onto a duplex endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The origin is not a parseable URL.
    #[error("invalid origin `{origin}`: {source}")]
    InvalidOrigin {
        /// The rejected origin string.
        origin: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The origin uses a scheme with no duplex equivalent.
    #[error("unsupported origin scheme `{0}` (expected http, https, ws or wss)")]
    UnsupportedScheme(String),

    /// The origin has no host component.
    #[error("origin `{0}` has no host")]
    MissingHost(String),
}

/// Failures of the duplex transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("failed to open {url}: {reason}")]
    Open {
        /// Target URL.
        url: String,
        /// Why the attempt failed.
        reason: String,
    },

    /// The open attempt did not complete in time.
    #[error("connecting to {url} timed out after {timeout_ms}ms")]
    Timeout {
        /// Target URL.
        url: String,
        /// How long we waited.
        timeout_ms: u64,
    },

    /// The link's outbound queue is gone.
    #[error("transport link is closed")]
    Closed,
}

/// Top-level error for the realtime client.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The connection could not be established.
    #[error(transparent)]
    TransportOpen(#[from] TransportError),

    /// An inbound frame was malformed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// An outbound payload could not be serialized.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The origin could not be resolved to an endpoint.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// `send` was called while no connection is open.
    #[error("not connected")]
    NotConnected,

    /// A subscriber callback failed during dispatch.
    #[error("subscriber for `{event_type}` failed: {message}")]
    Subscriber {
        /// Event type being dispatched.
        event_type: String,
        /// Error or panic message.
        message: String,
    },

    /// The retry ceiling was reached.
    #[error("reconnection abandoned after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

/// Result type for realtime client operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        assert_eq!(
            DecodeError::MissingType.to_string(),
            "frame is missing a string `type` field"
        );
        assert_eq!(DecodeError::NotAnObject.to_string(), "frame is not a JSON object");
    }

    #[test]
    fn invalid_payload_names_event_type() {
        let source = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = DecodeError::InvalidPayload {
            event_type: "system_stats".into(),
            source,
        };
        assert!(err.to_string().starts_with("invalid `system_stats` payload"));
    }

    #[test]
    fn transport_error_display() {
        let err = TransportError::Timeout {
            url: "ws://localhost/ws".into(),
            timeout_ms: 250,
        };
        assert_eq!(
            err.to_string(),
            "connecting to ws://localhost/ws timed out after 250ms"
        );
    }

    #[test]
    fn realtime_error_is_transparent_over_sources() {
        let err: RealtimeError = DecodeError::NotUtf8.into();
        assert_eq!(err.to_string(), "binary frame is not valid UTF-8");
        assert!(matches!(err, RealtimeError::Decode(_)));
    }

    #[test]
    fn exhausted_display() {
        let err = RealtimeError::ReconnectExhausted { attempts: 5 };
        assert_eq!(err.to_string(), "reconnection abandoned after 5 attempts");
    }

    #[test]
    fn unsupported_scheme_display() {
        let err = EndpointError::UnsupportedScheme("ftp".into());
        assert!(err.to_string().contains("`ftp`"));
    }
}
