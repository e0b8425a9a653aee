//! JSON codec for envelopes.
//!
//! Outbound frames are `{"type", "data"}` with no timestamp (the server
//! stamps them). Inbound frames are checked structurally before being
//! lifted into a [`ServerEvent`]: they must be JSON objects with a string
//! `type`, and known types must carry a payload of the right shape.

use serde::Serialize;
use serde_json::Value;

use crate::envelope::{ChannelCommand, Envelope, ServerEvent};
use crate::errors::{DecodeError, EncodeError};

#[derive(Serialize)]
struct Outbound<'a, T: Serialize + ?Sized> {
    #[serde(rename = "type")]
    event_type: &'a str,
    data: &'a T,
}

/// Serialize `{type, data}` into a text frame.
pub fn encode<T: Serialize + ?Sized>(event_type: &str, data: &T) -> Result<String, EncodeError> {
    serde_json::to_string(&Outbound { event_type, data }).map_err(|source| EncodeError {
        event_type: event_type.to_owned(),
        source,
    })
}

/// Serialize a built-in channel command.
pub fn encode_command(command: &ChannelCommand) -> Result<String, EncodeError> {
    serde_json::to_string(command).map_err(|source| EncodeError {
        event_type: command.event_type().to_owned(),
        source,
    })
}

/// Parse a text frame into a structurally valid [`Envelope`].
pub fn decode_envelope(frame: &str) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_str(frame).map_err(DecodeError::Malformed)?;
    let Value::Object(map) = &value else {
        return Err(DecodeError::NotAnObject);
    };
    if !map.get("type").is_some_and(Value::is_string) {
        return Err(DecodeError::MissingType);
    }
    serde_json::from_value(value).map_err(DecodeError::Malformed)
}

/// Parse a text frame into a typed event.
pub fn decode(frame: &str) -> Result<ServerEvent, DecodeError> {
    decode_envelope(frame).and_then(ServerEvent::from_envelope)
}

/// Parse a binary frame holding UTF-8 JSON into a typed event.
pub fn decode_bytes(frame: &[u8]) -> Result<ServerEvent, DecodeError> {
    let text = std::str::from_utf8(frame).map_err(|_| DecodeError::NotUtf8)?;
    decode(text)
}
