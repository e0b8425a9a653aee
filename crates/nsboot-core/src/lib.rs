//! # nsboot-core
//!
//! Shared vocabulary for the NSBoot dashboard realtime client.
//!
//! - **Envelopes**: the `{type, data, timestamp}` wire unit and the typed
//!   [`ServerEvent`](envelope::ServerEvent) it decodes into
//! - **Codec**: JSON encode/decode with structural validation
//! - **Backoff**: the exponential, ceiling-bounded reconnection policy
//! - **Endpoint**: page origin to `ws://`/`wss://` URL resolution
//! - **Errors**: `thiserror` hierarchy covering every failure kind the client
//!   recovers from locally
//! - **Logging**: `tracing` subscriber setup and an in-memory capture layer for tests

#![deny(unsafe_code)]

pub mod backoff;
pub mod codec;
pub mod endpoint;
pub mod envelope;
pub mod errors;
pub mod logging;

pub use backoff::{Backoff, ReconnectPolicy};
pub use endpoint::resolve_endpoint;
pub use envelope::{ChannelCommand, Envelope, ServerEvent, SystemStats};
pub use errors::{DecodeError, EncodeError, EndpointError, RealtimeError, TransportError};
