//! # nsboot-realtime
//!
//! Persistent realtime connection to the NSBoot server.
//!
//! - **Client**: [`RealtimeClient`], the cloneable facade collaborators hold
//! - **Manager**: one task owning the connection state machine, retry timer
//!   and every dispatch
//! - **Registry**: [`Dispatcher`], the event type to handler table with
//!   wildcard delivery and per-handler fault isolation
//! - **Transport**: the [`Transport`] seam and its `tokio-tungstenite`
//!   implementation
//!
//! ```text
//! socket ──► transport pump ──► manager task ──► codec::decode ──► Dispatcher
//!   ▲                                                                  │
//!   └──── outbound queue ◄── codec::encode ◄── RealtimeClient::send    ▼
//!                                                               handlers
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod config;
mod manager;
pub mod registry;
pub mod state;
pub mod stats;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use client::RealtimeClient;
pub use config::RealtimeConfig;
pub use registry::{DispatchRegistry, Dispatcher, Handler, HandlerResult, handler};
pub use state::ConnectionState;
pub use stats::StatsSnapshot;
pub use transport::{OutboundFrame, Transport, TransportEvent, TransportLink, WebSocketTransport};
