//! Duplex transport seam.
//!
//! The connection manager never touches sockets directly. It asks a
//! [`Transport`] to open a [`TransportLink`]: an outbound queue of frames and
//! an inbound stream of [`TransportEvent`]s. The link ends when the inbound
//! stream yields [`TransportEvent::Closed`] or is dropped by the transport.

pub mod websocket;

use async_trait::async_trait;
use nsboot_core::TransportError;
use tokio::sync::mpsc;
use url::Url;

pub use websocket::WebSocketTransport;

/// Frame written by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A JSON text frame.
    Text(String),
    /// Close the link politely.
    Close,
}

/// Something that happened on an open link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Frame(String),
    /// A binary frame arrived.
    Binary(Vec<u8>),
    /// A non-terminal error. The link may still be usable.
    Error(String),
    /// The link is gone. No further events follow.
    Closed {
        /// Close reason sent by the peer, if any.
        reason: Option<String>,
    },
}

/// Both halves of an established link.
#[derive(Debug)]
pub struct TransportLink {
    /// Frames queued here are written in order.
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    /// Events observed on the link, in delivery order.
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens duplex links to an endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish a link to `url`.
    async fn open(&self, url: &Url) -> Result<TransportLink, TransportError>;
}
