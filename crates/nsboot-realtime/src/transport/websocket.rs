//! `tokio-tungstenite` implementation of [`Transport`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use nsboot_core::TransportError;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

use super::{OutboundFrame, Transport, TransportEvent, TransportLink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport. Each open spawns one pump task per link.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create the transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<TransportLink, TransportError> {
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Open {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        debug!(url = %url, "websocket handshake complete");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        drop(tokio::spawn(pump(ws, outbound_rx, inbound_tx)));

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Shuttle frames between the socket and the link channels until either
/// side goes away.
async fn pump(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut close_reason: Option<String> = None;

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(OutboundFrame::Text(text)) => {
                        if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                            let _ = inbound.send(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    // Local close: the manager has already let go of the link.
                    Some(OutboundFrame::Close) | None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        let _ = ws_tx.close().await;
                        return;
                    }
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = inbound.send(TransportEvent::Frame(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let _ = inbound.send(TransportEvent::Binary(bytes.to_vec()));
                    }
                    // Keep reading so the close handshake completes.
                    Some(Ok(Message::Close(frame))) => {
                        close_reason = frame
                            .map(|f| f.reason.as_str().to_owned())
                            .filter(|r| !r.is_empty());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read failed");
                        let _ = inbound.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let _ = inbound.send(TransportEvent::Closed {
        reason: close_reason,
    });
}
