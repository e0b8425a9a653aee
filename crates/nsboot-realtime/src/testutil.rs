//! Scripted in-memory transport for manager tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use nsboot_core::TransportError;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use crate::transport::{OutboundFrame, Transport, TransportEvent, TransportLink};

/// How one open attempt should end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Accept,
    Refuse,
    Hang,
}

/// Server side of an accepted mock link.
pub(crate) struct MockPeer {
    pub inbound: mpsc::UnboundedSender<TransportEvent>,
    pub outbound: mpsc::UnboundedReceiver<OutboundFrame>,
}

impl MockPeer {
    pub fn push(&self, frame: &str) {
        let _ = self.inbound.send(TransportEvent::Frame(frame.to_owned()));
    }

    pub fn close(&self) {
        let _ = self.inbound.send(TransportEvent::Closed { reason: None });
    }

    /// Every frame the client has queued so far.
    pub fn drain(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

struct Plan {
    queued: VecDeque<Outcome>,
    fallback: Outcome,
}

pub(crate) struct MockTransport {
    attempts: Mutex<Vec<Instant>>,
    plan: Mutex<Plan>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            attempts: Mutex::new(Vec::new()),
            plan: Mutex::new(Plan {
                queued: VecDeque::new(),
                fallback: Outcome::Accept,
            }),
            peers,
        });
        (transport, peer_rx)
    }

    /// Queue `outcome` for the next unscripted attempts, `count` times.
    pub fn script(&self, outcome: Outcome, count: usize) {
        let mut plan = self.plan.lock();
        for _ in 0..count {
            plan.queued.push_back(outcome);
        }
    }

    /// Outcome used once the script runs out.
    pub fn set_fallback(&self, outcome: Outcome) {
        self.plan.lock().fallback = outcome;
    }

    /// Start time of every open attempt, in order.
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Millisecond gaps between consecutive attempts.
    pub fn gaps_ms(&self) -> Vec<u128> {
        self.attempts()
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &Url) -> Result<TransportLink, TransportError> {
        self.attempts.lock().push(Instant::now());
        let outcome = {
            let mut plan = self.plan.lock();
            let fallback = plan.fallback;
            plan.queued.pop_front().unwrap_or(fallback)
        };
        match outcome {
            Outcome::Accept => {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                let _ = self.peers.send(MockPeer {
                    inbound: inbound_tx,
                    outbound: outbound_rx,
                });
                Ok(TransportLink {
                    outbound: outbound_tx,
                    inbound: inbound_rx,
                })
            }
            Outcome::Refuse => Err(TransportError::Open {
                url: url.to_string(),
                reason: "connection refused".into(),
            }),
            Outcome::Hang => std::future::pending().await,
        }
    }
}
