//! Connection manager task.
//!
//! One task owns the connection state machine: it runs open attempts, reads
//! the inbound side of the link, fires retry timers and performs every
//! dispatch. The facade talks to it through [`Command`]s and reads what it
//! publishes through [`Shared`].
//!
//! The retry timer and the in-flight open attempt live inside [`Phase`], so
//! replacing the phase cancels them. A retry can never outlive the
//! `disconnect()` that dropped it.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use nsboot_core::codec;
use nsboot_core::envelope::{ChannelCommand, ServerEvent};
use nsboot_core::errors::{DecodeError, RealtimeError, TransportError};
use nsboot_core::Backoff;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::RealtimeConfig;
use crate::registry::Dispatcher;
use crate::state::ConnectionState;
use crate::stats::ConnectionStats;
use crate::transport::{OutboundFrame, Transport, TransportEvent, TransportLink};

/// Requests from the facade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Connect,
    Disconnect,
}

/// State visible to every client handle.
pub(crate) struct Shared {
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
    channels: Mutex<Vec<String>>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) stats: ConnectionStats,
}

impl Shared {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            state,
            outbound: Mutex::new(None),
            channels: Mutex::new(Vec::new()),
            dispatcher,
            stats: ConnectionStats::default(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "connection state changed");
        }
    }

    /// Queue an encoded frame on the current link.
    pub(crate) fn transmit(&self, frame: String) -> Result<(), RealtimeError> {
        let guard = self.outbound.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(RealtimeError::NotConnected);
        };
        tx.send(OutboundFrame::Text(frame))
            .map_err(|_| TransportError::Closed)?;
        self.stats.record_frame_sent();
        Ok(())
    }

    /// Remember `channel`. Returns `false` if it was already tracked.
    pub(crate) fn track_channel(&self, channel: &str) -> bool {
        let mut channels = self.channels.lock();
        if channels.iter().any(|c| c == channel) {
            return false;
        }
        channels.push(channel.to_owned());
        true
    }

    /// Forget `channel`. Returns `false` if it was not tracked.
    pub(crate) fn untrack_channel(&self, channel: &str) -> bool {
        let mut channels = self.channels.lock();
        let before = channels.len();
        channels.retain(|c| c != channel);
        channels.len() != before
    }

    pub(crate) fn channels(&self) -> Vec<String> {
        self.channels.lock().clone()
    }

    fn install_link(&self, tx: mpsc::UnboundedSender<OutboundFrame>) {
        *self.outbound.lock() = Some(tx);
    }

    fn take_link(&self) -> Option<mpsc::UnboundedSender<OutboundFrame>> {
        self.outbound.lock().take()
    }
}

type OpenFuture = BoxFuture<'static, Result<TransportLink, TransportError>>;

/// What the manager is currently waiting on.
enum Phase {
    Idle,
    Connecting(OpenFuture),
    Open(mpsc::UnboundedReceiver<TransportEvent>),
    Waiting(Pin<Box<Sleep>>),
    Closed,
    Exhausted,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting(_) => "connecting",
            Self::Open(_) => "open",
            Self::Waiting(_) => "waiting",
            Self::Closed => "closed",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Progress reported by the current phase.
enum Step {
    Opened(Result<TransportLink, TransportError>),
    Link(Option<TransportEvent>),
    RetryDue,
}

/// Resolve when the current phase has something to report. Phases with
/// nothing in flight never resolve.
async fn next_step(phase: &mut Phase) -> Step {
    match phase {
        Phase::Connecting(attempt) => Step::Opened(attempt.await),
        Phase::Open(inbound) => Step::Link(inbound.recv().await),
        Phase::Waiting(sleep) => {
            sleep.as_mut().await;
            Step::RetryDue
        }
        Phase::Idle | Phase::Closed | Phase::Exhausted => std::future::pending().await,
    }
}

pub(crate) struct ConnectionManager {
    url: Url,
    transport: Arc<dyn Transport>,
    connect_timeout: Duration,
    resubscribe: bool,
    shared: Arc<Shared>,
    backoff: Backoff,
    phase: Phase,
}

impl ConnectionManager {
    pub(crate) fn new(
        url: Url,
        config: &RealtimeConfig,
        transport: Arc<dyn Transport>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            url,
            transport,
            connect_timeout: config.connect_timeout,
            resubscribe: config.resubscribe_on_reconnect,
            shared,
            backoff: Backoff::new(config.policy),
            phase: Phase::Idle,
        }
    }

    /// Drive the state machine until cancelled or every handle is gone.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) {
        info!(url = %self.url, "realtime manager started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                step = next_step(&mut self.phase) => self.handle_step(step),
            }
        }
        self.teardown();
        info!(url = %self.url, "realtime manager stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
        }
    }

    fn handle_step(&mut self, step: Step) {
        match step {
            Step::Opened(Ok(link)) => self.on_open(link),
            Step::Opened(Err(e)) => {
                warn!(url = %self.url, error = %e, "connection attempt failed");
                self.schedule_retry();
            }
            Step::Link(Some(TransportEvent::Frame(text))) => {
                self.shared.stats.record_frame_received();
                self.on_decoded(codec::decode(&text));
            }
            Step::Link(Some(TransportEvent::Binary(bytes))) => {
                self.shared.stats.record_frame_received();
                self.on_decoded(codec::decode_bytes(&bytes));
            }
            // Only closure moves the state machine.
            Step::Link(Some(TransportEvent::Error(e))) => {
                warn!(url = %self.url, error = %e, "transport error");
            }
            Step::Link(Some(TransportEvent::Closed { reason })) => self.on_lost(reason),
            Step::Link(None) => self.on_lost(None),
            Step::RetryDue => self.start_attempt(),
        }
    }

    fn connect(&mut self) {
        match self.phase {
            Phase::Connecting(_) | Phase::Open(_) => {
                debug!(phase = self.phase.name(), "connect ignored");
            }
            Phase::Waiting(_) => {
                debug!(attempt = self.backoff.attempts(), "retrying now");
                self.start_attempt();
            }
            Phase::Exhausted => {
                self.reset_attempts();
                self.start_attempt();
            }
            Phase::Idle | Phase::Closed => self.start_attempt(),
        }
    }

    fn start_attempt(&mut self) {
        self.shared.stats.record_connect_attempt();
        self.shared.set_state(ConnectionState::Connecting);
        info!(url = %self.url, attempt = self.backoff.attempts(), "connecting");

        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        let timeout = self.connect_timeout;
        self.phase = Phase::Connecting(Box::pin(async move {
            match tokio::time::timeout(timeout, transport.open(&url)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout {
                    url: url.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            }
        }));
    }

    fn on_open(&mut self, link: TransportLink) {
        let TransportLink { outbound, inbound } = link;
        self.reset_attempts();
        self.shared.stats.record_open();
        self.shared.install_link(outbound);
        self.phase = Phase::Open(inbound);
        self.shared.set_state(ConnectionState::Open);
        info!(url = %self.url, "realtime connection open");

        if self.resubscribe {
            self.resubscribe_channels();
        }
        self.dispatch(&ServerEvent::Connected);
    }

    fn resubscribe_channels(&self) {
        for channel in self.shared.channels() {
            let command = ChannelCommand::Subscribe { channel };
            let sent = codec::encode_command(&command)
                .map_err(RealtimeError::from)
                .and_then(|frame| self.shared.transmit(frame));
            match sent {
                Ok(()) => debug!(channel = command.channel(), "resubscribed"),
                Err(e) => warn!(channel = command.channel(), error = %e, "resubscribe failed"),
            }
        }
    }

    fn on_decoded(&self, decoded: Result<ServerEvent, DecodeError>) {
        match decoded {
            Ok(event) => self.dispatch(&event),
            Err(e) => {
                self.shared.stats.record_frame_dropped();
                warn!(error = %e, "dropping undecodable frame");
            }
        }
    }

    fn dispatch(&self, event: &ServerEvent) {
        let report = self.shared.dispatcher.dispatch(event);
        self.shared.stats.record_handler_failures(report.failed);
    }

    /// The open link went away without being asked to.
    fn on_lost(&mut self, reason: Option<String>) {
        let _ = self.shared.take_link();
        self.phase = Phase::Closed;
        self.shared.set_state(ConnectionState::Closed);
        warn!(url = %self.url, reason = reason.as_deref().unwrap_or(""), "connection lost");
        self.dispatch(&ServerEvent::Disconnected);
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        if let Some((attempt, delay)) = self.backoff.next_delay() {
            self.shared.stats.record_reconnect_scheduled();
            self.shared.stats.set_current_attempt(attempt);
            self.shared.set_state(ConnectionState::Closed);
            info!(
                attempt,
                max_attempts = self.backoff.policy().max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "scheduling reconnect"
            );
            self.phase = Phase::Waiting(Box::pin(tokio::time::sleep(delay)));
        } else {
            let err = RealtimeError::ReconnectExhausted {
                attempts: self.backoff.attempts(),
            };
            error!(url = %self.url, "{err}");
            self.shared.stats.record_exhausted();
            self.phase = Phase::Exhausted;
            self.shared.set_state(ConnectionState::Exhausted);
        }
    }

    fn disconnect(&mut self) {
        let was_open = matches!(self.phase, Phase::Open(_));
        match std::mem::replace(&mut self.phase, Phase::Closed) {
            Phase::Idle => {
                self.phase = Phase::Idle;
                return;
            }
            Phase::Closed => return,
            Phase::Open(_inbound) => {
                self.shared.set_state(ConnectionState::Closing);
                if let Some(tx) = self.shared.take_link() {
                    let _ = tx.send(OutboundFrame::Close);
                }
            }
            Phase::Connecting(_) => debug!("open attempt abandoned"),
            Phase::Waiting(_) => debug!("pending reconnect cancelled"),
            Phase::Exhausted => {}
        }
        self.reset_attempts();
        self.shared.set_state(ConnectionState::Closed);
        info!(url = %self.url, "disconnected");
        if was_open {
            self.dispatch(&ServerEvent::Disconnected);
        }
    }

    fn reset_attempts(&mut self) {
        self.backoff.reset();
        self.shared.stats.set_current_attempt(0);
    }

    fn teardown(&mut self) {
        self.disconnect();
    }
}
