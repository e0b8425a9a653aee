//! The `RealtimeClient` facade.

use std::fmt;
use std::sync::Arc;

use nsboot_core::codec;
use nsboot_core::envelope::{ChannelCommand, ServerEvent};
use nsboot_core::errors::{RealtimeError, Result};
use nsboot_core::resolve_endpoint;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::config::RealtimeConfig;
use crate::manager::{Command, ConnectionManager, Shared};
use crate::registry::{Dispatcher, Handler, HandlerResult, handler};
use crate::state::ConnectionState;
use crate::stats::StatsSnapshot;
use crate::transport::Transport;

/// Handle to one realtime connection.
///
/// Cheap to clone; every clone drives the same connection. The manager task
/// stops on [`shutdown`](Self::shutdown) or once every handle is dropped.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct Inner {
    url: Url,
    resubscribe: bool,
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// Resolve the endpoint and start the manager task. Nothing is opened
    /// until [`connect`](Self::connect).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: RealtimeConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        Self::with_dispatcher(config, transport, Dispatcher::new())
    }

    /// Like [`new`](Self::new), routing events through an existing
    /// dispatcher shared with other collaborators.
    pub fn with_dispatcher(
        config: RealtimeConfig,
        transport: Arc<dyn Transport>,
        dispatcher: Dispatcher,
    ) -> Result<Self> {
        let url = resolve_endpoint(&config.origin, &config.path)?;
        let shared = Arc::new(Shared::new(dispatcher));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let manager = ConnectionManager::new(url.clone(), &config, transport, Arc::clone(&shared));
        let task = tokio::spawn(manager.run(command_rx, cancel.clone()));

        Ok(Self {
            inner: Arc::new(Inner {
                url,
                resubscribe: config.resubscribe_on_reconnect,
                commands,
                shared,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        })
    }

    /// Open the connection. No-op while connecting or open; after
    /// exhaustion this starts a fresh retry cycle.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the connection without reconnecting. Cancels a pending retry.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    fn command(&self, command: Command) {
        if self.inner.commands.send(command).is_err() {
            debug!(?command, "realtime manager stopped; command ignored");
        }
    }

    /// Whether the connection is open.
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.watch_state()
    }

    /// The resolved duplex endpoint.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Counter snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.shared.stats.snapshot()
    }

    /// The dispatcher events are routed through.
    pub fn dispatcher(&self) -> Dispatcher {
        self.inner.shared.dispatcher.clone()
    }

    /// Send `{type, data}`. Returns `false` (and logs why) when not
    /// connected, when `data` cannot be encoded, or when the link is gone.
    /// A failed send never triggers reconnection.
    pub fn send<T: Serialize + ?Sized>(&self, event_type: &str, data: &T) -> bool {
        match self.try_send(event_type, data) {
            Ok(()) => true,
            Err(e) => {
                warn!(event_type, error = %e, "send failed");
                false
            }
        }
    }

    /// Like [`send`](Self::send), reporting the failure kind.
    pub fn try_send<T: Serialize + ?Sized>(&self, event_type: &str, data: &T) -> Result<()> {
        let result = if self.is_connected() {
            codec::encode(event_type, data)
                .map_err(RealtimeError::from)
                .and_then(|frame| self.inner.shared.transmit(frame))
        } else {
            Err(RealtimeError::NotConnected)
        };
        if result.is_err() {
            self.inner.shared.stats.record_send_failure();
        }
        result
    }

    fn send_command(&self, command: &ChannelCommand) -> bool {
        let result = if self.is_connected() {
            codec::encode_command(command)
                .map_err(RealtimeError::from)
                .and_then(|frame| self.inner.shared.transmit(frame))
        } else {
            Err(RealtimeError::NotConnected)
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                self.inner.shared.stats.record_send_failure();
                warn!(
                    command = command.event_type(),
                    channel = command.channel(),
                    error = %e,
                    "channel command failed"
                );
                false
            }
        }
    }

    /// Ask the server to push `channel`.
    ///
    /// With resubscription enabled the intent is remembered and re-sent after
    /// every open, so a call made while disconnected returns `false` and
    /// takes effect on open. Without it the command is sent once or not at
    /// all, and nothing is remembered.
    pub fn subscribe_channel(&self, channel: &str) -> bool {
        if self.inner.resubscribe {
            let _ = self.inner.shared.track_channel(channel);
            if !self.is_connected() {
                debug!(channel, "channel subscription deferred until open");
                return false;
            }
        }
        self.send_command(&ChannelCommand::Subscribe {
            channel: channel.to_owned(),
        })
    }

    /// Ask the server to stop pushing `channel` and forget the intent.
    pub fn unsubscribe_channel(&self, channel: &str) -> bool {
        if self.inner.resubscribe {
            let _ = self.inner.shared.untrack_channel(channel);
            if !self.is_connected() {
                return false;
            }
        }
        self.send_command(&ChannelCommand::Unsubscribe {
            channel: channel.to_owned(),
        })
    }

    /// Channels currently tracked for resubscription. Always empty when
    /// resubscription is disabled.
    pub fn channels(&self) -> Vec<String> {
        self.inner.shared.channels()
    }

    /// Register `handler` for `event_type` (or `"*"`).
    pub fn subscribe(&self, event_type: impl Into<String>, handler: Handler) {
        self.inner.shared.dispatcher.subscribe(event_type, handler);
    }

    /// Remove the first registration of `handler` for `event_type`.
    pub fn unsubscribe(&self, event_type: &str, handler: &Handler) -> bool {
        self.inner.shared.dispatcher.unsubscribe(event_type, handler)
    }

    /// Register a closure and return its handle for later removal.
    pub fn on<F>(&self, event_type: impl Into<String>, f: F) -> Handler
    where
        F: Fn(&ServerEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let h = handler(f);
        self.subscribe(event_type, Arc::clone(&h));
        h
    }

    /// Stop the manager task, closing any open link, and wait for it.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "realtime manager task failed");
            }
        }
    }
}
