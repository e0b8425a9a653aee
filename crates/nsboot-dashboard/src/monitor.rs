//! Live view of the server: connection flag, latest metrics, event lines.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Local};
use nsboot_core::envelope::{CONNECTED, DISCONNECTED, SYSTEM_STATS, WILDCARD};
use nsboot_core::{ServerEvent, SystemStats};
use nsboot_realtime::{Dispatcher, Handler, handler};
use parking_lot::Mutex;

/// Where rendered lines go.
pub type Sink = Arc<dyn Fn(String) + Send + Sync>;

/// Tracks what the dashboard's system panel would show.
pub struct Monitor {
    connected: AtomicBool,
    stats: Mutex<SystemStats>,
    sink: Sink,
    verbose: bool,
}

impl Monitor {
    /// `verbose` also prints every non-metrics event.
    pub fn new(sink: Sink, verbose: bool) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(false),
            stats: Mutex::new(SystemStats::default()),
            sink,
            verbose,
        })
    }

    /// Register the monitor's handlers. Returns them keyed by event type so
    /// they can be removed later.
    pub fn attach(self: &Arc<Self>, dispatcher: &Dispatcher) -> Vec<(&'static str, Handler)> {
        let on_connected = {
            let this = Arc::clone(self);
            handler(move |_| {
                this.connected.store(true, Ordering::Relaxed);
                (this.sink)(format!("{} connected", stamp(Local::now())));
                Ok(())
            })
        };
        let on_disconnected = {
            let this = Arc::clone(self);
            handler(move |_| {
                this.connected.store(false, Ordering::Relaxed);
                (this.sink)(format!("{} disconnected", stamp(Local::now())));
                Ok(())
            })
        };
        let on_stats = {
            let this = Arc::clone(self);
            handler(move |event| {
                if let ServerEvent::SystemStats(stats) = event {
                    *this.stats.lock() = stats.clone();
                    (this.sink)(render_stats(stats, Local::now()));
                }
                Ok(())
            })
        };
        let on_any = {
            let this = Arc::clone(self);
            handler(move |event| {
                if this.verbose && !is_lifecycle_or_stats(event) {
                    (this.sink)(render_event(event, Local::now())?);
                }
                Ok(())
            })
        };

        let handlers = vec![
            (CONNECTED, on_connected),
            (DISCONNECTED, on_disconnected),
            (SYSTEM_STATS, on_stats),
            (WILDCARD, on_any),
        ];
        for (event_type, h) in &handlers {
            dispatcher.subscribe(*event_type, Arc::clone(h));
        }
        handlers
    }

    /// Whether the last lifecycle event was `connected`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Most recent metrics.
    pub fn stats(&self) -> SystemStats {
        self.stats.lock().clone()
    }
}

fn is_lifecycle_or_stats(event: &ServerEvent) -> bool {
    matches!(
        event,
        ServerEvent::Connected | ServerEvent::Disconnected | ServerEvent::SystemStats(_)
    )
}

fn stamp(at: DateTime<Local>) -> String {
    format!("[{}]", at.format("%H:%M:%S"))
}

/// One metrics line.
pub fn render_stats(stats: &SystemStats, at: DateTime<Local>) -> String {
    format!(
        "{} cpu {:5.1}%  mem {:5.1}%  rx {:.1}  tx {:.1}  clients {}",
        stamp(at),
        stats.cpu,
        stats.memory,
        stats.network_rx,
        stats.network_tx,
        stats.active_clients
    )
}

/// One line for any other event.
pub fn render_event(
    event: &ServerEvent,
    at: DateTime<Local>,
) -> Result<String, serde_json::Error> {
    let data = serde_json::to_string(&event.data())?;
    Ok(format!("{} {} {data}", stamp(at), event.event_type()))
}
