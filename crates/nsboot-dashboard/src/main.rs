//! # nsboot-dashboard
//!
//! Terminal monitor for an NSBoot server. Loads settings, opens the realtime
//! connection, subscribes to channels and prints live metrics until Ctrl-C.

#![deny(unsafe_code)]

mod monitor;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use nsboot_realtime::{RealtimeClient, RealtimeConfig, Transport, WebSocketTransport};
use nsboot_settings::DashboardSettings;

use crate::monitor::{Monitor, Sink};

/// NSBoot realtime monitor.
#[derive(Parser, Debug)]
#[command(name = "nsboot-dashboard", about = "Watch an NSBoot server's realtime feed")]
struct Cli {
    /// Server origin, e.g. `https://boot.lan` (overrides settings).
    #[arg(long)]
    origin: Option<String>,

    /// Settings file (default `~/.nsboot/dashboard.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Channel to subscribe to; repeatable. Added to the configured ones.
    #[arg(long = "channel")]
    channels: Vec<String>,

    /// Log as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Log filter used when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Print every event, not just metrics and connection changes.
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    /// Fold CLI flags over loaded settings.
    fn apply(&self, settings: &mut DashboardSettings) {
        if let Some(origin) = &self.origin {
            settings.realtime.origin.clone_from(origin);
        }
        for channel in &self.channels {
            if !settings.realtime.channels.contains(channel) {
                settings.realtime.channels.push(channel.clone());
            }
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn realtime_config(settings: &DashboardSettings) -> RealtimeConfig {
    let rt = &settings.realtime;
    RealtimeConfig {
        origin: rt.origin.clone(),
        path: rt.path.clone(),
        policy: rt.policy(),
        connect_timeout: Duration::from_millis(rt.connect_timeout_ms),
        resubscribe_on_reconnect: rt.resubscribe_on_reconnect,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(nsboot_settings::settings_path);
    let mut settings = nsboot_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    nsboot_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let transport: Arc<dyn Transport> = Arc::new(WebSocketTransport::new());
    let client = RealtimeClient::new(realtime_config(&settings), transport)
        .context("Invalid realtime origin")?;
    tracing::info!(url = %client.url(), "starting realtime monitor");

    let sink: Sink = Arc::new(|line: String| println!("{line}"));
    let monitor = Monitor::new(sink, args.verbose);
    let _handlers = monitor.attach(&client.dispatcher());

    for channel in &settings.realtime.channels {
        let _ = client.subscribe_channel(channel);
    }
    client.connect();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    client.shutdown().await;
    tracing::info!(stats = ?client.stats(), "Shutdown complete");
    Ok(())
}
