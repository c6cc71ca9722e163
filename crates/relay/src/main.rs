//! # relay
//!
//! WebSocket relay server binary: loads settings, starts the HTTP/WebSocket
//! server and shuts it down cleanly on Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;
use relay_settings::{LoadedSettings, LogFormat, RejectedOverride, RelaySettings};

/// Upper bound for each shutdown phase: listener drain, then session drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// WebSocket relay server.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Relays every WebSocket frame to all other connected clients")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Maximum concurrent connections (0 = unlimited).
    #[arg(long)]
    max_connections: Option<usize>,

    /// Heartbeat interval in seconds (0 disables idle detection).
    #[arg(long)]
    heartbeat_interval: Option<u64>,

    /// Log level or `EnvFilter` directive.
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: `compact` or `json`.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Apply command-line flags on top of loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        let server = &mut settings.server;
        if let Some(host) = &self.host {
            server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            server.port = port;
        }
        if let Some(max) = self.max_connections {
            server.max_connections = max;
        }
        if let Some(interval) = self.heartbeat_interval {
            server.heartbeat_interval_secs = interval;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

/// Layer file, environment and flags, then validate the result once.
fn load(cli: &Cli, lookup: impl Fn(&str) -> Option<String>) -> Result<LoadedSettings> {
    let path = cli.config.clone().unwrap_or_else(relay_settings::settings_path);
    let mut loaded = relay_settings::load_settings(&path, lookup)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut loaded.settings);
    loaded.settings.validate().context("Invalid settings")?;
    Ok(loaded)
}

fn report_rejected(rejected: &[RejectedOverride]) {
    for r in rejected {
        tracing::warn!(key = r.key, value = %r.value, "ignoring invalid environment override");
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let LoadedSettings { settings, rejected } = load(&cli, |name| std::env::var(name).ok())?;
    logging::init_subscriber(&settings.logging);
    report_rejected(&rejected);

    let metrics = relay_server::metrics::install_recorder().context("Failed to install metrics")?;
    let config = ServerConfig::from(&settings.server);
    let server = RelayServer::new(config).with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        %addr,
        max_connections = settings.server.max_connections,
        heartbeat_secs = settings.server.heartbeat_interval_secs,
        "relay listening on ws://{addr}/ws"
    );

    shutdown_signal().await?;

    tracing::info!(connections = server.registry().len(), "shutting down");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(SHUTDOWN_GRACE))
        .await;

    // Sessions observe the same token and close themselves.
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while !server.registry().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            remaining = server.registry().len(),
            "sessions still open after shutdown grace period"
        );
    }

    tracing::info!("shutdown complete");
    Ok(())
}
