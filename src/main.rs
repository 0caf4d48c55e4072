//! # courier
//!
//! Relay server binary: loads settings, opens the message store and serves
//! the WebSocket endpoint until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use courier_server::{CourierServer, ServerConfig};
use courier_settings::CourierSettings;
use courier_store::{ConnectionConfig, SqliteMessageStore, StoreConfig};

/// How long sessions get to send their close frames on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Courier message relay.
#[derive(Parser, Debug)]
#[command(name = "courier", about = "Real-time message relay with offline queueing")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default: `~/.courier/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the `SQLite` message database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log level filter, e.g. `debug` or `courier_server=trace`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Fold command-line flags over loaded settings.
    fn apply(&self, settings: &mut CourierSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref path) = self.db_path {
            settings.store.db_path = path.to_string_lossy().into_owned();
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn load(cli: &Cli) -> Result<CourierSettings> {
    let mut settings = match cli.config {
        Some(ref path) => courier_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => courier_settings::load_settings().with_context(|| {
            format!(
                "Failed to load settings from {}",
                courier_settings::settings_path().display()
            )
        })?,
    };
    cli.apply(&mut settings);
    courier_settings::validate(&settings).context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    courier_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let db_path = PathBuf::from(&settings.store.db_path);
    ensure_parent_dir(&db_path)?;
    let store_config = StoreConfig {
        connection: ConnectionConfig {
            pool_size: settings.store.pool_size,
            busy_timeout_ms: settings.store.busy_timeout_ms,
        },
        operation_timeout: Duration::from_millis(settings.store.append_timeout_ms),
    };
    let store = SqliteMessageStore::open(&settings.store.db_path, &store_config)
        .context("Failed to open message store")?;
    tracing::info!(path = %db_path.display(), "message store ready");

    let metrics =
        courier_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let server = CourierServer::new(ServerConfig::from(&settings), Arc::new(store), metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("courier listening on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down...");

    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(SHUTDOWN_GRACE))
        .await;
    tracing::info!(
        pending = server.engine().queue().total_pending(),
        "Shutdown complete"
    );
    Ok(())
}
