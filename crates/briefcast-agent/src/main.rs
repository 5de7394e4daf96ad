//! # briefcast-agent
//!
//! briefcast server binary: loads settings, builds the broadcast bus, and
//! serves the WebSocket and HTTP endpoints until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use briefcast_bus::{BroadcastBus, InMemoryBus};
use briefcast_core::constants::VERSION;
use briefcast_core::logging::{self, LogFormat};
use briefcast_server::{BriefcastServer, ServerConfig};
use briefcast_settings::{BriefcastSettings, BusBackend, BusSettings};
use clap::Parser;
use tracing::{info, warn};

/// briefcast session event distribution server.
#[derive(Parser, Debug)]
#[command(name = "briefcast-agent", version, about = "Session event distribution server")]
struct Cli {
    /// Settings file (defaults to `$BRIEFCAST_SETTINGS` or `~/.briefcast/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directive, e.g. `debug` or `briefcast_server=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(briefcast_settings::settings_path)
    }

    /// Command-line flags win over every settings layer.
    fn apply(&self, settings: &mut BriefcastSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

#[cfg_attr(not(feature = "redis"), allow(clippy::unused_async))]
async fn build_bus(settings: &BusSettings) -> Result<Arc<dyn BroadcastBus>> {
    match settings.backend {
        BusBackend::Memory => Ok(Arc::new(InMemoryBus::with_capacity(settings.memory_capacity))),
        BusBackend::Redis => {
            #[cfg(feature = "redis")]
            {
                let url = settings
                    .url
                    .as_deref()
                    .context("bus.url is required for the redis backend")?;
                let bus = briefcast_bus::RedisBus::connect(url)
                    .await
                    .with_context(|| format!("failed to connect to redis at {url}"))?;
                Ok(Arc::new(bus))
            }
            #[cfg(not(feature = "redis"))]
            {
                anyhow::bail!("bus backend `redis` needs a build with `--features redis`")
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args.settings_path();
    let mut settings = briefcast_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logging::init(&settings.logging.level, format);

    let bus = build_bus(&settings.bus).await?;
    let metrics = match briefcast_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(error) => {
            warn!(%error, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let server = BriefcastServer::new(ServerConfig::from_settings(&settings), bus, metrics);
    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    info!(%addr, version = VERSION, bus = server.bus().backend_name(), "briefcast ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    if !server.shutdown_gracefully(vec![handle]).await {
        warn!("shutdown timed out");
    }
    info!("shutdown complete");
    Ok(())
}
