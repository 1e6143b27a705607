//! Catalogue service entry point: HTTP API plus the embedded relay

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use catalog_service::{routes, AppState, CatalogStore};
use relay_config::ForensicConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Relay port for rendering clients (overrides configuration)
    #[arg(long)]
    relay_port: Option<u16>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        ForensicConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.catalog.port = port;
    }
    if let Some(port) = args.relay_port {
        config.relay.port = port;
    }
    if args.no_cors {
        config.catalog.enable_cors = false;
    }

    let level = &config.logging.level;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "catalog_service={0},catalog={0},relays={0},relay_core={0},warn",
                level
            ))
        })
        .with_context(|| format!("Invalid log level: {}", level))?;
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting ForensicVR catalogue service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let (relay, bridge) = relays::start(&config.relay)
        .await
        .context("Failed to start relay")?;

    bridge.on_inbound_message(|message| {
        info!("Rendering client {} says: {}", message.connection_id, message.body);
    });

    let state = AppState::new(Arc::new(CatalogStore::new()), Arc::new(bridge));
    let addr = config.catalog.listen_addr()?;

    let (bound, server) = warp::serve(routes(state, &config.catalog))
        .try_bind_with_graceful_shutdown(addr, shutdown_signal())
        .with_context(|| format!("Failed to bind catalogue API on {}", addr))?;

    info!("Catalogue API listening on http://{}", bound);
    server.await;

    relay.shutdown().await;
    info!("Catalogue service stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await
        }
    }
}
