//! Relay binary driven by a control process over stdio
//!
//! Usage:
//!   relay
//!   relay --config config/relay.toml --port 9191
//!
//! Each stdin line is a command `{"type"?: string, "payload": any}` that is
//! broadcast to every connected client (type defaults to `SPAWN_OBJECT`).
//! Each message received from a client is written to stdout as one line
//! `{"connection": <uuid>, "body": <raw text>}`. Logs go to stderr.
//!
//! The relay stops on Ctrl+C or when stdin reaches end of file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use relay_config::{ForensicConfig, LoggingSettings};
use relays::core::InboundMessage;
use relays::ControlBridge;

#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(about = "ForensicVR relay between a control process and rendering clients")]
#[command(version)]
struct Args {
    /// Path to a TOML or JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides configuration)
    #[arg(long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn apply(&self, config: &mut ForensicConfig) {
        if let Some(port) = self.port {
            config.relay.port = port;
        }
        if let Some(bind) = &self.bind {
            config.relay.bind_address = bind.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}

/// One line of control input
#[derive(Debug, Deserialize, PartialEq)]
struct ControlCommand {
    #[serde(rename = "type", default)]
    message_type: Option<String>,
    #[serde(default)]
    payload: Value,
}

/// One line of output per inbound client message
#[derive(Serialize)]
struct ClientEvent<'a> {
    connection: Uuid,
    body: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        ForensicConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    init_logging(&config.logging)?;

    info!("Starting ForensicVR relay");
    let (server, bridge) = relays::start(&config.relay)
        .await
        .context("Failed to start relay")?;

    let output = tokio::spawn(write_client_events(bridge.subscribe()));

    tokio::select! {
        result = read_control_input(&bridge) => match result {
            Ok(()) => info!("Control input closed"),
            Err(e) => error!("Control input failed: {:#}", e),
        },
        _ = shutdown_signal() => info!("Received shutdown signal"),
    }

    server.shutdown().await;
    drop(bridge);

    // Event writer ends once the bridge's handlers are gone
    match tokio::time::timeout(Duration::from_secs(1), output).await {
        Ok(Ok(Err(e))) => warn!("Client event output failed: {:#}", e),
        Ok(Err(e)) => warn!("Client event writer ended abnormally: {}", e),
        _ => {}
    }

    Ok(())
}

fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .with_context(|| format!("Invalid log level: {}", settings.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if settings.json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

fn parse_command(line: &str) -> Option<Result<ControlCommand, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

async fn read_control_input(bridge: &ControlBridge) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read control input")?
    {
        match parse_command(&line) {
            Some(Ok(command)) => {
                bridge.send_to_clients(command.payload, command.message_type.as_deref())
            }
            Some(Err(e)) => warn!("Ignoring malformed control line: {}", e),
            None => {}
        }
    }

    Ok(())
}

async fn write_client_events(mut events: mpsc::UnboundedReceiver<InboundMessage>) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    while let Some(event) = events.recv().await {
        let mut line = serde_json::to_vec(&ClientEvent {
            connection: event.connection_id,
            body: &event.body,
        })?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        stdout.flush().await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
