//! Socket gateway entry point
//!
//! Loads a gateway configuration, starts the connection manager and sends
//! one payload through a named connection, printing the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use gateway_config::{default_config_path, load_config, GatewayConfig};
use network::{ConnectionManager, ServiceRecordLookup, StaticServiceDirectory};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use types::{ConnectionId, OutgoingMessageResponse, StructuredMessage};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (defaults to $SOCKGATE_CONFIG or config/gateway.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment overlay name, e.g. `production`
    #[arg(short, long)]
    env: Option<String>,

    /// Connection id to send through
    #[arg(long)]
    connection: String,

    /// File holding the structured payload
    #[arg(short, long)]
    payload: PathBuf,

    /// Session id returned by an earlier send
    #[arg(short, long)]
    session: Option<String>,

    /// Override the connection's exchange pattern
    #[arg(long)]
    expect_response: Option<bool>,
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("socket_gateway={0},network={0},warn", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Manager with every configured connection registered and started
async fn start_manager(config: &GatewayConfig) -> Result<ConnectionManager> {
    let directory: Arc<dyn ServiceRecordLookup> =
        Arc::new(StaticServiceDirectory::from_config(&config.service_records));
    let manager = ConnectionManager::tcp(Some(directory));

    for definition in config.connections.iter().cloned() {
        let id = definition.id.clone();
        manager
            .connection_updated(definition)
            .await
            .with_context(|| format!("Failed to register connection '{}'", id))?;
    }
    manager.start().await.context("Failed to start connections")?;
    Ok(manager)
}

async fn send_once(
    manager: &ConnectionManager,
    connection: &str,
    payload: StructuredMessage,
    session: Option<&str>,
    expect_response: Option<bool>,
) -> Result<OutgoingMessageResponse> {
    let id = ConnectionId::new(connection);
    let response = manager
        .send_message(&id, &payload, session, expect_response)
        .await
        .with_context(|| format!("Send through '{}' failed", connection))?;
    Ok(response)
}

fn render(response: &OutgoingMessageResponse) -> String {
    let body = match &response.bytes {
        Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        None => "<no response>".to_string(),
    };
    format!(
        "session: {}\ncontent-type: {}\n\n{}",
        response.session_id, response.content_type, body
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(Some(config_path.as_path()), args.env.as_deref())
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    init_tracing(&config.log_level);

    info!("Starting socket gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let payload = std::fs::read(&args.payload)
        .with_context(|| format!("Failed to read payload {}", args.payload.display()))?;
    let content_type = config
        .get_connection(&args.connection)
        .map(|c| c.content_type.clone())
        .unwrap_or_else(|| types::DEFAULT_CONTENT_TYPE.to_string());
    let payload = StructuredMessage::new(payload, content_type);

    let manager = start_manager(&config).await?;
    let result = send_once(
        &manager,
        &args.connection,
        payload,
        args.session.as_deref(),
        args.expect_response,
    )
    .await;
    manager.shutdown().await;

    let response = result?;
    if !response.has_response() && args.expect_response != Some(false) {
        warn!(session_id = %response.session_id, "No response body");
    }
    println!("{}", render(&response));
    Ok(())
}
