//! Standalone durable relay binary (spec §6 "Optional durable relay").
//!
//! Stands up both the room-relay WebSocket endpoint and the relay HTTP API
//! on one axum `Router`, independent of any editor host process.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use bridge_relay::http_api::{router as http_router, RelayHttpState};
use bridge_relay::server::{router as relay_router, AllowAll, RelayState};

#[derive(Parser, Debug)]
#[command(name = "bridge-relay", about = "Standalone durable relay for the editor/mobile bridge")]
struct Cli {
    /// Address to bind the combined relay + HTTP API on.
    #[arg(long, default_value = "0.0.0.0:8787")]
    listen: SocketAddr,

    /// Accept the well-known development token without verifying against a
    /// credential service. Never set this in a real deployment.
    #[arg(long)]
    dev_mode: bool,

    /// Access token lifetime in seconds.
    #[arg(long, default_value_t = 3600)]
    access_ttl_secs: i64,

    /// Refresh token lifetime in seconds.
    #[arg(long, default_value_t = 60 * 60 * 24 * 30)]
    refresh_ttl_secs: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let relay_state = Arc::new(RelayState::new(Arc::new(AllowAll), cli.dev_mode));
    let http_state = Arc::new(RelayHttpState::new(cli.access_ttl_secs, cli.refresh_ttl_secs));

    let app = Router::new()
        .merge(relay_router(relay_state))
        .merge(http_router(http_state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;
    tracing::info!(addr = %cli.listen, "durable relay listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("relay server exited")?;
    Ok(())
}
