//! Editor-host daemon: local WebSocket server, embedded room relay, tunnel
//! supervisor, and command dispatcher (spec §1-§2) in one process.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod ai;
mod config;
mod connections;
mod diagnostics;
mod editor;
mod error;
mod files;
mod git;
mod handlers;
mod state;
mod terminal;
mod tunnel;
mod ws;

#[cfg(test)]
mod integration_tests;

use ai::{AiBridge, CliAiBackend};
use bridge_auth::{DeviceRegistry, InMemoryPairingStore, TokenService};
use bridge_relay::server::{AllowAll, RelayState};
use config::{Profile, load_config};
use connections::Connections;
use diagnostics::{DiagnosticsAggregator, ThrottleConfig};
use editor::EditorEngine;
use state::{AppState, Workspace};
use terminal::TerminalEngine;
use tunnel::{TunnelProvider, TunnelSupervisor};

#[derive(Parser)]
#[command(name = "bridged", about = "Editor-host bridge daemon")]
struct Cli {
    /// Workspace root directory to serve (defaults to the current directory).
    #[arg(long)]
    workspace_root: Option<PathBuf>,

    /// Human-readable workspace name shown in QR/pairing payloads.
    #[arg(long)]
    workspace_name: Option<String>,

    /// Directory for the daemon's own state (workspace id, config.toml).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Configuration profile (sets bind host / tunnel defaults).
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    /// Override the local WebSocket port.
    #[arg(long)]
    local_port: Option<u16>,

    /// Override the embedded relay port.
    #[arg(long)]
    relay_port: Option<u16>,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "bridge_host=debug,tower_http=debug,info"
    } else {
        "bridge_host=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let data_dir = cli
        .data_dir
        .or_else(|| dirs::data_dir().map(|d| d.join("bridge-host")))
        .unwrap_or_else(|| PathBuf::from(".bridge-host"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let fc: config::FileConfig = load_config(&data_dir, cli.profile.as_ref())
        .extract()
        .unwrap_or_default();

    let workspace_root = cli
        .workspace_root
        .unwrap_or_else(|| std::env::current_dir().expect("cwd readable"))
        .canonicalize()
        .context("canonicalizing workspace root")?;
    let workspace_id = load_or_generate_workspace_id(&data_dir)?;
    let workspace_name = cli
        .workspace_name
        .unwrap_or_else(|| workspace_root.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "workspace".to_string()));

    info!(workspace_id = %workspace_id, root = %workspace_root.display(), "starting editor-host bridge");

    let jwt_secret = fc.jwt_secret.as_ref().map(|s| s.as_bytes().to_vec());
    let jwt_refresh_secret = fc.jwt_refresh_secret.as_ref().map(|s| s.as_bytes().to_vec());

    let ai_bridge = Arc::new(AiBridge::new(vec![Arc::new(CliAiBackend::new(
        "claude-cli",
        "claude",
        vec!["--print".to_string()],
    ))]));
    ai_bridge.probe_backends().await;

    let tokens = Arc::new(TokenService::new(jwt_secret, jwt_refresh_secret, fc.access_ttl_seconds, fc.refresh_ttl_seconds));
    let dev_mode = cli.profile == Some(Profile::Local);
    let relay_authenticator: Arc<dyn bridge_relay::server::TokenAuthenticator> = if dev_mode {
        Arc::new(AllowAll)
    } else {
        Arc::new(BridgeTokenAuthenticator(tokens.clone()))
    };
    let relay_state = Arc::new(RelayState::new(relay_authenticator, dev_mode));

    let tunnel_supervisor = if fc.auto_start_tunnel {
        Some(Arc::new(TunnelSupervisor::new(Arc::new(UnconfiguredTunnelProvider))))
    } else {
        None
    };

    let app_state = Arc::new(AppState {
        workspace: Workspace {
            id: workspace_id,
            name: workspace_name,
            root: workspace_root,
        },
        sessions: InMemoryPairingStore::new(),
        devices: DeviceRegistry::new(),
        tokens: tokens.clone(),
        connections: Connections::new(),
        terminal: Arc::new(TerminalEngine::new()),
        diagnostics: Arc::new(DiagnosticsAggregator::new(ThrottleConfig::default())),
        editor: Arc::new(EditorEngine::new()),
        ai: ai_bridge,
        relay: relay_state.clone(),
        tunnel: tunnel_supervisor.clone(),
        max_file_size_bytes: fc.max_file_size_bytes,
    });

    let bind_host = fc.bind_host.unwrap_or_else(|| "127.0.0.1".to_string());
    let local_port = cli.local_port.unwrap_or(fc.local_port);
    let relay_port = cli.relay_port.unwrap_or(fc.relay_port);

    let local_app = ws::local_server::router(app_state.clone())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let local_addr: SocketAddr = format!("{bind_host}:{local_port}").parse().context("parsing local bind address")?;
    let local_listener = tokio::net::TcpListener::bind(local_addr)
        .await
        .with_context(|| format!("binding local websocket server on {local_addr}"))?;
    let local_bound = local_listener.local_addr()?;
    info!(addr = %local_bound, "local websocket server listening");

    let relay_addr: SocketAddr = format!("{bind_host}:{relay_port}").parse().context("parsing relay bind address")?;
    let relay_router = Router::new()
        .merge(bridge_relay::server::router(relay_state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());
    let relay_listener = tokio::net::TcpListener::bind(relay_addr)
        .await
        .with_context(|| format!("binding embedded relay on {relay_addr}"))?;
    let relay_bound = relay_listener.local_addr()?;
    info!(addr = %relay_bound, "embedded room relay listening");

    if let Some(supervisor) = &tunnel_supervisor {
        supervisor.connect(relay_bound.port()).await;
    }

    spawn_diagnostics_broadcaster(app_state.clone());

    let local_server = axum::serve(local_listener, local_app.into_make_service_with_connect_info::<SocketAddr>());
    let relay_server = axum::serve(relay_listener, relay_router.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = local_server => result.context("local websocket server exited")?,
        result = relay_server => result.context("embedded relay server exited")?,
    }

    Ok(())
}

/// Drains the diagnostics aggregator's throttled batches and fans each one
/// out to every connection in the workspace room as a `diagnostics:changed`
/// event (spec §4.10). The producer side — something pushing per-file
/// updates into the aggregator — is the editor's own diagnostics
/// integration, which spec §1 treats as an external collaborator outside
/// this tree; this wiring is ready for whatever calls `apply_file_update`.
fn spawn_diagnostics_broadcaster(state: Arc<AppState>) {
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    diagnostics::spawn_batch_flusher(state.diagnostics.clone(), ThrottleConfig::default().batch_window, tx);
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            let envelope = bridge_relay::protocol::Envelope::Event {
                id: Uuid::new_v4().to_string(),
                timestamp: chrono::Utc::now().timestamp_millis(),
                event_type: "diagnostics:changed".to_string(),
                data: serde_json::to_value(&update).unwrap_or(serde_json::Value::Null),
            };
            state.connections.broadcast(&state.workspace.id, envelope).await;
        }
    });
}

/// Loads `<data_dir>/workspace_id`, or generates and persists a fresh UUID.
/// The workspace id must survive restarts (spec §3: "identified by a UUID
/// chosen at pair time"), so it's a small file rather than an in-memory-only value.
fn load_or_generate_workspace_id(data_dir: &Path) -> Result<String> {
    let path = data_dir.join("workspace_id");
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    let id = Uuid::new_v4().to_string();
    std::fs::write(&path, &id).with_context(|| format!("writing workspace id to {}", path.display()))?;
    Ok(id)
}

/// Bridges the embedded relay's transport-level authentication to the same
/// access tokens the local WebSocket server already verifies, so a device
/// that only ever talks through the relay (spec §1's remote path) is held to
/// the same bar as one connected directly.
struct BridgeTokenAuthenticator(Arc<TokenService>);

#[async_trait::async_trait]
impl bridge_relay::server::TokenAuthenticator for BridgeTokenAuthenticator {
    async fn authenticate(&self, token: &str, workspace_id: &str) -> bool {
        self.0
            .verify_access(token)
            .map(|claims| claims.workspace_id == workspace_id)
            .unwrap_or(false)
    }
}

/// No real tunnel provider ships in this tree (spec §1 treats the tunnel
/// vendor as an external collaborator); this stub puts the supervisor
/// straight into its documented backoff-then-error path instead of silently
/// pretending a tunnel exists.
struct UnconfiguredTunnelProvider;

#[async_trait::async_trait]
impl TunnelProvider for UnconfiguredTunnelProvider {
    async fn open(&self, _port: u16) -> Result<String> {
        anyhow::bail!("no tunnel provider configured")
    }
}
