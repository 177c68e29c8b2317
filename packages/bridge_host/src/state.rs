//! Shared application state (spec §5, §9), handed to every handler through
//! axum's `State` extractor.

use std::path::PathBuf;
use std::sync::Arc;

use bridge_auth::{DeviceRegistry, InMemoryPairingStore, TokenService};

use crate::ai::AiBridge;
use crate::connections::Connections;
use crate::diagnostics::DiagnosticsAggregator;
use crate::editor::EditorEngine;
use crate::terminal::TerminalEngine;
use crate::tunnel::TunnelSupervisor;

pub struct Workspace {
    pub id: String,
    pub name: String,
    pub root: PathBuf,
}

pub struct AppState {
    pub workspace: Workspace,
    pub sessions: InMemoryPairingStore,
    pub devices: DeviceRegistry,
    pub tokens: Arc<TokenService>,
    pub connections: Connections,
    pub terminal: Arc<TerminalEngine>,
    pub diagnostics: Arc<DiagnosticsAggregator>,
    pub editor: Arc<EditorEngine>,
    pub ai: Arc<AiBridge>,
    pub relay: Arc<bridge_relay::RelayState>,
    pub tunnel: Option<Arc<TunnelSupervisor>>,
    pub max_file_size_bytes: u64,
}

impl AppState {
    pub fn workspace_root(&self) -> &std::path::Path {
        &self.workspace.root
    }

    pub async fn editor_open(&self, file_path: &str, content: String) {
        self.editor.open(file_path.to_string(), content).await;
    }
}
