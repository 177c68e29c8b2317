//! End-to-end tests against the local WebSocket server: a real `axum`
//! listener on a random port, a real `tokio-tungstenite` client, pairing
//! redemption, command/response round trips, and the size-guard scenario.
//!
//! Grounded on the teacher's `interconnect/e2e_tests.rs`: stand up a real
//! listener and drive it with a real client rather than calling handlers
//! in-process.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bridge_auth::{DeviceRegistry, InMemoryPairingStore};
use bridge_relay::protocol::{Category, Envelope};
use bridge_relay::server::AllowAll;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::ai::AiBridge;
use crate::connections::Connections;
use crate::diagnostics::{DiagnosticsAggregator, ThrottleConfig};
use crate::editor::EditorEngine;
use crate::state::{AppState, Workspace};
use crate::terminal::TerminalEngine;
use crate::ws::local_server;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);
type TestSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_host(root: PathBuf, max_file_size_bytes: u64) -> (SocketAddr, Arc<AppState>) {
    let tokens = Arc::new(bridge_auth::TokenService::new(None, None, 3600, 86_400));
    let relay_state = Arc::new(bridge_relay::RelayState::new(Arc::new(AllowAll), true));

    let state = Arc::new(AppState {
        workspace: Workspace {
            id: "ws-test".to_string(),
            name: "test-workspace".to_string(),
            root,
        },
        sessions: InMemoryPairingStore::new(),
        devices: DeviceRegistry::new(),
        tokens,
        connections: Connections::new(),
        terminal: Arc::new(TerminalEngine::new()),
        diagnostics: Arc::new(DiagnosticsAggregator::new(ThrottleConfig::default())),
        editor: Arc::new(EditorEngine::new()),
        ai: Arc::new(AiBridge::new(vec![])),
        relay: relay_state,
        tunnel: None,
        max_file_size_bytes,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let router = local_server::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server error");
    });

    (addr, state)
}

async fn connect(addr: SocketAddr, token: &str) -> TestSocket {
    let url = format!("ws://{addr}/ws?token={token}&deviceName=phone");
    let (ws, _resp) = timeout(TEST_TIMEOUT, tokio_tungstenite::connect_async(url))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

async fn next_text(ws: &mut TestSocket) -> String {
    loop {
        match timeout(TEST_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read error")
        {
            Message::Text(t) => return t.to_string(),
            _ => continue,
        }
    }
}

async fn send_command(ws: &mut TestSocket, category: Category, action: &str, payload: serde_json::Value) {
    let envelope = Envelope::Command {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        category,
        action: action.to_string(),
        payload,
    };
    ws.send(Message::Text(envelope.encode().into())).await.expect("send command");
}

/// E1 (spec §8): pairing via secret yields a `connected` event with a fresh
/// access token; reconnecting with the access token succeeds without
/// redeeming anything, and the original secret is single-use.
#[tokio::test]
async fn pairing_secret_redeems_once_then_access_token_takes_over() {
    let tmp = tempfile::tempdir().unwrap();
    let (addr, state) = start_host(tmp.path().to_path_buf(), 5 * 1024 * 1024).await;

    let pair = state
        .sessions
        .generate_pair("ws-test", "test-workspace", 300, None, None)
        .await;

    let mut ws = connect(addr, &pair.secret).await;
    let welcome = Envelope::decode(&next_text(&mut ws).await).expect("decode welcome");
    let Envelope::Event { event_type, data, .. } = welcome else {
        panic!("expected connected event, got {welcome:?}");
    };
    assert_eq!(event_type, "connected");
    let access_token = data["accessToken"].as_str().expect("accessToken present").to_string();
    let _ = ws.close(None).await;

    // Reconnecting with the freshly-issued access token succeeds with no
    // welcome event — it isn't redeeming a pairing secret.
    let mut ws2 = connect(addr, &access_token).await;
    send_command(&mut ws2, Category::Workspace, "getInfo", serde_json::json!({})).await;
    let reply = Envelope::decode(&next_text(&mut ws2).await).expect("decode reply");
    assert!(matches!(reply, Envelope::Response { .. }));
    let _ = ws2.close(None).await;

    // The original secret was single-use; a third connection with it fails.
    let mut ws3 = connect(addr, &pair.secret).await;
    let err = Envelope::decode(&next_text(&mut ws3).await).expect("decode error");
    assert!(matches!(err, Envelope::Error { ref code, .. } if code == "INVALID_TOKEN"));
}

/// E6 (spec §8): reading a file over the configured size limit is a handler
/// error, not a truncated read.
#[tokio::test]
async fn oversized_file_read_is_rejected_not_truncated() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("big.bin"), vec![0u8; 64]).unwrap();

    // Limit set below the seeded file's size so the guard actually trips.
    let (addr, state) = start_host(tmp.path().to_path_buf(), 16).await;
    let creds = state.tokens.issue_tokens("dev-1", "ws-test", "test-workspace").await;

    let mut ws = connect(addr, &creds.access).await;
    send_command(&mut ws, Category::File, "read", serde_json::json!({"path": "big.bin"})).await;

    let reply = Envelope::decode(&next_text(&mut ws).await).expect("decode reply");
    assert!(matches!(reply, Envelope::Error { ref code, .. } if code == "HANDLER_ERROR"));
}

/// Missing/garbage token is rejected with MISSING_TOKEN / INVALID_TOKEN and
/// the connection never reaches the command-dispatch stage.
#[tokio::test]
async fn unauthenticated_connection_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let (addr, _state) = start_host(tmp.path().to_path_buf(), 5 * 1024 * 1024).await;

    let mut ws = connect(addr, "not-a-real-token").await;
    let err = Envelope::decode(&next_text(&mut ws).await).expect("decode error");
    assert!(matches!(err, Envelope::Error { ref code, .. } if code == "INVALID_TOKEN"));
}
