//! Embedded Socket.IO-style room relay (spec §4.5).
//!
//! Runs in-process on the editor host (and can also be stood up as the
//! standalone durable relay, see `bin/relay_server.rs`). Exposes a single
//! upgrade path, `/relay`, under the `/device` namespace concept; since no
//! literal engine.io/socket.io crate appears anywhere in the reference
//! corpus, the wire-level compatibility is a JSON `RelayFrame` over a plain
//! axum WebSocket rather than the literal Engine.IO handshake — see
//! DESIGN.md.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{DeviceType, HandshakeAuth, RelayFrame};
use crate::room::{DeviceKind, Member, RoomRegistry};

/// Well-known token accepted in development only (spec §4.5).
pub const DEV_DEMO_TOKEN: &str = "demo";

/// What the relay asks its embedder to do with an incoming token: anything
/// beyond the dev demo token is delegated, since token verification is the
/// credential service's job, not the relay's.
#[async_trait::async_trait]
pub trait TokenAuthenticator: Send + Sync {
    async fn authenticate(&self, token: &str, workspace_id: &str) -> bool;
}

/// Accepts everything — useful for tests and for the embedded relay when the
/// local WebSocket server has already authenticated the underlying transport.
pub struct AllowAll;

#[async_trait::async_trait]
impl TokenAuthenticator for AllowAll {
    async fn authenticate(&self, _token: &str, _workspace_id: &str) -> bool {
        true
    }
}

pub struct RelayState {
    pub rooms: Arc<RoomRegistry>,
    pub authenticator: Arc<dyn TokenAuthenticator>,
    pub dev_mode: bool,
    connections: AtomicU64,
}

impl RelayState {
    pub fn new(authenticator: Arc<dyn TokenAuthenticator>, dev_mode: bool) -> Self {
        Self {
            rooms: Arc::new(RoomRegistry::new()),
            authenticator,
            dev_mode,
            connections: AtomicU64::new(0),
        }
    }
}

pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/relay", get(upgrade))
        .with_state(state)
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (mut sender, mut receiver) = socket.split();

    let Some(Ok(Message::Text(first))) = receiver.next().await else {
        debug!("relay connection closed before handshake");
        return;
    };
    let Ok(auth) = serde_json::from_str::<HandshakeAuth>(&first) else {
        let _ = sender
            .send(Message::Text(
                RelayFrame::new("error", serde_json::json!({"code": "INVALID_REQUEST"}))
                    .encode()
                    .into(),
            ))
            .await;
        return;
    };

    let ok = if state.dev_mode && auth.token == DEV_DEMO_TOKEN {
        true
    } else {
        state
            .authenticator
            .authenticate(&auth.token, &auth.workspace_id)
            .await
    };
    if !ok {
        let _ = sender
            .send(Message::Text(
                RelayFrame::new("error", serde_json::json!({"code": "UNAUTHORIZED"}))
                    .encode()
                    .into(),
            ))
            .await;
        return;
    }

    let socket_id = Uuid::new_v4().to_string();
    let device_id = auth.device_id.clone().unwrap_or_else(|| socket_id.clone());
    let kind = match auth.device_type {
        DeviceType::Vscode => DeviceKind::EditorHost,
        DeviceType::Mobile => DeviceKind::Mobile,
    };

    let room = state.rooms.room(&auth.workspace_id).await;
    if kind == DeviceKind::EditorHost && room.editor_host_count().await > 0 {
        // Spec §9 open question (a): multiple editor-host peers per room are
        // allowed, but logged — the embedded relay still forwards commands
        // to all of them, so both may respond.
        warn!(workspace_id = %auth.workspace_id, "second editor-host peer joined room");
    }

    let (out_tx, mut out_rx) = mpsc::channel::<RelayFrame>(256);
    room.join(Member::new(
        socket_id.clone(),
        device_id.clone(),
        auth.device_name.clone(),
        kind,
        out_tx.clone(),
    ))
    .await;
    state.connections.fetch_add(1, Ordering::Relaxed);

    let _ = out_tx
        .send(RelayFrame::new(
            "connected",
            serde_json::json!({"socketId": socket_id}),
        ))
        .await;

    let send_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sender.send(Message::Text(frame.encode().into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(frame) = RelayFrame::decode(&text) else {
            continue;
        };
        forward(&room, &socket_id, kind, frame).await;
    }

    room.leave(&socket_id).await;
    state.connections.fetch_sub(1, Ordering::Relaxed);
    send_task.abort();
}

/// Apply the per-event-name forwarding rules from spec §4.5.
async fn forward(room: &crate::room::Room, sender_socket: &str, kind: DeviceKind, frame: RelayFrame) {
    match frame.event.as_str() {
        // `command`: from mobile-kind connections to the same room (editor-host peers receive).
        "command" if kind == DeviceKind::Mobile => {
            room.broadcast(frame, Some(sender_socket)).await;
        }
        // `response`, `event`: from editor-host-kind connections to the same room.
        "response" | "event" if kind == DeviceKind::EditorHost => {
            room.broadcast(frame, Some(sender_socket)).await;
        }
        // opaque pass-through, used for non-core extensions.
        "message" => {
            room.broadcast(frame, Some(sender_socket)).await;
        }
        // updates last-activity; does not forward.
        "ping" | "pong" => {}
        other => {
            debug!(event = %other, kind = ?kind, "dropping disallowed forwarded event");
        }
    }
}

/// Maximum number of port+1 retries on bind collision (spec §4.5).
const MAX_PORT_RETRIES: u16 = 5;

/// Bind the relay, retrying on `port+1` up to [`MAX_PORT_RETRIES`] times on
/// collision, and serve until the process is torn down.
pub async fn serve(addr: SocketAddr, state: Arc<RelayState>) -> anyhow::Result<SocketAddr> {
    let mut candidate = addr;
    let listener = loop {
        match tokio::net::TcpListener::bind(candidate).await {
            Ok(l) => break l,
            Err(e) if candidate.port() < addr.port() + MAX_PORT_RETRIES => {
                warn!(addr = %candidate, error = %e, "relay bind collision, retrying on next port");
                candidate.set_port(candidate.port() + 1);
            }
            Err(e) => return Err(e.into()),
        }
    };
    let bound = listener.local_addr()?;
    info!(addr = %bound, "embedded room relay listening");
    let app = router(state);
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    Ok(bound)
}
