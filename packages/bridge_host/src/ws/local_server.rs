//! Local WebSocket server (spec §4.4): a single upgrade path, query-string
//! authentication accepting either a pairing secret or a bearer access
//! token, and a `/health` liveness endpoint.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use bridge_relay::protocol::Envelope;

use crate::connections::{Connection, DeviceKind};
use crate::error::ErrorCode;
use crate::handlers;
use crate::state::AppState;

#[derive(Deserialize)]
struct ConnectQuery {
    token: String,
    #[serde(rename = "deviceName")]
    device_name: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(upgrade))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn upgrade(
    Query(query): Query<ConnectQuery>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token, query.device_name))
}

/// Outcome of authenticating the `?token=` query parameter (spec §4.4).
enum AuthOutcome {
    /// Redeemed a pairing secret; the caller should emit `connected` with a
    /// fresh bearer pair so the client can reconnect without the pairing path.
    PairingRedeemed { device_id: String, bearer: bridge_auth::BearerCredential },
    /// An existing bearer access token.
    Bearer { device_id: String, workspace_id: String },
}

async fn authenticate(state: &AppState, token: &str, device_name: Option<&str>) -> Result<AuthOutcome, ErrorCode> {
    let digest = bridge_auth::secret::digest_hex(token);
    if let Ok(session) = state.sessions.find_by_digest(&digest).await {
        let _ = state.sessions.complete(&session.session_id).await;
        let device = state
            .devices
            .register(&session.workspace_id, device_name.unwrap_or("mobile"), "unknown", "0.0.0")
            .await;
        let bearer = state
            .tokens
            .issue_tokens(&device.device_id, &session.workspace_id, &session.workspace_name)
            .await;
        return Ok(AuthOutcome::PairingRedeemed {
            device_id: device.device_id,
            bearer,
        });
    }

    match state.tokens.verify_access(token) {
        Ok(claims) => Ok(AuthOutcome::Bearer {
            device_id: claims.device_id,
            workspace_id: claims.workspace_id,
        }),
        Err(_) if token.is_empty() => Err(ErrorCode::MissingToken),
        Err(_) => Err(ErrorCode::InvalidToken),
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, token: String, device_name: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    let auth = authenticate(&state, &token, device_name.as_deref()).await;
    let (device_id, workspace_id) = match auth {
        Ok(AuthOutcome::Bearer { device_id, workspace_id }) => (device_id, workspace_id),
        Ok(AuthOutcome::PairingRedeemed { device_id, bearer }) => {
            let welcome = Envelope::Event {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now().timestamp_millis(),
                event_type: "connected".to_string(),
                data: json!({"accessToken": bearer.access, "refreshToken": bearer.refresh}),
            };
            if sender.send(Message::Text(welcome.encode().into())).await.is_err() {
                return;
            }
            (device_id, state.workspace.id.clone())
        }
        Err(code) => {
            let _ = sender
                .send(Message::Text(
                    Envelope::Error {
                        id: Uuid::new_v4().to_string(),
                        timestamp: Utc::now().timestamp_millis(),
                        command_id: None,
                        code: code.as_str().to_string(),
                        message: "authentication failed".to_string(),
                        details: None,
                    }
                    .encode()
                    .into(),
                ))
                .await;
            return;
        }
    };

    let socket_id = Uuid::new_v4().to_string();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(256);

    state
        .connections
        .insert(Connection {
            socket_id: socket_id.clone(),
            device_id: device_id.clone(),
            device_kind: DeviceKind::Mobile,
            workspace_id: workspace_id.clone(),
            connected_at: Utc::now(),
            last_activity: Utc::now(),
            outbound: outbound_tx,
            streams: Default::default(),
        })
        .await;

    let send_task = tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            if sender.send(Message::Text(envelope.encode().into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };
        state.connections.touch(&socket_id).await;

        let envelope = match Envelope::decode(&text) {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "malformed envelope, not tearing down connection");
                continue;
            }
        };

        let Envelope::Command { id, category, action, payload, .. } = envelope else {
            continue;
        };

        let socket_id = socket_id.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = handlers::dispatch(&state, &socket_id, category, &action, payload).await;
            let reply = match result {
                Ok(data) => Envelope::Response {
                    id: Uuid::new_v4().to_string(),
                    timestamp: Utc::now().timestamp_millis(),
                    command_id: id,
                    data,
                },
                Err(e) => Envelope::Error {
                    id: Uuid::new_v4().to_string(),
                    timestamp: Utc::now().timestamp_millis(),
                    command_id: Some(id),
                    code: e.code.as_str().to_string(),
                    message: e.message,
                    details: None,
                },
            };
            if let Some(sender) = state.connections.sender(&socket_id).await {
                let _ = sender.send(reply).await;
            }
        });
    }

    if let Some(streams) = state.connections.remove(&socket_id).await {
        state.terminal.kill_streams(&streams).await;
    }
    send_task.abort();
    debug!(%socket_id, "local websocket connection closed");
}
