//! Room-relay transport: connects to `/relay`, sends the handshake auth
//! blob as the first frame, then exchanges named-event `RelayFrame`s
//! (spec §4.5, §6 "Room relay handshake"). Commands are wrapped in a
//! `command` event whose `data` is the same JSON envelope the local
//! transport would have sent unwrapped.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use bridge_relay::protocol::{DeviceType, Envelope, HandshakeAuth, RelayFrame};

use super::TransportHandle;
use crate::error::ClientError;
use crate::inflight::InflightTable;

pub struct RelayAuth {
    pub token: String,
    pub workspace_id: String,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

pub async fn connect(
    url: &str,
    auth: RelayAuth,
    deadline: Duration,
    inflight: InflightTable,
    event_tx: tokio::sync::broadcast::Sender<Envelope>,
) -> Result<TransportHandle, ClientError> {
    let (ws, _response) = tokio::time::timeout(deadline, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_| ClientError::ConnectTimeout(deadline))?
        .map_err(|e| ClientError::Transport(e.to_string()))?;

    let (mut sink, mut stream) = ws.split();

    let handshake = HandshakeAuth {
        token: auth.token,
        workspace_id: auth.workspace_id,
        device_id: auth.device_id,
        device_name: auth.device_name,
        device_type: DeviceType::Mobile,
    };
    let handshake_json = serde_json::to_string(&handshake).expect("handshake serializes");
    sink.send(Message::Text(handshake_json.into()))
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;

    // First reply is either `connected` (handshake ok) or `error` (rejected).
    let first = tokio::time::timeout(deadline, stream.next())
        .await
        .map_err(|_| ClientError::ConnectTimeout(deadline))?
        .ok_or(ClientError::ConnectionClosed)?
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    let Message::Text(first_text) = first else {
        return Err(ClientError::Malformed("expected text frame after handshake".into()));
    };
    let frame = RelayFrame::decode(&first_text).map_err(|e| ClientError::Malformed(e.to_string()))?;
    match frame.event.as_str() {
        "connected" => {}
        "error" => {
            let code = frame.data.get("code").and_then(|v| v.as_str()).unwrap_or("UNKNOWN").to_string();
            return Err(ClientError::Server { code, message: "relay handshake rejected".to_string() });
        }
        other => return Err(ClientError::Malformed(format!("unexpected first frame event {other}"))),
    }

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(64);
    let closed = CancellationToken::new();

    tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            let data = serde_json::to_value(&envelope).expect("envelope serializes");
            let frame = RelayFrame::new("command", data);
            if sink.send(Message::Text(frame.encode().into())).await.is_err() {
                break;
            }
        }
    });

    let closed_reader = closed.clone();
    tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            let Message::Text(text) = msg else { continue };
            let Ok(frame) = RelayFrame::decode(&text) else {
                debug!("malformed relay frame");
                continue;
            };
            match frame.event.as_str() {
                "response" | "event" => match serde_json::from_value::<Envelope>(frame.data) {
                    Ok(envelope) => dispatch(envelope, &inflight, &event_tx).await,
                    Err(e) => debug!(error = %e, "malformed envelope inside relay frame"),
                },
                "device:connected" | "device:disconnected" | "message" | "ping" | "pong" => {}
                other => debug!(event = %other, "unhandled relay event"),
            }
        }
        warn!("relay transport closed");
        inflight.reject_all().await;
        closed_reader.cancel();
    });

    Ok(TransportHandle { outbound: outbound_tx, closed })
}

async fn dispatch(envelope: Envelope, inflight: &InflightTable, event_tx: &tokio::sync::broadcast::Sender<Envelope>) {
    match &envelope {
        Envelope::Response { command_id, data, .. } => {
            inflight.complete(command_id, Ok(data.clone())).await;
        }
        Envelope::Error { command_id, code, message, .. } => {
            if let Some(command_id) = command_id {
                inflight
                    .complete(
                        command_id,
                        Err(ClientError::Server { code: code.clone(), message: message.clone() }),
                    )
                    .await;
            }
        }
        Envelope::Event { .. } => {
            let _ = event_tx.send(envelope);
        }
        Envelope::Command { .. } => {}
    }
}
