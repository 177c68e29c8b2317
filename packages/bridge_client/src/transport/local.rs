//! Direct LAN transport: the envelope goes over the wire exactly as
//! `ws/local_server.rs` expects it — one JSON text frame per envelope, no
//! outer wrapping (spec §4.7: "when using raw WebSocket, the envelope is
//! sent as a single text frame").

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bridge_relay::protocol::Envelope;

use super::TransportHandle;
use crate::error::ClientError;
use crate::inflight::InflightTable;

/// Connect to the local WebSocket server, failing if the handshake doesn't
/// complete within `deadline` (spec §4.7: "short connect deadline (5 s)").
pub async fn connect(
    url: &str,
    deadline: Duration,
    inflight: InflightTable,
    event_tx: tokio::sync::broadcast::Sender<Envelope>,
) -> Result<TransportHandle, ClientError> {
    let (ws, _response) = tokio::time::timeout(deadline, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_| ClientError::ConnectTimeout(deadline))?
        .map_err(|e| ClientError::Transport(e.to_string()))?;

    let (mut sink, mut stream) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(64);
    let closed = CancellationToken::new();

    tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            if sink.send(Message::Text(envelope.encode().into())).await.is_err() {
                break;
            }
        }
    });

    let closed_reader = closed.clone();
    tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            let Message::Text(text) = msg else { continue };
            match Envelope::decode(&text) {
                Ok(envelope) => dispatch(envelope, &inflight, &event_tx).await,
                Err(e) => debug!(error = %e, "malformed envelope from local transport"),
            }
        }
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
