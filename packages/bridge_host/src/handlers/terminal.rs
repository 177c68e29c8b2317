use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{ErrorCode, HandlerError};
use crate::handlers::{optional_str, required_str};
use crate::state::AppState;
use crate::terminal::{StreamEvent, StreamEventKind};
use pty_manager::PtyId;

fn parse_pty_id(raw: &str) -> Result<PtyId, HandlerError> {
    raw.trim_start_matches("pty-")
        .parse::<u64>()
        .map(PtyId)
        .map_err(|_| HandlerError::invalid_request("invalid terminalId"))
}

#[derive(Serialize)]
struct CreateResult {
    #[serde(rename = "terminalId")]
    terminal_id: String,
}

#[derive(Serialize)]
struct StreamStarted {
    #[serde(rename = "streamId")]
    stream_id: String,
}

#[derive(Serialize)]
struct ShowResult {
    output: String,
}

#[derive(Serialize)]
struct ListResult {
    terminals: Vec<String>,
}

#[derive(Serialize)]
struct ActiveStreamsResult {
    streams: Vec<ActiveStreamEntry>,
}

#[derive(Serialize)]
struct ActiveStreamEntry {
    #[serde(rename = "streamId")]
    stream_id: String,
    command: String,
    cwd: String,
}

pub async fn handle(
    state: &AppState,
    socket_id: &str,
    action: &str,
    payload: Value,
) -> Result<Value, HandlerError> {
    let engine = state.terminal.clone();
    match action {
        "list" => Ok(serde_json::to_value(ListResult {
            terminals: engine.list().await.into_iter().map(|id| id.to_string()).collect(),
        })
        .expect("serializable")),
        "create" => {
            let cwd = optional_str(&payload, "cwd").map(str::to_string);
            let rows = payload.get("rows").and_then(Value::as_u64).unwrap_or(24) as u16;
            let cols = payload.get("cols").and_then(Value::as_u64).unwrap_or(80) as u16;
            let id = engine.create(cwd, rows, cols).await?;
            Ok(serde_json::to_value(CreateResult { terminal_id: id.to_string() }).expect("serializable"))
        }
        "sendInput" => {
            let id = parse_pty_id(required_str(&payload, "terminalId")?)?;
            let data = required_str(&payload, "data")?;
            engine.send_input(id, data).await?;
            Ok(Value::Null)
        }
        "interrupt" => {
            let id = parse_pty_id(required_str(&payload, "terminalId")?)?;
            engine.interrupt(id).await?;
            Ok(Value::Null)
        }
        "show" => {
            let id = parse_pty_id(required_str(&payload, "terminalId")?)?;
            let output = engine.show(id).await?;
            Ok(serde_json::to_value(ShowResult {
                output: String::from_utf8_lossy(&output).into_owned(),
            })
            .expect("serializable"))
        }
        "dispose" => {
            let id = parse_pty_id(required_str(&payload, "terminalId")?)?;
            engine.dispose(id).await?;
            Ok(Value::Null)
        }
        "setCwd" => {
            let id = parse_pty_id(required_str(&payload, "terminalId")?)?;
            let cwd = required_str(&payload, "cwd")?.to_string();
            engine.set_cwd(id, cwd).await?;
            Ok(Value::Null)
        }
        "getCwd" => {
            let id = parse_pty_id(required_str(&payload, "terminalId")?)?;
            Ok(Value::String(engine.get_cwd(id).await?))
        }
        "execute" => {
            let command = required_str(&payload, "command")?;
            let cwd = optional_str(&payload, "cwd").unwrap_or_else(|| {
                state.workspace_root().to_str().unwrap_or(".")
            });
            let timeout = payload
                .get("timeout")
                .and_then(Value::as_u64)
                .map(Duration::from_millis);
            let outcome = engine.execute(command, cwd, timeout).await?;
            Ok(serde_json::to_value(outcome).expect("serializable"))
        }
        "executeStreaming" => {
            let command = required_str(&payload, "command")?.to_string();
            let cwd = optional_str(&payload, "cwd")
                .map(str::to_string)
                .unwrap_or_else(|| state.workspace_root().to_string_lossy().into_owned());

            let (tx, mut rx) = mpsc::channel::<StreamEvent>(256);
            let stream_id = engine.execute_streaming(&command, &cwd, tx).await?;

            state.connections.add_stream(socket_id, &stream_id).await;
            if let Some(sender) = state.connections.sender(socket_id).await {
                let socket_id = socket_id.to_string();
                let sid_for_cleanup = stream_id.clone();
                let connections = state.connections.clone();
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        let is_end = matches!(event, StreamEvent::StreamEnd { .. });
                        let (event_type, data) = encode_stream_event(event);
                        let envelope = bridge_relay::protocol::Envelope::Event {
                            id: uuid::Uuid::new_v4().to_string(),
                            timestamp: chrono::Utc::now().timestamp_millis(),
                            event_type,
                            data,
                        };
                        if sender.send(envelope).await.is_err() {
                            break;
                        }
                        if is_end {
                            break;
                        }
                    }
                    connections.remove_stream(&socket_id, &sid_for_cleanup).await;
                });
            }

            Ok(serde_json::to_value(StreamStarted { stream_id }).expect("serializable"))
        }
        "killStream" => {
            let stream_id = required_str(&payload, "streamId")?;
            engine.kill_stream(stream_id).await?;
            state.connections.remove_stream(socket_id, stream_id).await;
            Ok(Value::Null)
        }
        "getActiveStreams" => {
            let streams = engine
                .active_streams()
                .await
                .into_iter()
                .map(|(stream_id, command, cwd)| ActiveStreamEntry { stream_id, command, cwd })
                .collect();
            Ok(serde_json::to_value(ActiveStreamsResult { streams }).expect("serializable"))
        }
        other => Err(HandlerError::new(ErrorCode::UnknownCommand, format!("terminal:{other}"))),
    }
}

fn encode_stream_event(event: StreamEvent) -> (String, Value) {
    match event {
        StreamEvent::StreamStart { stream_id, command, cwd } => (
            "streamStart".to_string(),
            serde_json::json!({"streamId": stream_id, "command": command, "cwd": cwd}),
        ),
        StreamEvent::Output { stream_id, kind, data } => {
            let kind = match kind {
                StreamEventKind::Stdout => "stdout",
                StreamEventKind::Stderr => "stderr",
            };
            (
                "output".to_string(),
                serde_json::json!({"streamId": stream_id, "type": kind, "data": data}),
            )
        }
        StreamEvent::StreamEnd { stream_id, exit_code } => (
            "streamEnd".to_string(),
            serde_json::json!({"streamId": stream_id, "exitCode": exit_code}),
        ),
    }
}
