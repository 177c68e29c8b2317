use serde_json::Value;
use tokio::sync::mpsc;

use crate::ai::AiStreamEvent;
use crate::error::{ErrorCode, HandlerError};
use crate::handlers::required_str;
use crate::state::AppState;

pub async fn handle(state: &AppState, socket_id: &str, action: &str, payload: Value) -> Result<Value, HandlerError> {
    let bridge = state.ai.clone();
    match action {
        "getStatus" => Ok(serde_json::to_value(bridge.status().await).expect("serializable")),
        "getExtensions" => Ok(serde_json::to_value(bridge.extensions()).expect("serializable")),
        "createSession" => Ok(serde_json::to_value(bridge.create_session().await?).expect("serializable")),
        "getSession" => {
            let id = required_str(&payload, "id")?;
            Ok(serde_json::to_value(bridge.get_session(id).await?).expect("serializable"))
        }
        "listSessions" => Ok(serde_json::to_value(bridge.list_sessions().await).expect("serializable")),
        "deleteSession" => {
            let id = required_str(&payload, "id")?;
            bridge.delete_session(id).await?;
            Ok(Value::Null)
        }
        "sendMessage" => {
            let session_id = required_str(&payload, "sessionId")?.to_string();
            let text = required_str(&payload, "text")?.to_string();

            let (tx, mut rx) = mpsc::channel::<AiStreamEvent>(64);
            let outbound = state.connections.sender(socket_id).await;

            tokio::spawn({
                let bridge = bridge.clone();
                async move {
                    let _ = bridge.send_message(&session_id, &text, tx).await;
                }
            });

            // The dispatcher replies immediately; stream frames follow as
            // `event` envelopes on the same connection the command arrived on.
            if let Some(sender) = outbound {
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        let (event_type, data) = encode_event(event);
                        let envelope = bridge_relay::protocol::Envelope::Event {
                            id: uuid::Uuid::new_v4().to_string(),
                            timestamp: chrono::Utc::now().timestamp_millis(),
                            event_type,
                            data,
                        };
                        if sender.send(envelope).await.is_err() {
                            break;
                        }
                    }
                });
            }

            Ok(Value::Null)
        }
        other => Err(HandlerError::new(ErrorCode::UnknownCommand, format!("ai:{other}"))),
    }
}

fn encode_event(event: AiStreamEvent) -> (String, Value) {
    match event {
        AiStreamEvent::StreamChunk { session_id, message_id, content } => (
            "streamChunk".to_string(),
            serde_json::json!({"sessionId": session_id, "messageId": message_id, "content": content}),
        ),
        AiStreamEvent::StreamEnd { session_id, message_id } => (
            "streamEnd".to_string(),
            serde_json::json!({"sessionId": session_id, "messageId": message_id}),
        ),
        AiStreamEvent::Message { session_id, message } => (
            "message".to_string(),
            serde_json::json!({"sessionId": session_id, "message": message}),
        ),
    }
}
