//! `ai` category handlers (spec §4.11): back-end probing, session lifecycle,
//! and streamed assistant responses. The streamed-chunk shape is grounded on
//! the pack's Codex JSONL adapter (typed event enum fed by a line parser);
//! here the "lines" come from an in-process [`AiBackend`] rather than a
//! subprocess, since this host has no child AI process of its own to parse.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::error::{ErrorCode, HandlerError};

#[derive(Debug, Clone, Serialize)]
pub struct AiExtension {
    pub id: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiStatus {
    pub available: bool,
    #[serde(rename = "activeBackend")]
    pub active_backend: Option<String>,
}

/// One back-end the host can address for a session. Probed once at startup;
/// switching back-ends requires a new session (spec §4.11).
#[async_trait]
pub trait AiBackend: Send + Sync {
    fn id(&self) -> &str;
    async fn probe(&self) -> bool;
    async fn send_message(
        &self,
        session: &AiSessionState,
        text: &str,
    ) -> Result<mpsc::Receiver<String>, HandlerError>;
}

#[derive(Debug, Clone)]
pub struct AiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct AiSessionState {
    pub id: String,
    pub backend_id: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<AiMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiSessionSummary {
    pub id: String,
    #[serde(rename = "backendId")]
    pub backend_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "messageCount")]
    pub message_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AiStreamEvent {
    #[serde(rename = "streamChunk")]
    StreamChunk {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
        content: String,
    },
    #[serde(rename = "streamEnd")]
    StreamEnd {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
    },
    #[serde(rename = "message")]
    Message {
        #[serde(rename = "sessionId")]
        session_id: String,
        message: AiMessageWire,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AiMessageWire {
    pub id: String,
    pub role: String,
    pub content: String,
}

pub struct AiBridge {
    backends: Vec<Arc<dyn AiBackend>>,
    active: RwLock<Option<Arc<dyn AiBackend>>>,
    sessions: RwLock<HashMap<String, AiSessionState>>,
}

impl AiBridge {
    pub fn new(backends: Vec<Arc<dyn AiBackend>>) -> Self {
        Self {
            backends,
            active: RwLock::new(None),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Probe every registered back-end and adopt the first that responds.
    pub async fn probe_backends(&self) {
        for backend in &self.backends {
            if backend.probe().await {
                *self.active.write().await = Some(backend.clone());
                return;
            }
        }
        *self.active.write().await = None;
    }

    pub async fn status(&self) -> AiStatus {
        let active = self.active.read().await;
        AiStatus {
            available: active.is_some(),
            active_backend: active.as_ref().map(|b| b.id().to_string()),
        }
    }

    pub fn extensions(&self) -> Vec<AiExtension> {
        self.backends
            .iter()
            .map(|b| AiExtension {
                id: b.id().to_string(),
                name: b.id().to_string(),
                version: "1".to_string(),
            })
            .collect()
    }

    pub async fn create_session(&self) -> Result<AiSessionSummary, HandlerError> {
        let backend = self
            .active
            .read()
            .await
            .clone()
            .ok_or_else(|| HandlerError::new(ErrorCode::AiUnavailable, "no ai backend available"))?;

        let session = AiSessionState {
            id: Uuid::new_v4().to_string(),
            backend_id: backend.id().to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
        };
        let summary = AiSessionSummary {
            id: session.id.clone(),
            backend_id: session.backend_id.clone(),
            created_at: session.created_at,
            message_count: 0,
        };
        self.sessions.write().await.insert(session.id.clone(), session);
        Ok(summary)
    }

    pub async fn get_session(&self, id: &str) -> Result<AiSessionSummary, HandlerError> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|s| AiSessionSummary {
                id: s.id.clone(),
                backend_id: s.backend_id.clone(),
                created_at: s.created_at,
                message_count: s.messages.len(),
            })
            .ok_or_else(|| HandlerError::not_found("ai session not found"))
    }

    pub async fn list_sessions(&self) -> Vec<AiSessionSummary> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| AiSessionSummary {
                id: s.id.clone(),
                backend_id: s.backend_id.clone(),
                created_at: s.created_at,
                message_count: s.messages.len(),
            })
            .collect()
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), HandlerError> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| HandlerError::not_found("ai session not found"))
    }

    /// Send a user message, invoke the active back-end, and forward its
    /// streamed response onto `events` as `streamChunk`/`streamEnd`/`message`
    /// frames (spec §4.11). On back-end failure the stream still ends and
    /// the final message carries the error text.
    pub async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        events: mpsc::Sender<AiStreamEvent>,
    ) -> Result<(), HandlerError> {
        let backend = self
            .active
            .read()
            .await
            .clone()
            .ok_or_else(|| HandlerError::new(ErrorCode::AiUnavailable, "no ai backend available"))?;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| HandlerError::not_found("ai session not found"))?;
        session.messages.push(AiMessage {
            role: "user".to_string(),
            content: text.to_string(),
        });
        let session_snapshot = session.clone();
        drop(sessions);

        let message_id = Uuid::new_v4().to_string();
        let result = backend.send_message(&session_snapshot, text).await;

        let mut assembled = String::new();
        let mut error_text = None;
        match result {
            Ok(mut chunk_rx) => {
                while let Some(chunk) = chunk_rx.recv().await {
                    assembled.push_str(&chunk);
                    let _ = events
                        .send(AiStreamEvent::StreamChunk {
                            session_id: session_id.to_string(),
                            message_id: message_id.clone(),
                            content: chunk,
                        })
                        .await;
                }
            }
            Err(e) => {
                error_text = Some(e.message);
            }
        }

        let _ = events
            .send(AiStreamEvent::StreamEnd {
                session_id: session_id.to_string(),
                message_id: message_id.clone(),
            })
            .await;

        let final_content = error_text.unwrap_or(assembled);
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.messages.push(AiMessage {
                role: "assistant".to_string(),
                content: final_content.clone(),
            });
        }
        drop(sessions);

        let _ = events
            .send(AiStreamEvent::Message {
                session_id: session_id.to_string(),
                message: AiMessageWire {
                    id: message_id,
                    role: "assistant".to_string(),
                    content: final_content,
                },
            })
            .await;

        Ok(())
    }
}

/// Shells out to a configured CLI integration (e.g. a `claude`-style binary
/// found on `PATH`) and streams its stdout lines as chunks. Mirrors the
/// "detect available command, else fall back" probing the teacher does for
/// its own default child command, but here the probe just checks the binary
/// resolves at all.
pub struct CliAiBackend {
    id: String,
    program: String,
    args: Vec<String>,
}

impl CliAiBackend {
    pub fn new(id: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: id.into(),
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl AiBackend for CliAiBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn probe(&self) -> bool {
        Command::new("which")
            .arg(&self.program)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn send_message(
        &self,
        _session: &AiSessionState,
        text: &str,
    ) -> Result<mpsc::Receiver<String>, HandlerError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| HandlerError::new(ErrorCode::AiUnavailable, format!("failed to spawn {}: {e}", self.program)))?;

        let mut stdin = child.stdin.take().expect("piped stdin");
        let text = text.to_string();
        tokio::spawn(async move {
            let _ = stdin.write_all(text.as_bytes()).await;
            let _ = stdin.write_all(b"\n").await;
        });

        let stdout = child.stdout.take().expect("piped stdout");
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(format!("{line}\n")).await.is_err() {
                    break;
                }
            }
            let _ = child.wait().await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoBackend;

    #[async_trait]
    impl AiBackend for EchoBackend {
        fn id(&self) -> &str {
            "echo"
        }
        async fn probe(&self) -> bool {
            true
        }
        async fn send_message(
            &self,
            _session: &AiSessionState,
            text: &str,
        ) -> Result<mpsc::Receiver<String>, HandlerError> {
            let (tx, rx) = mpsc::channel(4);
            let text = text.to_string();
            tokio::spawn(async move {
                let _ = tx.send(text).await;
            });
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn status_reflects_probed_backend() {
        let bridge = AiBridge::new(vec![Arc::new(EchoBackend)]);
        bridge.probe_backends().await;
        let status = bridge.status().await;
        assert!(status.available);
        assert_eq!(status.active_backend.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn send_message_streams_and_finalizes() {
        let bridge = AiBridge::new(vec![Arc::new(EchoBackend)]);
        bridge.probe_backends().await;
        let session = bridge.create_session().await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        bridge.send_message(&session.id, "hi", tx).await.unwrap();

        let mut saw_chunk = false;
        let mut saw_end = false;
        let mut saw_message = false;
        while let Some(event) = rx.recv().await {
            match event {
                AiStreamEvent::StreamChunk { .. } => saw_chunk = true,
                AiStreamEvent::StreamEnd { .. } => saw_end = true,
                AiStreamEvent::Message { message, .. } => {
                    saw_message = true;
                    assert_eq!(message.content, "hi");
                }
            }
        }
        assert!(saw_chunk && saw_end && saw_message);
    }

    #[tokio::test]
    async fn create_session_fails_without_backend() {
        let bridge = AiBridge::new(vec![]);
        bridge.probe_backends().await;
        let err = bridge.create_session().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AiUnavailable);
    }
}
