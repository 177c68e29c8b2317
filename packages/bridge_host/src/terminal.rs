//! `terminal` category handlers (spec §4.8-4.9).
//!
//! Persistent interactive sessions (`create`/`sendInput`/`interrupt`/`show`/
//! `dispose`) are backed by [`pty_manager::PtyManager`] as-is. One-shot and
//! streaming command execution (`execute`/`executeStreaming`) run a raw child
//! process instead of a PTY: a PTY merges stdout and stderr into a single
//! stream, but the wire protocol needs them told apart.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, RwLock};

use pty_manager::{PtyConfig, PtyId, PtyManager};

use crate::error::{ErrorCode, HandlerError};

const MAX_CAPTURE_BYTES: usize = 1024 * 1024;
const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/c").arg(command);
    cmd
}

#[derive(Debug, Clone, Serialize)]
pub enum StreamEventKind {
    #[serde(rename = "stdout")]
    Stdout,
    #[serde(rename = "stderr")]
    Stderr,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "streamStart")]
    StreamStart { stream_id: String, command: String, cwd: String },
    #[serde(rename = "output")]
    Output {
        stream_id: String,
        #[serde(rename = "type")]
        kind: StreamEventKind,
        data: String,
    },
    #[serde(rename = "streamEnd")]
    StreamEnd { stream_id: String, exit_code: Option<i32> },
}

struct ActiveStream {
    command: String,
    cwd: String,
    cancel: tokio_util::sync::CancellationToken,
}

/// Owns both the PTY-backed persistent sessions and the raw child processes
/// spawned for `execute`/`executeStreaming`, per connection.
pub struct TerminalEngine {
    ptys: PtyManager,
    cwd: RwLock<HashMap<PtyId, String>>,
    streams: RwLock<HashMap<String, ActiveStream>>,
    next_stream: AtomicU64,
}

impl Default for TerminalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalEngine {
    pub fn new() -> Self {
        Self {
            ptys: PtyManager::new(),
            cwd: RwLock::new(HashMap::new()),
            streams: RwLock::new(HashMap::new()),
            next_stream: AtomicU64::new(1),
        }
    }

    pub async fn create(&self, cwd: Option<String>, rows: u16, cols: u16) -> Result<PtyId, HandlerError> {
        let config = PtyConfig {
            working_dir: cwd.clone(),
            rows,
            cols,
            ..Default::default()
        };
        let id = self
            .ptys
            .spawn(config)
            .await
            .map_err(|e| HandlerError::handler(e.to_string()))?;
        self.cwd.write().await.insert(id, cwd.unwrap_or_else(|| ".".to_string()));
        Ok(id)
    }

    pub async fn send_input(&self, id: PtyId, data: &str) -> Result<(), HandlerError> {
        self.ptys
            .write_str(id, data)
            .await
            .map(|_| ())
            .map_err(|e| HandlerError::new(ErrorCode::TerminalNotFound, e.to_string()))
    }

    pub async fn interrupt(&self, id: PtyId) -> Result<(), HandlerError> {
        self.ptys
            .kill(id, Some("SIGINT"))
            .await
            .map_err(|e| HandlerError::new(ErrorCode::TerminalNotFound, e.to_string()))
    }

    pub async fn dispose(&self, id: PtyId) -> Result<(), HandlerError> {
        self.cwd.write().await.remove(&id);
        if self.ptys.remove(id).await {
            Ok(())
        } else {
            Err(HandlerError::new(ErrorCode::TerminalNotFound, "terminal not found"))
        }
    }

    pub async fn show(&self, id: PtyId) -> Result<Vec<u8>, HandlerError> {
        self.ptys
            .full_output(id)
            .await
            .map_err(|e| HandlerError::new(ErrorCode::TerminalNotFound, e.to_string()))
    }

    pub async fn set_cwd(&self, id: PtyId, cwd: String) -> Result<(), HandlerError> {
        if !self.ptys.exists(id).await {
            return Err(HandlerError::new(ErrorCode::TerminalNotFound, "terminal not found"));
        }
        self.ptys
            .write_str(id, &format!("cd {cwd}\n"))
            .await
            .map_err(|e| HandlerError::handler(e.to_string()))?;
        self.cwd.write().await.insert(id, cwd);
        Ok(())
    }

    pub async fn get_cwd(&self, id: PtyId) -> Result<String, HandlerError> {
        self.cwd
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| HandlerError::new(ErrorCode::TerminalNotFound, "terminal not found"))
    }

    pub async fn list(&self) -> Vec<PtyId> {
        self.ptys.list().await
    }

    /// Run `command` to completion with a bounded stdout/stderr buffer and
    /// an overall timeout (spec §4.9 `execute` with `captureOutput=true`).
    pub async fn execute(
        &self,
        command: &str,
        cwd: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecuteOutcome, HandlerError> {
        let mut child = shell_command(command)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HandlerError::handler(format!("failed to spawn command: {e}")))?;

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let read_capped = |mut reader: tokio::process::ChildStdout| async move {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            let mut chunk = [0u8; 8192];
            loop {
                let n = reader.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                if buf.len() < MAX_CAPTURE_BYTES {
                    let remaining = MAX_CAPTURE_BYTES - buf.len();
                    buf.extend_from_slice(&chunk[..n.min(remaining)]);
                }
            }
            buf
        };
        let read_capped_err = |mut reader: tokio::process::ChildStderr| async move {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            let mut chunk = [0u8; 8192];
            loop {
                let n = reader.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                if buf.len() < MAX_CAPTURE_BYTES {
                    let remaining = MAX_CAPTURE_BYTES - buf.len();
                    buf.extend_from_slice(&chunk[..n.min(remaining)]);
                }
            }
            buf
        };

        let stdout_task = tokio::spawn(read_capped(stdout));
        let stderr_task = tokio::spawn(read_capped_err(stderr));

        let timeout = timeout.unwrap_or(DEFAULT_EXECUTE_TIMEOUT);
        let wait = tokio::time::timeout(timeout, child.wait());

        let status = match wait.await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(HandlerError::handler(format!("command wait failed: {e}"))),
            Err(_) => {
                let _ = child.start_kill();
                return Err(HandlerError::new(ErrorCode::Timeout, "command timed out"));
            }
        };

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();

        Ok(ExecuteOutcome {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            exit_code: status.code(),
            cwd: cwd.to_string(),
        })
    }

    /// Spawn `command` and stream stdout/stderr chunks as they arrive (spec
    /// §4.9 `executeStreaming`). Returns the `streamId`; events are pushed
    /// onto `events` in arrival order per stream.
    pub async fn execute_streaming(
        self: &Arc<Self>,
        command: &str,
        cwd: &str,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<String, HandlerError> {
        let mut child = shell_command(command)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HandlerError::handler(format!("failed to spawn command: {e}")))?;

        let stream_id = format!("stream-{}", self.next_stream.fetch_add(1, Ordering::SeqCst));
        let cancel = tokio_util::sync::CancellationToken::new();

        self.streams.write().await.insert(
            stream_id.clone(),
            ActiveStream {
                command: command.to_string(),
                cwd: cwd.to_string(),
                cancel: cancel.clone(),
            },
        );

        let _ = events
            .send(StreamEvent::StreamStart {
                stream_id: stream_id.clone(),
                command: command.to_string(),
                cwd: cwd.to_string(),
            })
            .await;

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let engine = self.clone();
        let sid = stream_id.clone();
        tokio::spawn(async move {
            let mut stdout_lines = BufReader::new(stdout).lines();
            let mut stderr_lines = BufReader::new(stderr).lines();
            let mut stdout_done = false;
            let mut stderr_done = false;

            loop {
                if stdout_done && stderr_done {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    line = stdout_lines.next_line(), if !stdout_done => {
                        match line {
                            Ok(Some(data)) => {
                                let _ = events.send(StreamEvent::Output {
                                    stream_id: sid.clone(),
                                    kind: StreamEventKind::Stdout,
                                    data,
                                }).await;
                            }
                            _ => stdout_done = true,
                        }
                    }
                    line = stderr_lines.next_line(), if !stderr_done => {
                        match line {
                            Ok(Some(data)) => {
                                let _ = events.send(StreamEvent::Output {
                                    stream_id: sid.clone(),
                                    kind: StreamEventKind::Stderr,
                                    data,
                                }).await;
                            }
                            _ => stderr_done = true,
                        }
                    }
                }
            }

            let exit_code = if cancel.is_cancelled() {
                let _ = child.start_kill();
                None
            } else {
                child.wait().await.ok().and_then(|s| s.code())
            };

            let _ = events
                .send(StreamEvent::StreamEnd {
                    stream_id: sid.clone(),
                    exit_code,
                })
                .await;

            engine.streams.write().await.remove(&sid);
        });

        Ok(stream_id)
    }

    pub async fn kill_stream(&self, stream_id: &str) -> Result<(), HandlerError> {
        let streams = self.streams.read().await;
        let stream = streams
            .get(stream_id)
            .ok_or_else(|| HandlerError::not_found("stream not found"))?;
        stream.cancel.cancel();
        Ok(())
    }

    pub async fn active_streams(&self) -> Vec<(String, String, String)> {
        self.streams
            .read()
            .await
            .iter()
            .map(|(id, s)| (id.clone(), s.command.clone(), s.cwd.clone()))
            .collect()
    }

    /// Kill every stream owned by a disconnecting connection (spec §4.9:
    /// streams survive only as long as their owning connection).
    pub async fn kill_streams(&self, stream_ids: &std::collections::HashSet<String>) {
        let streams = self.streams.read().await;
        for id in stream_ids {
            if let Some(stream) = streams.get(id) {
                stream.cancel.cancel();
            }
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ExecuteOutcome {
    pub stdout: String,
    pub stderr: String,
    #[serde(rename = "exitCode")]
    pub exit_code: Option<i32>,
    pub cwd: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_captures_stdout_and_exit_code() {
        let engine = TerminalEngine::new();
        let outcome = engine.execute("echo hello", "/tmp", None).await.unwrap();
        assert_eq!(outcome.stdout.trim(), "hello");
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn execute_reports_nonzero_exit() {
        let engine = TerminalEngine::new();
        let outcome = engine.execute("exit 7", "/tmp", None).await.unwrap();
        assert_eq!(outcome.exit_code, Some(7));
    }

    #[tokio::test]
    async fn execute_streaming_emits_start_output_end() {
        let engine = Arc::new(TerminalEngine::new());
        let (tx, mut rx) = mpsc::channel(16);
        engine.execute_streaming("echo a; echo b 1>&2", "/tmp", tx).await.unwrap();

        let mut saw_start = false;
        let mut saw_end = false;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::StreamStart { .. } => saw_start = true,
                StreamEvent::StreamEnd { .. } => {
                    saw_end = true;
                    break;
                }
                StreamEvent::Output { .. } => {}
            }
        }
        assert!(saw_start);
        assert!(saw_end);
    }

    #[tokio::test]
    async fn kill_stream_unknown_id_errors() {
        let engine = TerminalEngine::new();
        let err = engine.kill_stream("nope").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
