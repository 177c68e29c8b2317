//! Tunnel supervisor (spec §4.6): owns a public ingress URL bound to the
//! embedded relay's listening port, reconnecting on loss with exponential
//! backoff. Grounded on `interconnect/manager.rs`'s `TunnelState` enum and
//! its `1 << attempt.min(6)`-capped reconnect loop, with the smaller cap
//! spec §4.6 asks for (30 s, 3 attempts) in place of the teacher's 60 s
//! uncapped retries.
//!
//! The actual tunnel provider (ngrok, cloudflared, or similar) is an
//! external collaborator (spec §1); [`TunnelProvider`] is the seam a real
//! integration plugs into.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelState {
    Disconnected,
    Connecting,
    Connected { url: String },
    Error { message: String },
}

#[async_trait::async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Open a public ingress pointed at `port`, returning the assigned URL.
    async fn open(&self, port: u16) -> anyhow::Result<String>;
}

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(30);

pub struct TunnelSupervisor {
    provider: Arc<dyn TunnelProvider>,
    state_tx: watch::Sender<TunnelState>,
    state_rx: watch::Receiver<TunnelState>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl TunnelSupervisor {
    pub fn new(provider: Arc<dyn TunnelProvider>) -> Self {
        let (state_tx, state_rx) = watch::channel(TunnelState::Disconnected);
        Self {
            provider,
            state_tx,
            state_rx,
            cancel: Mutex::new(None),
        }
    }

    pub fn state(&self) -> TunnelState {
        self.state_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<TunnelState> {
        self.state_rx.subscribe()
    }

    pub async fn connect(self: &Arc<Self>, port: u16) {
        let token = CancellationToken::new();
        *self.cancel.lock().await = Some(token.clone());
        let _ = self.state_tx.send(TunnelState::Connecting);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(port, token).await;
        });
    }

    pub async fn disconnect(&self) {
        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
        let _ = self.state_tx.send(TunnelState::Disconnected);
    }

    async fn run(self: Arc<Self>, port: u16, cancel: CancellationToken) {
        match self.provider.open(port).await {
            Ok(url) => {
                info!(url = %url, "tunnel connected");
                let _ = self.state_tx.send(TunnelState::Connected { url });
            }
            Err(e) => {
                warn!(error = %e, "tunnel open failed, entering reconnect backoff");
                self.reconnect_loop(port, cancel).await;
                return;
            }
        }

        // Connected; nothing else to watch here since the provider trait is
        // fire-and-forget per open() call. A production provider would give
        // back a handle whose drop/close we'd await; absent that, the
        // supervisor simply stays Connected until disconnect() is called.
    }

    async fn reconnect_loop(self: Arc<Self>, port: u16, cancel: CancellationToken) {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return;
            }
            if attempt >= MAX_ATTEMPTS {
                let _ = self.state_tx.send(TunnelState::Error {
                    message: format!("exhausted {MAX_ATTEMPTS} reconnect attempts"),
                });
                return;
            }

            let delay = (BASE_DELAY * (1u32 << attempt.min(6))).min(MAX_DELAY);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return,
            }

            attempt += 1;
            info!(attempt, "tunnel reconnect attempt");
            match self.provider.open(port).await {
                Ok(url) => {
                    info!(url = %url, "tunnel reconnected");
                    let _ = self.state_tx.send(TunnelState::Connected { url });
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "tunnel reconnect attempt failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        fail_times: AtomicU32,
    }

    #[async_trait::async_trait]
    impl TunnelProvider for FlakyProvider {
        async fn open(&self, _port: u16) -> anyhow::Result<String> {
            if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
                anyhow::bail!("simulated failure");
            }
            Ok("https://example.test".to_string())
        }
    }

    #[tokio::test]
    async fn connects_after_transient_failures() {
        let provider = Arc::new(FlakyProvider {
            fail_times: AtomicU32::new(1),
        });
        let supervisor = Arc::new(TunnelSupervisor::new(provider));
        supervisor.connect(3004).await;

        let mut rx = supervisor.watch();
        loop {
            rx.changed().await.unwrap();
            match &*rx.borrow() {
                TunnelState::Connected { url } => {
                    assert_eq!(url, "https://example.test");
                    break;
                }
                TunnelState::Error { .. } => panic!("should not give up within attempt budget"),
                _ => continue,
            }
        }
    }
}
