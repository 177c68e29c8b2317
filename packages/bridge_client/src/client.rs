//! The mobile-side multi-transport client (spec §4.7): one `send` surface
//! and a demultiplexed event stream regardless of which of the three wire
//! paths is actually carrying bytes. Transport selection and reconnect
//! policy are grounded on `tunnel.rs`'s `watch`-based state machine and
//! `interconnect/manager.rs`'s exponential-backoff reconnect loop, scaled
//! down from "a whole process managing N remote tunnels" to "one client
//! managing one active transport".

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use bridge_relay::protocol::{Category, Envelope};

use crate::error::ClientError;
use crate::inflight::InflightTable;
use crate::transport::{self, TransportHandle, relay::RelayAuth};

const LOCAL_CONNECT_DEADLINE: Duration = Duration::from_secs(5);
const COMMAND_DEADLINE: Duration = Duration::from_secs(30);
const RECONNECT_BASE: Duration = Duration::from_secs(2);
const RECONNECT_MAX_ATTEMPTS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Error { message: String },
}

/// Transport choice (spec §4.7 step 1: "If preference is explicit ... use
/// it directly").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPreference {
    Auto,
    Local,
    Relay,
}

/// URLs for the two wire paths. Either may be absent (e.g. no tunnel/relay
/// configured yet, or the client never learned a LAN address).
pub struct Endpoints {
    pub local_url: Option<String>,
    pub relay_url: Option<String>,
}

pub struct DeviceInfo {
    pub token: String,
    pub workspace_id: String,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

pub struct BridgeClient {
    endpoints: Endpoints,
    device: DeviceInfo,
    preference: TransportPreference,
    state_tx: watch::Sender<ClientState>,
    state_rx: watch::Receiver<ClientState>,
    inflight: InflightTable,
    event_tx: broadcast::Sender<Envelope>,
    active: Mutex<Option<TransportHandle>>,
    manual_disconnect: AtomicBool,
}

impl BridgeClient {
    pub fn new(endpoints: Endpoints, device: DeviceInfo, preference: TransportPreference) -> Arc<Self> {
        let (state_tx, state_rx) = watch::channel(ClientState::Disconnected);
        let (event_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            endpoints,
            device,
            preference,
            state_tx,
            state_rx,
            inflight: InflightTable::new(),
            event_tx,
            active: Mutex::new(None),
            manual_disconnect: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> ClientState {
        self.state_rx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.state_rx.subscribe()
    }

    /// The raw, un-demultiplexed event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.event_tx.subscribe()
    }

    /// Demultiplex the generic event stream into handlers for one event
    /// type (spec §4.7 `on(eventType, handler)`).
    pub fn on<F>(&self, event_type: impl Into<String>, mut handler: F)
    where
        F: FnMut(Value) + Send + 'static,
    {
        let event_type = event_type.into();
        let mut rx = self.event_tx.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(Envelope::Event { event_type: et, data, .. }) if et == event_type => handler(data),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        self.manual_disconnect.store(false, Ordering::SeqCst);
        let _ = self.state_tx.send(ClientState::Connecting);
        match self.dial().await {
            Ok((handle, is_local)) => {
                self.adopt(handle, is_local).await;
                Ok(())
            }
            Err(e) => {
                let _ = self.state_tx.send(ClientState::Error { message: e.to_string() });
                Err(e)
            }
        }
    }

    pub async fn disconnect(&self) {
        self.manual_disconnect.store(true, Ordering::SeqCst);
        if let Some(handle) = self.active.lock().await.take() {
            handle.closed.cancel();
        }
        self.inflight.reject_all().await;
        let _ = self.state_tx.send(ClientState::Disconnected);
    }

    /// Submit one command and await its response (or error), enforcing the
    /// 30 s sender-side deadline (spec §5 "Cancellation and timeouts").
    pub async fn send(&self, category: Category, action: impl Into<String>, payload: Value) -> Result<Value, ClientError> {
        let outbound = {
            let active = self.active.lock().await;
            active.as_ref().ok_or(ClientError::ConnectionClosed)?.outbound.clone()
        };

        let id = Uuid::new_v4().to_string();
        let envelope = Envelope::Command {
            id: id.clone(),
            timestamp: Utc::now().timestamp_millis(),
            category,
            action: action.into(),
            payload,
        };

        let rx = self.inflight.register(id.clone()).await;
        outbound.send(envelope).await.map_err(|_| ClientError::ConnectionClosed)?;

        match timeout(COMMAND_DEADLINE, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.inflight.complete(&id, Err(ClientError::CommandTimeout)).await;
                Err(ClientError::CommandTimeout)
            }
        }
    }

    async fn dial(&self) -> Result<(TransportHandle, bool), ClientError> {
        match self.preference {
            TransportPreference::Local => self.dial_local().await.map(|h| (h, true)),
            TransportPreference::Relay => self.dial_relay().await.map(|h| (h, false)),
            TransportPreference::Auto => match self.dial_local().await {
                Ok(h) => Ok((h, true)),
                Err(e) => {
                    warn!(error = %e, "local transport unavailable, falling back to relay");
                    self.dial_relay().await.map(|h| (h, false))
                }
            },
        }
    }

    async fn dial_local(&self) -> Result<TransportHandle, ClientError> {
        let base = self
            .endpoints
            .local_url
            .as_deref()
            .ok_or_else(|| ClientError::NoTransport("no local url configured".into()))?;
        let mut url = format!("{base}?token={}", self.device.token);
        if let Some(name) = &self.device.device_name {
            url.push_str(&format!("&deviceName={name}"));
        }
        transport::local::connect(&url, LOCAL_CONNECT_DEADLINE, self.inflight.clone(), self.event_tx.clone()).await
    }

    async fn dial_relay(&self) -> Result<TransportHandle, ClientError> {
        let url = self
            .endpoints
            .relay_url
            .as_deref()
            .ok_or_else(|| ClientError::NoTransport("no relay url configured".into()))?;
        let auth = RelayAuth {
            token: self.device.token.clone(),
            workspace_id: self.device.workspace_id.clone(),
            device_id: self.device.device_id.clone(),
            device_name: self.device.device_name.clone(),
        };
        transport::relay::connect(url, auth, LOCAL_CONNECT_DEADLINE, self.inflight.clone(), self.event_tx.clone()).await
    }

    async fn adopt(self: &Arc<Self>, handle: TransportHandle, is_local: bool) {
        let closed = handle.closed.clone();
        *self.active.lock().await = Some(handle);
        let _ = self.state_tx.send(ClientState::Connected);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            closed.cancelled().await;
            this.inflight.reject_all().await;
            *this.active.lock().await = None;

            if this.manual_disconnect.load(Ordering::SeqCst) {
                return;
            }
            let _ = this.state_tx.send(ClientState::Disconnected);
            if is_local {
                this.reconnect_with_backoff().await;
            }
        });
    }

    async fn reconnect_with_backoff(self: Arc<Self>) {
        let mut attempt = 0u32;
        loop {
            if self.manual_disconnect.load(Ordering::SeqCst) {
                return;
            }
            if attempt >= RECONNECT_MAX_ATTEMPTS {
                let _ = self.state_tx.send(ClientState::Error {
                    message: format!("exhausted {RECONNECT_MAX_ATTEMPTS} reconnect attempts"),
                });
                return;
            }

            let delay = RECONNECT_BASE * 2u32.pow(attempt.min(6));
            tokio::time::sleep(delay).await;
            attempt += 1;

            info!(attempt, "reconnecting");
            match self.dial().await {
                Ok((handle, is_local)) => {
                    self.adopt(handle, is_local).await;
                    return;
                }
                Err(e) => warn!(attempt, error = %e, "reconnect attempt failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_without_connection_is_connection_closed() {
        let client = BridgeClient::new(
            Endpoints { local_url: None, relay_url: None },
            DeviceInfo { token: "t".into(), workspace_id: "w".into(), device_id: None, device_name: None },
            TransportPreference::Auto,
        );
        let err = client.send(Category::Workspace, "getInfo", Value::Null).await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed));
    }

    #[tokio::test]
    async fn connect_with_no_endpoints_reports_no_transport() {
        let client = BridgeClient::new(
            Endpoints { local_url: None, relay_url: None },
            DeviceInfo { token: "t".into(), workspace_id: "w".into(), device_id: None, device_name: None },
            TransportPreference::Auto,
        );
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::NoTransport(_)));
        assert!(matches!(client.state(), ClientState::Error { .. }));
    }
}
