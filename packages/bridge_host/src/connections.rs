//! Arena-style connection registry (spec §9 "Cyclic / shared ownership").
//!
//! Connections, streams, and inflight bookkeeping form a graph; rather than
//! back-references, everything but the registry itself holds only ids.
//! Teardown is driven by the single authority that owns this registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};

use bridge_relay::protocol::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    EditorHost,
    Mobile,
}

pub struct Connection {
    pub socket_id: String,
    pub device_id: String,
    pub device_kind: DeviceKind,
    pub workspace_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub outbound: mpsc::Sender<Envelope>,
    /// Stream ids this connection owns; killed on disconnect (spec §3 Stream invariant).
    pub streams: HashSet<String>,
}

impl Connection {
    pub fn room(&self) -> String {
        format!("workspace:{}", self.workspace_id)
    }
}

#[derive(Default, Clone)]
pub struct Connections {
    inner: Arc<RwLock<HashMap<String, Connection>>>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, conn: Connection) {
        self.inner.write().await.insert(conn.socket_id.clone(), conn);
    }

    pub async fn touch(&self, socket_id: &str) {
        if let Some(c) = self.inner.write().await.get_mut(socket_id) {
            c.last_activity = Utc::now();
        }
    }

    pub async fn add_stream(&self, socket_id: &str, stream_id: &str) {
        if let Some(c) = self.inner.write().await.get_mut(socket_id) {
            c.streams.insert(stream_id.to_string());
        }
    }

    pub async fn remove_stream(&self, socket_id: &str, stream_id: &str) {
        if let Some(c) = self.inner.write().await.get_mut(socket_id) {
            c.streams.remove(stream_id);
        }
    }

    /// Remove a connection, returning the set of stream ids it owned so the
    /// caller can kill them.
    pub async fn remove(&self, socket_id: &str) -> Option<HashSet<String>> {
        self.inner
            .write()
            .await
            .remove(socket_id)
            .map(|c| c.streams)
    }

    pub async fn sender(&self, socket_id: &str) -> Option<mpsc::Sender<Envelope>> {
        self.inner.read().await.get(socket_id).map(|c| c.outbound.clone())
    }

    pub async fn device_id(&self, socket_id: &str) -> Option<String> {
        self.inner.read().await.get(socket_id).map(|c| c.device_id.clone())
    }

    pub async fn workspace_id(&self, socket_id: &str) -> Option<String> {
        self.inner.read().await.get(socket_id).map(|c| c.workspace_id.clone())
    }

    /// Fan out `envelope` to every connection in `workspace_id`'s room
    /// (spec §4.10 diagnostics broadcasts, and any other workspace-wide event).
    pub async fn broadcast(&self, workspace_id: &str, envelope: Envelope) {
        for conn in self.inner.read().await.values() {
            if conn.workspace_id == workspace_id {
                let _ = conn.outbound.send(envelope.clone()).await;
            }
        }
    }
}
