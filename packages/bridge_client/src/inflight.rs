//! Inflight command table shared by both transports (spec §4.7: "Both
//! transports share the **same** InflightCommand table keyed by command
//! id"). Grounded on the pending-request bookkeeping pattern used for
//! broker-routed RPCs elsewhere in the corpus, simplified down to the single
//! requester/single responder shape a mobile client needs — no leader
//! election, just one slot per command id.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::error::ClientError;

type Slot = oneshot::Sender<Result<Value, ClientError>>;

#[derive(Default, Clone)]
pub struct InflightTable {
    inner: Arc<Mutex<HashMap<String, Slot>>>,
}

impl InflightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command id, returning the receiver the caller awaits.
    pub async fn register(&self, command_id: String) -> oneshot::Receiver<Result<Value, ClientError>> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(command_id, tx);
        rx
    }

    /// Complete a pending command with a response or error. No-op if the
    /// command id is unknown (already completed, or timed out and dropped).
    pub async fn complete(&self, command_id: &str, result: Result<Value, ClientError>) {
        if let Some(tx) = self.inner.lock().await.remove(command_id) {
            let _ = tx.send(result);
        }
    }

    /// Reject every outstanding command with `connection closed` (spec
    /// §4.7: switching transport mid-session MUST reject all outstanding
    /// inflights rather than ambiguously complete them).
    pub async fn reject_all(&self) {
        for (_, tx) in self.inner.lock().await.drain() {
            let _ = tx.send(Err(ClientError::ConnectionClosed));
        }
    }
}
