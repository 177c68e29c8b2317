//! Push-notification fan-out sink (spec §1: "treated as a sink"; §6 relay
//! HTTP `notifications` endpoints).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub workspace_id: String,
    pub device_id: String,
    pub title: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Sink for the external push-notification vendor. The vendor API itself is
/// out of scope (spec §1); this trait is the seam a real integration plugs
/// into.
#[async_trait::async_trait]
pub trait PushSink: Send + Sync {
    async fn send(&self, device_token: &str, title: &str, body: &str) -> anyhow::Result<()>;
}

/// No-op sink used when no vendor is configured; still records history so
/// `GET /api/v1/notifications/history/:workspaceId` has something to return.
pub struct NullSink;

#[async_trait::async_trait]
impl PushSink for NullSink {
    async fn send(&self, _device_token: &str, _title: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct NotificationService {
    device_tokens: RwLock<HashMap<String, String>>,
    history: RwLock<HashMap<String, Vec<NotificationRecord>>>,
}

impl NotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_token(&self, device_id: &str, token: &str) {
        self.device_tokens
            .write()
            .await
            .insert(device_id.to_string(), token.to_string());
    }

    pub async fn remove_token(&self, device_id: &str) {
        self.device_tokens.write().await.remove(device_id);
    }

    pub async fn send(
        &self,
        sink: &dyn PushSink,
        workspace_id: &str,
        device_id: &str,
        title: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        let token = {
            let tokens = self.device_tokens.read().await;
            tokens.get(device_id).cloned()
        };
        if let Some(token) = token {
            sink.send(&token, title, body).await?;
        }
        self.history
            .write()
            .await
            .entry(workspace_id.to_string())
            .or_default()
            .push(NotificationRecord {
                workspace_id: workspace_id.to_string(),
                device_id: device_id.to_string(),
                title: title.to_string(),
                body: body.to_string(),
                sent_at: Utc::now(),
            });
        Ok(())
    }

    pub async fn history(&self, workspace_id: &str) -> Vec<NotificationRecord> {
        self.history
            .read()
            .await
            .get(workspace_id)
            .cloned()
            .unwrap_or_default()
    }
}

pub type SharedNotificationService = Arc<NotificationService>;
