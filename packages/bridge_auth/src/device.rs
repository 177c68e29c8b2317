//! Registered device records (spec §3 `RegisteredDevice`).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub device_id: String,
    pub display_name: String,
    pub platform: String,
    pub app_version: String,
    pub workspace_id: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Workspace-scoped device registry. Device ids are unique per workspace;
/// display names need not be (spec §3 invariant).
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<String, RegisteredDevice>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        workspace_id: &str,
        display_name: &str,
        platform: &str,
        app_version: &str,
    ) -> RegisteredDevice {
        let now = Utc::now();
        let device = RegisteredDevice {
            device_id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            platform: platform.to_string(),
            app_version: app_version.to_string(),
            workspace_id: workspace_id.to_string(),
            created_at: now,
            last_seen_at: now,
        };
        self.devices
            .write()
            .await
            .insert(device.device_id.clone(), device.clone());
        device
    }

    pub async fn touch(&self, device_id: &str) {
        if let Some(d) = self.devices.write().await.get_mut(device_id) {
            d.last_seen_at = Utc::now();
        }
    }

    pub async fn get(&self, device_id: &str) -> Option<RegisteredDevice> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn list(&self, workspace_id: &str) -> Vec<RegisteredDevice> {
        self.devices
            .read()
            .await
            .values()
            .filter(|d| d.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    /// Removed only by explicit admin action (spec §3 invariant).
    pub async fn remove(&self, device_id: &str) -> Option<RegisteredDevice> {
        self.devices.write().await.remove(device_id)
    }
}
