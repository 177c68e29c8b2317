//! Workspace rooms: the unit of event fan-out (spec §3 `Connection`, §4.5).
//!
//! Rooms hold only weak references to connections — a membership set of
//! socket ids mapped to outbound senders — matching the arena-allocation
//! note in spec §9: "rooms hold only ids."

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};

use crate::protocol::RelayFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    EditorHost,
    Mobile,
}

pub struct Member {
    pub socket_id: String,
    pub device_id: String,
    pub device_name: Option<String>,
    pub kind: DeviceKind,
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<RelayFrame>,
}

#[derive(Default)]
struct RoomInner {
    members: HashMap<String, Member>,
}

pub struct Room {
    pub workspace_id: String,
    inner: RwLock<RoomInner>,
}

impl Room {
    fn new(workspace_id: String) -> Self {
        Self {
            workspace_id,
            inner: RwLock::new(RoomInner::default()),
        }
    }

    pub async fn join(&self, member: Member) {
        let socket_id = member.socket_id.clone();
        let kind = member.kind;
        let device_name = member.device_name.clone();
        self.inner.write().await.members.insert(socket_id.clone(), member);
        self.broadcast_notification(
            "device:connected",
            &socket_id,
            kind,
            device_name,
            Some(&socket_id),
        )
        .await;
    }

    /// Disconnect always removes membership (spec §3 invariant).
    pub async fn leave(&self, socket_id: &str) {
        let removed = self.inner.write().await.members.remove(socket_id);
        if let Some(member) = removed {
            self.broadcast_notification(
                "device:disconnected",
                socket_id,
                member.kind,
                member.device_name,
                None,
            )
            .await;
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.members.is_empty()
    }

    pub async fn member_count(&self) -> usize {
        self.inner.read().await.members.len()
    }

    async fn broadcast_notification(
        &self,
        event: &str,
        socket_id: &str,
        kind: DeviceKind,
        device_name: Option<String>,
        exclude: Option<&str>,
    ) {
        let data = serde_json::json!({
            "socketId": socket_id,
            "deviceKind": match kind {
                DeviceKind::EditorHost => "editor-host",
                DeviceKind::Mobile => "mobile",
            },
            "deviceName": device_name,
        });
        self.broadcast(RelayFrame::new(event, data), exclude).await;
    }

    /// Forward to every member except `exclude`, per spec §4.5 forwarding rules.
    pub async fn broadcast(&self, frame: RelayFrame, exclude: Option<&str>) {
        let inner = self.inner.read().await;
        for (socket_id, member) in inner.members.iter() {
            if Some(socket_id.as_str()) == exclude {
                continue;
            }
            let _ = member.tx.try_send(frame.clone());
        }
    }

    /// Editor-host-kind peers in this room (spec §4.5: `response`/`event`
    /// originate from editor-host connections; commands are routed to them).
    pub async fn editor_host_count(&self) -> usize {
        self.inner
            .read()
            .await
            .members
            .values()
            .filter(|m| m.kind == DeviceKind::EditorHost)
            .count()
    }
}

impl Member {
    pub fn new(
        socket_id: String,
        device_id: String,
        device_name: Option<String>,
        kind: DeviceKind,
        tx: mpsc::Sender<RelayFrame>,
    ) -> Self {
        Self {
            socket_id,
            device_id,
            device_name,
            kind,
            connected_at: Utc::now(),
            tx,
        }
    }
}

/// Rooms keyed by workspace id (spec §3 glossary: "Workspace room").
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn room(&self, workspace_id: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.read().await.get(workspace_id) {
            return room.clone();
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(workspace_id.to_string())
            .or_insert_with(|| Arc::new(Room::new(workspace_id.to_string())))
            .clone()
    }

    /// Drop rooms with no members, so a long-lived process doesn't accumulate
    /// empty entries for workspaces nobody has reconnected to.
    pub async fn prune_empty(&self) {
        let mut rooms = self.rooms.write().await;
        let mut drained = Vec::new();
        for (id, room) in rooms.iter() {
            if room.is_empty().await {
                drained.push(id.clone());
            }
        }
        for id in drained {
            rooms.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_and_leave_updates_membership() {
        let registry = RoomRegistry::new();
        let room = registry.room("ws-1").await;
        let (tx, _rx) = mpsc::channel(8);
        room.join(Member::new(
            "sock-1".into(),
            "dev-1".into(),
            Some("phone".into()),
            DeviceKind::Mobile,
            tx,
        ))
        .await;
        assert_eq!(room.member_count().await, 1);
        room.leave("sock-1").await;
        assert_eq!(room.member_count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_excludes_sender() {
        let registry = RoomRegistry::new();
        let room = registry.room("ws-1").await;
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        room.join(Member::new(
            "sock-1".into(),
            "dev-1".into(),
            None,
            DeviceKind::Mobile,
            tx1,
        ))
        .await;
        room.join(Member::new(
            "sock-2".into(),
            "dev-2".into(),
            None,
            DeviceKind::EditorHost,
            tx2,
        ))
        .await;
        // Drain the device:connected notifications from setup.
        while rx1.try_recv().is_ok() {}
        while rx2.try_recv().is_ok() {}

        room.broadcast(
            RelayFrame::new("event", serde_json::json!({"x": 1})),
            Some("sock-1"),
        )
        .await;
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }
}
