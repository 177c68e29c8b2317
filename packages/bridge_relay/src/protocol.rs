//! Wire envelope shared by the local WebSocket server and the embedded/durable
//! room relay (spec §4.3, §6).

use serde::{Deserialize, Serialize};

/// `category` enum carried on `command` envelopes (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    File,
    Editor,
    Terminal,
    Ai,
    Workspace,
    Diagnostics,
    Git,
    System,
}

/// One envelope shape for all four message kinds (spec §4.3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Command {
        id: String,
        timestamp: i64,
        category: Category,
        action: String,
        payload: serde_json::Value,
    },
    Response {
        id: String,
        timestamp: i64,
        #[serde(rename = "commandId")]
        command_id: String,
        data: serde_json::Value,
    },
    Error {
        id: String,
        timestamp: i64,
        #[serde(rename = "commandId")]
        command_id: Option<String>,
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
    Event {
        id: String,
        timestamp: i64,
        #[serde(rename = "eventType")]
        event_type: String,
        data: serde_json::Value,
    },
}

impl Envelope {
    pub fn id(&self) -> &str {
        match self {
            Envelope::Command { id, .. }
            | Envelope::Response { id, .. }
            | Envelope::Error { id, .. }
            | Envelope::Event { id, .. } => id,
        }
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("envelope serialization never fails")
    }

    /// Decode a JSON text frame. Malformed envelopes are reported to the
    /// caller rather than tearing down the connection (spec §4.3).
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Device kind carried in the relay handshake auth blob (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Vscode,
    Mobile,
}

/// Handshake auth blob sent as the first frame on a relay connection
/// (spec §4.5, §6 "Room relay handshake").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeAuth {
    pub token: String,
    #[serde(rename = "workspaceId")]
    pub workspace_id: String,
    #[serde(default, rename = "deviceId")]
    pub device_id: Option<String>,
    #[serde(default, rename = "deviceName")]
    pub device_name: Option<String>,
    #[serde(rename = "deviceType")]
    pub device_type: DeviceType,
}

/// Forwarded frame carrying an opaque event name alongside the envelope it
/// wraps, mirroring the named-event framing of a Socket.IO-style transport
/// (spec §4.7): `command`, `response`, `event`, `message`, `ping`, `pong`,
/// `connected`, `device:connected`, `device:disconnected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayFrame {
    pub event: String,
    pub data: serde_json::Value,
}

impl RelayFrame {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("relay frame serialization never fails")
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::Command {
            id: "c1".into(),
            timestamp: 1234,
            category: Category::File,
            action: "list".into(),
            payload: serde_json::json!({"path": ""}),
        };
        let encoded = env.encode();
        let decoded = Envelope::decode(&encoded).unwrap();
        assert_eq!(decoded.id(), "c1");
    }

    #[test]
    fn malformed_envelope_is_an_error_not_a_panic() {
        assert!(Envelope::decode("not json").is_err());
        assert!(Envelope::decode(r#"{"type":"bogus"}"#).is_err());
    }
}
