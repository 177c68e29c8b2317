//! Mobile-side multi-transport client (spec §4.7): a single `send(category,
//! action, payload)` surface and a demultiplexed event stream, regardless
//! of whether the active wire path is the direct local WebSocket or the
//! room relay (LAN or tunnel-fronted).

pub mod client;
pub mod error;
pub mod inflight;
pub mod transport;

pub use bridge_relay::protocol::{Category, Envelope};
pub use client::{BridgeClient, ClientState, DeviceInfo, Endpoints, TransportPreference};
pub use error::ClientError;
