//! The two wire transports a [`crate::client::BridgeClient`] can ride:
//! `local` (a direct, unwrapped WebSocket to the editor host) and `relay`
//! (a named-event frame on top of the embedded/durable room relay).
//!
//! Both produce the same [`TransportHandle`] shape so `client.rs` drives
//! either one identically — it only ever sees "give me an outbound sender
//! and tell me when you've died".

pub mod local;
pub mod relay;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use bridge_relay::protocol::Envelope;

/// A live transport connection. `closed` is cancelled the moment the
/// read loop ends, whether from a clean close, a protocol error, or the
/// peer going away — `client.rs` doesn't need to know which.
pub struct TransportHandle {
    pub outbound: mpsc::Sender<Envelope>,
    pub closed: CancellationToken,
}
