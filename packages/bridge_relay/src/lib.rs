//! Shared room-relay wire protocol, the in-process room relay embedded in
//! the editor host, and the optional standalone durable relay deployment.

pub mod http_api;
pub mod notifications;
pub mod protocol;
pub mod room;
pub mod server;

#[cfg(feature = "durable")]
pub mod durable;

pub use protocol::{Category, DeviceType, Envelope, HandshakeAuth, RelayFrame};
pub use room::{Room, RoomRegistry};
pub use server::{AllowAll, RelayState, TokenAuthenticator};
