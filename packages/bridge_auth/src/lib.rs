//! Pairing, device registry, and bearer-token primitives shared by the
//! editor-host and the optional durable relay.

pub mod device;
pub mod error;
pub mod rate_limit;
pub mod secret;
pub mod session;
pub mod token;

pub use device::{DeviceRegistry, RegisteredDevice};
pub use error::AuthError;
pub use rate_limit::RateLimiter;
pub use session::{GeneratedPair, InMemoryPairingStore, PairingSession, SessionStatus};
pub use token::{AccessClaims, BearerCredential, RefreshClaims, TokenKind, TokenService};
