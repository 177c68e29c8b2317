//! Error types for pairing, device, and token operations.

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("pairing session not found")]
    SessionNotFound,

    #[error("pairing session expired")]
    SessionExpired,

    #[error("pairing session already redeemed")]
    AlreadyPaired,

    #[error("invalid PIN")]
    InvalidPin,

    #[error("invalid or malformed token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("no token presented")]
    MissingToken,

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

impl AuthError {
    /// Maps to the wire error taxonomy code from the protocol spec (§7).
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::AlreadyPaired => "ALREADY_PAIRED",
            Self::InvalidPin => "INVALID_PIN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::MissingToken => "MISSING_TOKEN",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RateLimited { .. } => "RATE_LIMITED",
        }
    }
}
