//! Wire-facing error taxonomy (spec §7), distinct from [`bridge_auth::AuthError`].

use serde::Serialize;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    TokenExpired,
    InvalidToken,
    MissingToken,
    InvalidPin,
    SessionNotFound,
    SessionExpired,
    AlreadyPaired,
    InvalidRequest,
    UnknownCommand,
    HandlerError,
    NotFound,
    Forbidden,
    RateLimited,
    Timeout,
    ConnectionClosed,
    AiUnavailable,
    TerminalNotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::MissingToken => "MISSING_TOKEN",
            Self::InvalidPin => "INVALID_PIN",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::AlreadyPaired => "ALREADY_PAIRED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::UnknownCommand => "UNKNOWN_COMMAND",
            Self::HandlerError => "HANDLER_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::ConnectionClosed => "CONNECTION_CLOSED",
            Self::AiUnavailable => "AI_UNAVAILABLE",
            Self::TerminalNotFound => "TERMINAL_NOT_FOUND",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Error surfaced by a command handler. Dispatcher-caught panics or
/// unexpected failures are wrapped as `HANDLER_ERROR`, never promoted to
/// `INTERNAL_ERROR` (spec §7 propagation policy — that code is reserved for
/// the host's own invariant violations, not handler failures).
#[derive(Debug, Clone)]
pub struct HandlerError {
    pub code: ErrorCode,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::HandlerError, message)
    }
}

impl From<AuthFacingError> for HandlerError {
    fn from(e: AuthFacingError) -> Self {
        Self::new(e.code, e.message)
    }
}

/// Bridges [`bridge_auth::AuthError`] into the wire taxonomy at handler
/// boundaries that touch credentials (e.g. the local WS handshake).
pub struct AuthFacingError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<bridge_auth::AuthError> for AuthFacingError {
    fn from(e: bridge_auth::AuthError) -> Self {
        let code = match &e {
            bridge_auth::AuthError::SessionNotFound => ErrorCode::SessionNotFound,
            bridge_auth::AuthError::SessionExpired => ErrorCode::SessionExpired,
            bridge_auth::AuthError::AlreadyPaired => ErrorCode::AlreadyPaired,
            bridge_auth::AuthError::InvalidPin => ErrorCode::InvalidPin,
            bridge_auth::AuthError::InvalidToken => ErrorCode::InvalidToken,
            bridge_auth::AuthError::TokenExpired => ErrorCode::TokenExpired,
            bridge_auth::AuthError::MissingToken => ErrorCode::MissingToken,
            bridge_auth::AuthError::Unauthorized => ErrorCode::Unauthorized,
            bridge_auth::AuthError::RateLimited { .. } => ErrorCode::RateLimited,
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}
