//! Bearer access/refresh tokens: HS256-signed compact envelopes carrying a
//! typed payload plus a unique id (`jti`), with an in-memory revocation index
//! for refresh tokens.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub jti: String,
    pub device_id: String,
    pub workspace_id: String,
    pub workspace_name: String,
    pub kind: TokenKind,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub jti: String,
    pub device_id: String,
    pub workspace_id: String,
    pub kind: TokenKind,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BearerCredential {
    pub access: String,
    pub refresh: String,
}

/// Issues and verifies access/refresh tokens. Secrets are random at startup
/// unless configured, matching spec §4.1.
pub struct TokenService {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl: ChronoDuration,
    refresh_ttl: ChronoDuration,
    revoked_refresh: Arc<RwLock<HashSet<String>>>,
}

fn random_secret() -> Vec<u8> {
    let mut bytes = vec![0u8; 32];
    rand::rng().fill(bytes.as_mut_slice());
    bytes
}

impl TokenService {
    pub fn new(
        access_secret: Option<Vec<u8>>,
        refresh_secret: Option<Vec<u8>>,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> Self {
        Self {
            access_secret: access_secret.unwrap_or_else(random_secret),
            refresh_secret: refresh_secret.unwrap_or_else(random_secret),
            access_ttl: ChronoDuration::seconds(access_ttl_secs),
            refresh_ttl: ChronoDuration::seconds(refresh_ttl_secs),
            revoked_refresh: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Issue a fresh `{access, refresh}` pair for a paired device.
    pub async fn issue_tokens(
        &self,
        device_id: &str,
        workspace_id: &str,
        workspace_name: &str,
    ) -> BearerCredential {
        let now = Utc::now();
        let access_claims = AccessClaims {
            jti: Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            workspace_id: workspace_id.to_string(),
            workspace_name: workspace_name.to_string(),
            kind: TokenKind::Access,
            iat: now.timestamp() as usize,
            exp: (now + self.access_ttl).timestamp() as usize,
        };
        let refresh_claims = RefreshClaims {
            jti: Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            workspace_id: workspace_id.to_string(),
            kind: TokenKind::Refresh,
            iat: now.timestamp() as usize,
            exp: (now + self.refresh_ttl).timestamp() as usize,
        };

        let access = encode(
            &Header::new(Algorithm::HS256),
            &access_claims,
            &EncodingKey::from_secret(&self.access_secret),
        )
        .expect("encoding access claims never fails");
        let refresh = encode(
            &Header::new(Algorithm::HS256),
            &refresh_claims,
            &EncodingKey::from_secret(&self.refresh_secret),
        )
        .expect("encoding refresh claims never fails");

        BearerCredential { access, refresh }
    }

    fn validation() -> Validation {
        let mut v = Validation::new(Algorithm::HS256);
        v.algorithms = vec![Algorithm::HS256];
        v.validate_exp = true;
        v
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(&self.access_secret),
            &Self::validation(),
        )
        .map_err(|e| map_jwt_error(&e))?;
        if data.claims.kind != TokenKind::Access {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }

    pub async fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let data = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(&self.refresh_secret),
            &Self::validation(),
        )
        .map_err(|e| map_jwt_error(&e))?;
        if data.claims.kind != TokenKind::Refresh {
            return Err(AuthError::InvalidToken);
        }
        if self.revoked_refresh.read().await.contains(&data.claims.jti) {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }

    pub async fn revoke_refresh(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.verify_refresh(token).await?;
        self.revoked_refresh.write().await.insert(claims.jti);
        Ok(())
    }

    /// Verify and revoke `refresh`, issuing a new pair for the same device.
    pub async fn rotate(&self, refresh: &str) -> Result<BearerCredential, AuthError> {
        let claims = self.verify_refresh(refresh).await?;
        self.revoked_refresh.write().await.insert(claims.jti.clone());
        // workspace_name isn't carried on refresh claims (spec §3); callers that
        // need it look it up from the device registry before calling issue_tokens
        // directly. `rotate` is for the common case where it's not needed.
        let now = Utc::now();
        let access_claims = AccessClaims {
            jti: Uuid::new_v4().to_string(),
            device_id: claims.device_id.clone(),
            workspace_id: claims.workspace_id.clone(),
            workspace_name: String::new(),
            kind: TokenKind::Access,
            iat: now.timestamp() as usize,
            exp: (now + self.access_ttl).timestamp() as usize,
        };
        let new_refresh_claims = RefreshClaims {
            jti: Uuid::new_v4().to_string(),
            device_id: claims.device_id,
            workspace_id: claims.workspace_id,
            kind: TokenKind::Refresh,
            iat: now.timestamp() as usize,
            exp: (now + self.refresh_ttl).timestamp() as usize,
        };
        let access = encode(
            &Header::new(Algorithm::HS256),
            &access_claims,
            &EncodingKey::from_secret(&self.access_secret),
        )
        .expect("encoding access claims never fails");
        let refresh = encode(
            &Header::new(Algorithm::HS256),
            &new_refresh_claims,
            &EncodingKey::from_secret(&self.refresh_secret),
        )
        .expect("encoding refresh claims never fails");
        Ok(BearerCredential { access, refresh })
    }
}

fn map_jwt_error(e: &jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issue_and_verify_access() {
        let svc = TokenService::new(None, None, 3600, 86400);
        let creds = svc.issue_tokens("dev-1", "ws-1", "demo").await;
        let claims = svc.verify_access(&creds.access).unwrap();
        assert_eq!(claims.device_id, "dev-1");
        assert_eq!(claims.workspace_id, "ws-1");
    }

    #[tokio::test]
    async fn refresh_revocation_invalidates_immediately() {
        let svc = TokenService::new(None, None, 3600, 86400);
        let creds = svc.issue_tokens("dev-1", "ws-1", "demo").await;
        svc.revoke_refresh(&creds.refresh).await.unwrap();
        let err = svc.verify_refresh(&creds.refresh).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn access_token_rejected_by_refresh_verification() {
        let svc = TokenService::new(None, None, 3600, 86400);
        let creds = svc.issue_tokens("dev-1", "ws-1", "demo").await;
        assert!(svc.verify_refresh(&creds.access).await.is_err());
    }
}
