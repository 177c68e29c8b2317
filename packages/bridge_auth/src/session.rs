//! Pairing session store: short-lived records indexed by id, PIN, and
//! secret digest (spec §3 `PairingSession`, §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AuthError;
use crate::secret::{generate_pin, generate_secret};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Completed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingSession {
    pub session_id: String,
    pub workspace_id: String,
    pub workspace_name: String,
    pub pin: String,
    /// SHA-256 hex digest of the pairing secret. The secret itself is never stored.
    pub secret_digest: String,
    pub local_address: Option<String>,
    pub relay_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl PairingSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Result of a successful `generatePair` call (spec §4.1).
pub struct GeneratedPair {
    pub session_id: String,
    pub pin: String,
    pub secret: String,
    pub digest: String,
    pub expires_at: DateTime<Utc>,
}

/// Grace period a completed session is retained for idempotent re-reads
/// (spec §3 lifecycle: "deleted ... with a 60-second grace for idempotency").
const COMPLETION_GRACE: ChronoDuration = ChronoDuration::seconds(60);

struct StoreInner {
    by_id: HashMap<String, PairingSession>,
    by_pin: HashMap<String, String>,
    by_digest: HashMap<String, String>,
    /// When a completed/expired session should be fully evicted.
    evict_at: HashMap<String, DateTime<Utc>>,
}

/// In-process pairing session store. §4.2 also describes a durable
/// key-value backend for the optional external relay; that backend
/// implements the same `PairingStore` contract against a TTL'd table
/// instead of this in-memory map.
pub struct InMemoryPairingStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl Default for InMemoryPairingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPairingStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                by_id: HashMap::new(),
                by_pin: HashMap::new(),
                by_digest: HashMap::new(),
                evict_at: HashMap::new(),
            })),
        }
    }

    /// Create a new pairing session for `workspace`, expiring after `ttl_secs`.
    pub async fn generate_pair(
        &self,
        workspace_id: &str,
        workspace_name: &str,
        ttl_secs: i64,
        local_address: Option<String>,
        relay_url: Option<String>,
    ) -> GeneratedPair {
        let (secret, digest) = generate_secret();
        let now = Utc::now();
        let expires_at = now + ChronoDuration::seconds(ttl_secs);

        let mut inner = self.inner.write().await;
        // PIN must be unique among currently-pending sessions (spec §3 invariant).
        let pin = loop {
            let candidate = generate_pin();
            if !inner.by_pin.contains_key(&candidate) {
                break candidate;
            }
        };

        let session_id = Uuid::new_v4().to_string();
        let session = PairingSession {
            session_id: session_id.clone(),
            workspace_id: workspace_id.to_string(),
            workspace_name: workspace_name.to_string(),
            pin: pin.clone(),
            secret_digest: digest.clone(),
            local_address,
            relay_url,
            created_at: now,
            expires_at,
            status: SessionStatus::Pending,
        };

        inner.by_pin.insert(pin.clone(), session_id.clone());
        inner.by_digest.insert(digest.clone(), session_id.clone());
        inner.by_id.insert(session_id.clone(), session);

        GeneratedPair {
            session_id,
            pin,
            secret,
            digest,
            expires_at,
        }
    }

    async fn lookup_by_key(&self, key: &str, by_pin: bool) -> Result<PairingSession, AuthError> {
        let inner = self.inner.read().await;
        let session_id = if by_pin {
            inner.by_pin.get(key)
        } else {
            inner.by_digest.get(key)
        }
        .ok_or(AuthError::SessionNotFound)?;
        let session = inner
            .by_id
            .get(session_id)
            .ok_or(AuthError::SessionNotFound)?
            .clone();
        self.classify(session)
    }

    fn classify(&self, session: PairingSession) -> Result<PairingSession, AuthError> {
        match session.status {
            SessionStatus::Completed => Err(AuthError::AlreadyPaired),
            SessionStatus::Expired => Err(AuthError::SessionExpired),
            SessionStatus::Pending if session.is_expired(Utc::now()) => {
                Err(AuthError::SessionExpired)
            }
            SessionStatus::Pending => Ok(session),
        }
    }

    pub async fn find_by_pin(&self, pin: &str) -> Result<PairingSession, AuthError> {
        self.lookup_by_key(pin, true).await
    }

    pub async fn find_by_digest(&self, digest: &str) -> Result<PairingSession, AuthError> {
        self.lookup_by_key(digest, false).await
    }

    /// Atomically mark a session completed, dropping its secondary indexes
    /// (spec §4.2: "completing one index ... also completes the other
    /// atomically"). Retains the record briefly for idempotent re-reads.
    pub async fn complete(&self, session_id: &str) -> Result<PairingSession, AuthError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .by_id
            .get_mut(session_id)
            .ok_or(AuthError::SessionNotFound)?;

        match session.status {
            SessionStatus::Completed => return Err(AuthError::AlreadyPaired),
            SessionStatus::Expired => return Err(AuthError::SessionExpired),
            SessionStatus::Pending if session.is_expired(Utc::now()) => {
                session.status = SessionStatus::Expired;
                return Err(AuthError::SessionExpired);
            }
            SessionStatus::Pending => {}
        }

        session.status = SessionStatus::Completed;
        let pin = session.pin.clone();
        let digest = session.secret_digest.clone();
        let result = session.clone();

        inner.by_pin.remove(&pin);
        inner.by_digest.remove(&digest);
        inner
            .evict_at
            .insert(session_id.to_string(), Utc::now() + COMPLETION_GRACE);

        Ok(result)
    }

    /// Sweep expired-and-past-grace sessions. Call periodically from a
    /// background task (mirrors the teacher's periodic-sweep idiom).
    pub async fn sweep(&self) {
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        let newly_expired: Vec<String> = inner
            .by_id
            .iter()
            .filter(|(_, s)| s.status == SessionStatus::Pending && s.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in newly_expired {
            if let Some(session) = inner.by_id.get_mut(&id) {
                session.status = SessionStatus::Expired;
                let pin = session.pin.clone();
                let digest = session.secret_digest.clone();
                inner.by_pin.remove(&pin);
                inner.by_digest.remove(&digest);
                inner.evict_at.insert(id, now + COMPLETION_GRACE);
            }
        }

        let to_remove: Vec<String> = inner
            .evict_at
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in to_remove {
            inner.by_id.remove(&id);
            inner.evict_at.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn redeem_at_most_once_by_either_index() {
        let store = InMemoryPairingStore::new();
        let pair = store
            .generate_pair("ws-1", "demo", 300, None, Some("https://example".into()))
            .await;

        let by_digest = store.find_by_digest(&pair.digest).await.unwrap();
        store.complete(&by_digest.session_id).await.unwrap();

        // Both indexes are now gone.
        assert!(matches!(
            store.find_by_digest(&pair.digest).await,
            Err(AuthError::SessionNotFound)
        ));
        assert!(matches!(
            store.find_by_pin(&pair.pin).await,
            Err(AuthError::SessionNotFound)
        ));

        // Re-completing is ALREADY_PAIRED while in the grace window.
        assert!(matches!(
            store.complete(&by_digest.session_id).await,
            Err(AuthError::AlreadyPaired)
        ));
    }

    #[tokio::test]
    async fn pins_are_unique_among_pending() {
        let store = InMemoryPairingStore::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let pair = store.generate_pair("ws-1", "demo", 300, None, None).await;
            assert!(seen.insert(pair.pin));
        }
    }
}
