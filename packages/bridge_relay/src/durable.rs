//! Durable backing store for the optional external relay deployment (spec
//! §4.2, §6: "may back pairing sessions and device registry with a durable
//! store instead of memory"). Gated behind the `durable` feature.
//!
//! This mirrors the teacher's `db.rs` sqlx/SQLite setup (WAL mode, manual
//! migrations run at startup) but persists only what the relay needs to
//! survive a restart: pairing sessions and registered devices. It is a
//! second concrete store with the same method surface as
//! [`bridge_auth::InMemoryPairingStore`] / [`bridge_auth::DeviceRegistry`]
//! rather than a shared trait — see DESIGN.md.

use bridge_auth::AuthError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

/// Open (creating if absent) a SQLite pool at `path`, apply pragmas, and run
/// migrations. Mirrors the teacher's `db::connect` shape.
pub async fn connect(path: &str) -> anyhow::Result<SqlitePool> {
    let url = format!("sqlite://{path}?mode=rwc");
    let pool = SqlitePoolOptions::new().max_connections(5).connect(&url).await?;
    sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS pairing_sessions (
            session_id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            workspace_name TEXT NOT NULL,
            pin TEXT NOT NULL,
            secret_digest TEXT NOT NULL,
            local_address TEXT,
            relay_url TEXT,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            status TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS pairing_sessions_pin
         ON pairing_sessions(pin) WHERE status = 'pending'",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS devices (
            device_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            platform TEXT NOT NULL,
            app_version TEXT NOT NULL,
            workspace_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_seen_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// sqlx-backed pairing store. Same semantics as the in-memory store
/// (PIN/digest dual index, single-redemption, grace-period retention) but
/// surviving a process restart.
pub struct DurablePairingStore {
    pool: SqlitePool,
}

impl DurablePairingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn generate_pair(
        &self,
        workspace_id: &str,
        workspace_name: &str,
        ttl_secs: i64,
        local_address: Option<String>,
        relay_url: Option<String>,
    ) -> anyhow::Result<bridge_auth::GeneratedPair> {
        use bridge_auth::secret::{generate_pin, generate_secret};

        let (secret, digest) = generate_secret();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(ttl_secs);
        let session_id = uuid::Uuid::new_v4().to_string();

        let pin = loop {
            let candidate = generate_pin();
            let exists: Option<(String,)> = sqlx::query_as(
                "SELECT pin FROM pairing_sessions WHERE pin = ? AND status = 'pending'",
            )
            .bind(&candidate)
            .fetch_optional(&self.pool)
            .await?;
            if exists.is_none() {
                break candidate;
            }
        };

        sqlx::query(
            "INSERT INTO pairing_sessions
             (session_id, workspace_id, workspace_name, pin, secret_digest,
              local_address, relay_url, created_at, expires_at, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')",
        )
        .bind(&session_id)
        .bind(workspace_id)
        .bind(workspace_name)
        .bind(&pin)
        .bind(&digest)
        .bind(&local_address)
        .bind(&relay_url)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(bridge_auth::GeneratedPair {
            session_id,
            pin,
            secret,
            digest,
            expires_at,
        })
    }

    async fn row_to_session(&self, row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<bridge_auth::PairingSession> {
        let status_str: String = row.try_get("status")?;
        let status = match status_str.as_str() {
            "completed" => bridge_auth::SessionStatus::Completed,
            "expired" => bridge_auth::SessionStatus::Expired,
            _ => bridge_auth::SessionStatus::Pending,
        };
        let created_at: String = row.try_get("created_at")?;
        let expires_at: String = row.try_get("expires_at")?;
        Ok(bridge_auth::PairingSession {
            session_id: row.try_get("session_id")?,
            workspace_id: row.try_get("workspace_id")?,
            workspace_name: row.try_get("workspace_name")?,
            pin: row.try_get("pin")?,
            secret_digest: row.try_get("secret_digest")?,
            local_address: row.try_get("local_address")?,
            relay_url: row.try_get("relay_url")?,
            created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
            expires_at: DateTime::parse_from_rfc3339(&expires_at)?.with_timezone(&Utc),
            status,
        })
    }

    async fn find_by(&self, column: &str, value: &str) -> anyhow::Result<Result<bridge_auth::PairingSession, AuthError>> {
        let query = format!("SELECT * FROM pairing_sessions WHERE {column} = ?");
        let row = sqlx::query(&query).bind(value).fetch_optional(&self.pool).await?;
        let Some(row) = row else {
            return Ok(Err(AuthError::SessionNotFound));
        };
        let session = self.row_to_session(&row).await?;
        let now = Utc::now();
        Ok(match session.status {
            bridge_auth::SessionStatus::Completed => Err(AuthError::AlreadyPaired),
            bridge_auth::SessionStatus::Expired => Err(AuthError::SessionExpired),
            bridge_auth::SessionStatus::Pending if session.is_expired(now) => Err(AuthError::SessionExpired),
            bridge_auth::SessionStatus::Pending => Ok(session),
        })
    }

    pub async fn find_by_pin(&self, pin: &str) -> anyhow::Result<Result<bridge_auth::PairingSession, AuthError>> {
        self.find_by("pin", pin).await
    }

    pub async fn find_by_digest(&self, digest: &str) -> anyhow::Result<Result<bridge_auth::PairingSession, AuthError>> {
        self.find_by("secret_digest", digest).await
    }

    pub async fn complete(&self, session_id: &str) -> anyhow::Result<Result<bridge_auth::PairingSession, AuthError>> {
        let row = sqlx::query("SELECT * FROM pairing_sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(Err(AuthError::SessionNotFound));
        };
        let session = self.row_to_session(&row).await?;
        match session.status {
            bridge_auth::SessionStatus::Completed => return Ok(Err(AuthError::AlreadyPaired)),
            bridge_auth::SessionStatus::Expired => return Ok(Err(AuthError::SessionExpired)),
            bridge_auth::SessionStatus::Pending if session.is_expired(Utc::now()) => {
                sqlx::query("UPDATE pairing_sessions SET status = 'expired' WHERE session_id = ?")
                    .bind(session_id)
                    .execute(&self.pool)
                    .await?;
                return Ok(Err(AuthError::SessionExpired));
            }
            bridge_auth::SessionStatus::Pending => {}
        }
        sqlx::query("UPDATE pairing_sessions SET status = 'completed' WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(Ok(bridge_auth::PairingSession {
            status: bridge_auth::SessionStatus::Completed,
            ..session
        }))
    }

    /// Delete fully-expired or long-completed rows. Call periodically,
    /// mirroring `InMemoryPairingStore::sweep`.
    pub async fn sweep(&self, completed_grace_secs: i64) -> anyhow::Result<()> {
        let now = Utc::now();
        sqlx::query("UPDATE pairing_sessions SET status = 'expired' WHERE status = 'pending' AND expires_at < ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;
        let cutoff = now - chrono::Duration::seconds(completed_grace_secs);
        sqlx::query("DELETE FROM pairing_sessions WHERE status IN ('completed', 'expired') AND expires_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// sqlx-backed device registry, same method surface as
/// [`bridge_auth::DeviceRegistry`].
pub struct DurableDeviceRegistry {
    pool: SqlitePool,
}

impl DurableDeviceRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn register(
        &self,
        workspace_id: &str,
        display_name: &str,
        platform: &str,
        app_version: &str,
    ) -> anyhow::Result<bridge_auth::RegisteredDevice> {
        let now = Utc::now();
        let device_id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO devices
             (device_id, display_name, platform, app_version, workspace_id, created_at, last_seen_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&device_id)
        .bind(display_name)
        .bind(platform)
        .bind(app_version)
        .bind(workspace_id)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(bridge_auth::RegisteredDevice {
            device_id,
            display_name: display_name.to_string(),
            platform: platform.to_string(),
            app_version: app_version.to_string(),
            workspace_id: workspace_id.to_string(),
            created_at: now,
            last_seen_at: now,
        })
    }

    pub async fn touch(&self, device_id: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE devices SET last_seen_at = ? WHERE device_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, device_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE device_id = ?")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
