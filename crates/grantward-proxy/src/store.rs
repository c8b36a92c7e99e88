//! SQLite-backed token tables.
//!
//! Mirrors the authorization server's `oauth_access_tokens` and
//! `oauth_refresh_tokens` tables closely enough to revoke sessions and to
//! validate access tokens locally.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::error::{ProxyError, Result};
use crate::introspect::{Introspection, IntrospectionError, TokenIntrospector};
use crate::revoke::{AccessTokenRef, AuthenticatedUser, SessionResolver, TokenStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS oauth_access_tokens (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    revoked INTEGER NOT NULL DEFAULT 0,
    expires_at TEXT
);

CREATE TABLE IF NOT EXISTS oauth_refresh_tokens (
    id TEXT PRIMARY KEY,
    access_token_id TEXT NOT NULL,
    revoked INTEGER NOT NULL DEFAULT 0,
    expires_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_refresh_tokens_access_token
    ON oauth_refresh_tokens(access_token_id);
"#;

/// A row of `oauth_access_tokens`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenRecord {
    pub id: String,
    pub user_id: i64,
    pub revoked: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessTokenRecord {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Token store backed by SQLite.
///
/// Queries run synchronously under the connection mutex, including from the
/// async trait methods, so they block the calling runtime worker for the
/// length of one short statement or transaction.
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTokenStore").finish_non_exhaustive()
    }
}

impl SqliteTokenStore {
    /// Open or create a token database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProxyError::Storage(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::from_connection(conn)?;
        info!("Token store opened at {}", path.display());
        Ok(store)
    }

    /// In-memory store, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record an issued access token.
    pub fn insert_access_token(
        &self,
        id: &str,
        user_id: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO oauth_access_tokens (id, user_id, revoked, expires_at) VALUES (?1, ?2, 0, ?3)",
            params![id, user_id, expires_at.map(|t| t.to_rfc3339())],
        )?;
        debug!(user_id, "Inserted access token");
        Ok(())
    }

    /// Record a refresh token issued alongside an access token.
    pub fn insert_refresh_token(
        &self,
        id: &str,
        access_token_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO oauth_refresh_tokens (id, access_token_id, revoked, expires_at) VALUES (?1, ?2, 0, ?3)",
            params![id, access_token_id, expires_at.map(|t| t.to_rfc3339())],
        )?;
        Ok(())
    }

    /// Look up an access token row.
    pub fn access_token(&self, id: &str) -> Result<Option<AccessTokenRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, user_id, revoked, expires_at FROM oauth_access_tokens WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, user_id, revoked, expires_at)| {
            Ok(AccessTokenRecord {
                id,
                user_id,
                revoked,
                expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
            })
        })
        .transpose()
    }

    /// Whether a refresh token is revoked; `None` if it does not exist.
    pub fn refresh_token_revoked(&self, id: &str) -> Result<Option<bool>> {
        let conn = self.conn.lock();
        let revoked = conn
            .query_row(
                "SELECT revoked FROM oauth_refresh_tokens WHERE id = ?1",
                params![id],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(revoked)
    }

    /// Validate an access token row at a given instant.
    pub fn validate_at(
        &self,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<AccessTokenRecord, IntrospectionError> {
        if access_token.is_empty() {
            return Err(IntrospectionError::EmptyToken);
        }

        let record = self
            .access_token(access_token)
            .map_err(|e| IntrospectionError::Storage(e.to_string()))?
            .ok_or(IntrospectionError::UnknownToken)?;

        if record.revoked {
            return Err(IntrospectionError::Revoked);
        }
        if record.is_expired(now) {
            return Err(IntrospectionError::Expired);
        }
        Ok(record)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ProxyError::Storage(format!("Invalid timestamp '{}': {}", value, e)))
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn revoke_refresh_tokens(&self, access_token_id: &str) -> Result<u64> {
        let updated = self.conn.lock().execute(
            "UPDATE oauth_refresh_tokens SET revoked = 1 WHERE access_token_id = ?1",
            params![access_token_id],
        )?;
        Ok(updated as u64)
    }

    async fn revoke_access_token(&self, access_token_id: &str) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE oauth_access_tokens SET revoked = 1 WHERE id = ?1",
            params![access_token_id],
        )?;
        Ok(())
    }

    /// Both updates commit together or not at all.
    async fn revoke_session(&self, access_token_id: &str) -> Result<u64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE oauth_refresh_tokens SET revoked = 1 WHERE access_token_id = ?1",
            params![access_token_id],
        )?;
        tx.execute(
            "UPDATE oauth_access_tokens SET revoked = 1 WHERE id = ?1",
            params![access_token_id],
        )?;
        tx.commit()?;
        debug!(refresh_tokens = updated, "Revoked session tokens");
        Ok(updated as u64)
    }
}

#[async_trait]
impl TokenIntrospector for SqliteTokenStore {
    async fn introspect(
        &self,
        access_token: &str,
    ) -> std::result::Result<Introspection, IntrospectionError> {
        self.validate_at(access_token, Utc::now())
            .map(|record| Introspection {
                user_id: record.user_id,
            })
    }
}

#[async_trait]
impl SessionResolver for SqliteTokenStore {
    async fn resolve(&self, access_token: &str) -> Result<Option<AuthenticatedUser>> {
        match self.validate_at(access_token, Utc::now()) {
            Ok(record) => Ok(Some(AuthenticatedUser {
                user_id: record.user_id,
                access_token: Some(AccessTokenRef { id: record.id }),
            })),
            Err(IntrospectionError::Storage(msg)) => Err(ProxyError::Storage(msg)),
            Err(_) => Ok(None),
        }
    }
}
