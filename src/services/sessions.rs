// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server-side sessions backed by the `sessions` table.
//!
//! A session token handed to the client is `<sid>.<hex HMAC-SHA256(sid)>`.
//! The signature lets us reject forged or mangled tokens without touching
//! the store; the row itself carries the owning user and the expiry.

use crate::crypto;
use crate::db::Db;
use crate::error::AppError;
use crate::models::SessionData;
use crate::time_utils::{format_utc_rfc3339, unix_seconds};
use async_trait::async_trait;
use chrono::{Duration, Utc};

/// Random bytes in a session id.
const SID_BYTES: usize = 32;

/// Maps an opaque session token to the user it authenticates.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// `Ok(None)` for unknown, expired, or tampered tokens.
    async fn resolve_session(&self, token: &str) -> Result<Option<String>, AppError>;
}

/// SQL-backed session store with sliding expiry.
#[derive(Clone)]
pub struct SessionStore {
    db: Db,
    key: [u8; 32],
    ttl: Duration,
}

impl SessionStore {
    pub fn new(db: Db, session_secret: &[u8], ttl: Duration) -> anyhow::Result<Self> {
        let key = crypto::derive_key(session_secret, crypto::SESSION_KEY_INFO)?;
        Ok(Self { db, key, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a session for `user_id` and return the signed token.
    pub async fn create(&self, user_id: &str) -> Result<String, AppError> {
        let sid = crypto::random_token(SID_BYTES)?;
        let now = Utc::now();
        let data = SessionData {
            user_id: user_id.to_string(),
            login_at: format_utc_rfc3339(now),
        };
        let sess = serde_json::to_string(&data)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Session encode failed: {}", e)))?;

        self.db
            .insert_session(&sid, &sess, unix_seconds(now + self.ttl))
            .await?;

        tracing::info!(user_id = %user_id, "Session created");

        let signature = crypto::sign(&self.key, sid.as_bytes())?;
        Ok(format!("{}.{}", sid, signature))
    }

    /// Resolve a token to its user, pushing the expiry forward on success.
    pub async fn resolve(&self, token: &str) -> Result<Option<String>, AppError> {
        let Some(sid) = self.verified_sid(token) else {
            tracing::debug!("Rejected session token with bad signature");
            return Ok(None);
        };

        let now = Utc::now();
        let Some(row) = self.db.find_live_session(sid, unix_seconds(now)).await? else {
            return Ok(None);
        };

        let data: SessionData = match serde_json::from_str(&row.sess) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable session payload");
                self.db.delete_session(sid).await?;
                return Ok(None);
            }
        };

        self.db
            .touch_session(sid, unix_seconds(now + self.ttl))
            .await?;

        Ok(Some(data.user_id))
    }

    /// End a session. Unknown or tampered tokens are ignored.
    pub async fn destroy(&self, token: &str) -> Result<(), AppError> {
        if let Some(sid) = self.verified_sid(token) {
            self.db.delete_session(sid).await?;
            tracing::info!("Session destroyed");
        }
        Ok(())
    }

    /// Remove every expired row; called at login.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let removed = self
            .db
            .delete_expired_sessions(unix_seconds(Utc::now()))
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }

    /// The session id if the token's signature checks out.
    fn verified_sid<'a>(&self, token: &'a str) -> Option<&'a str> {
        let (sid, signature) = token.rsplit_once('.')?;
        if sid.is_empty() || !crypto::verify(&self.key, sid.as_bytes(), signature) {
            return None;
        }
        Some(sid)
    }
}

#[async_trait]
impl SessionResolver for SessionStore {
    async fn resolve_session(&self, token: &str) -> Result<Option<String>, AppError> {
        self.resolve(token).await
    }
}
