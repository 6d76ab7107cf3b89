//! Server-side session payload.

use serde::{Deserialize, Serialize};

/// JSON stored in the `sess` column of a session row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    pub user_id: String,
    /// When the user logged in (RFC 3339)
    pub login_at: String,
}

/// A session row as read from the store.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub sid: String,
    pub sess: String,
    /// Unix timestamp (seconds)
    pub expire: i64,
}
