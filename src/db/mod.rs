//! Database layer (relational store via sqlx).

pub mod sqlite;

pub use sqlite::Db;

/// Table names as constants.
pub mod tables {
    pub const USERS: &str = "users";
    pub const DONORS: &str = "donors";
    /// Server-side sessions (sid -> JSON payload, expiry)
    pub const SESSIONS: &str = "sessions";
}
