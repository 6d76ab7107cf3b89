// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! sqlx pool wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (identity records, upserted on login)
//! - Donors (profiles, radius-search scans, atomic credit updates)
//! - Sessions (server-side session rows)

use crate::db::tables;
use crate::error::AppError;
use crate::models::session::SessionRow;
use crate::models::{BloodGroup, CreditBalance, Donor, DonorPatch, UpsertUser, User};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Columns of a donor row to insert.
#[derive(Debug, Clone)]
pub struct NewDonor {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub age: i64,
    pub blood_group: BloodGroup,
    pub weight: f64,
    pub whatsapp_number: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub last_donation_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Relational store client.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open a bounded connection pool.
    ///
    /// File databases run in WAL mode so readers don't block the single writer.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Database(format!("Invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let options = if in_memory {
            options
        } else {
            options.journal_mode(SqliteJournalMode::Wal)
        };

        // An in-memory database lives only as long as its connection, so pin a
        // single connection for the lifetime of the pool.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        let pool = pool_options
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        tracing::info!(in_memory, max_connections, "Connected to database");

        Ok(Self { pool })
    }

    /// Fresh, migrated in-memory database (tests and local experiments).
    pub async fn in_memory() -> Result<Self, AppError> {
        let db = Self::connect("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Apply pending schema migrations from `migrations/`.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by identity subject.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(&format!("SELECT * FROM {} WHERE id = ?", tables::USERS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or refresh a user from login claims.
    pub async fn upsert_user(&self, user: &UpsertUser) -> Result<User, AppError> {
        let now = Utc::now();
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO {} (id, email, first_name, last_name, profile_image_url, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
                 email = excluded.email, \
                 first_name = excluded.first_name, \
                 last_name = excluded.last_name, \
                 profile_image_url = excluded.profile_image_url, \
                 updated_at = excluded.updated_at \
             RETURNING *",
            tables::USERS
        ))
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.profile_image_url)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Donor Operations ────────────────────────────────────────

    /// Insert a donor. A second donor for the same user fails with `Conflict`.
    pub async fn insert_donor(&self, donor: &NewDonor) -> Result<Donor, AppError> {
        sqlx::query_as::<_, Donor>(&format!(
            "INSERT INTO {} (id, user_id, full_name, age, blood_group, weight, whatsapp_number, \
                 latitude, longitude, address, last_donation_date, credits, total_donations, \
                 created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?) \
             RETURNING *",
            tables::DONORS
        ))
        .bind(&donor.id)
        .bind(&donor.user_id)
        .bind(&donor.full_name)
        .bind(donor.age)
        .bind(donor.blood_group.as_str())
        .bind(donor.weight)
        .bind(&donor.whatsapp_number)
        .bind(donor.latitude)
        .bind(donor.longitude)
        .bind(&donor.address)
        .bind(donor.last_donation_date)
        .bind(donor.created_at)
        .bind(donor.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::Conflict(
                format!("User {} is already registered as a donor", donor.user_id),
            ),
            other => AppError::Database(other.to_string()),
        })
    }

    /// Get a donor by id.
    pub async fn get_donor(&self, donor_id: &str) -> Result<Option<Donor>, AppError> {
        sqlx::query_as::<_, Donor>(&format!("SELECT * FROM {} WHERE id = ?", tables::DONORS))
            .bind(donor_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get the donor profile owned by a user.
    pub async fn get_donor_by_user(&self, user_id: &str) -> Result<Option<Donor>, AppError> {
        sqlx::query_as::<_, Donor>(&format!(
            "SELECT * FROM {} WHERE user_id = ?",
            tables::DONORS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All donors, optionally restricted to one blood group.
    ///
    /// Radius search filters this scan in memory.
    pub async fn list_donors(
        &self,
        blood_group: Option<BloodGroup>,
    ) -> Result<Vec<Donor>, AppError> {
        let result = match blood_group {
            Some(group) => {
                sqlx::query_as::<_, Donor>(&format!(
                    "SELECT * FROM {} WHERE blood_group = ? ORDER BY created_at, id",
                    tables::DONORS
                ))
                .bind(group.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Donor>(&format!(
                    "SELECT * FROM {} ORDER BY created_at, id",
                    tables::DONORS
                ))
                .fetch_all(&self.pool)
                .await
            }
        };

        result.map_err(|e| AppError::Database(e.to_string()))
    }

    /// Apply a partial update in one statement; absent fields keep their value.
    ///
    /// Returns `None` if the donor does not exist.
    pub async fn update_donor(
        &self,
        donor_id: &str,
        patch: &DonorPatch,
        blood_group: Option<BloodGroup>,
    ) -> Result<Option<Donor>, AppError> {
        sqlx::query_as::<_, Donor>(&format!(
            "UPDATE {} SET \
                 full_name = COALESCE(?, full_name), \
                 age = COALESCE(?, age), \
                 blood_group = COALESCE(?, blood_group), \
                 weight = COALESCE(?, weight), \
                 whatsapp_number = COALESCE(?, whatsapp_number), \
                 latitude = COALESCE(?, latitude), \
                 longitude = COALESCE(?, longitude), \
                 address = COALESCE(?, address), \
                 last_donation_date = COALESCE(?, last_donation_date), \
                 updated_at = ? \
             WHERE id = ? \
             RETURNING *",
            tables::DONORS
        ))
        .bind(&patch.full_name)
        .bind(patch.age)
        .bind(blood_group.map(|g| g.as_str()))
        .bind(patch.weight)
        .bind(&patch.whatsapp_number)
        .bind(patch.latitude)
        .bind(patch.longitude)
        .bind(&patch.address)
        .bind(patch.last_donation_date)
        .bind(Utc::now())
        .bind(donor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Credit Operations ───────────────────────────────────────

    /// Atomically credit a donation: one UPDATE increments both counters, so
    /// concurrent donations for the same donor cannot lose updates.
    ///
    /// Returns `None` if the donor does not exist.
    pub async fn record_donation(
        &self,
        donor_id: &str,
        award: i64,
        donated_at: DateTime<Utc>,
    ) -> Result<Option<Donor>, AppError> {
        sqlx::query_as::<_, Donor>(&format!(
            "UPDATE {} SET \
                 credits = credits + ?, \
                 total_donations = total_donations + 1, \
                 last_donation_date = ?, \
                 updated_at = ? \
             WHERE id = ? \
             RETURNING *",
            tables::DONORS
        ))
        .bind(award)
        .bind(donated_at)
        .bind(donated_at)
        .bind(donor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Current credits and donation count.
    pub async fn get_balance(&self, donor_id: &str) -> Result<Option<CreditBalance>, AppError> {
        sqlx::query_as::<_, CreditBalance>(&format!(
            "SELECT id AS donor_id, credits, total_donations FROM {} WHERE id = ?",
            tables::DONORS
        ))
        .bind(donor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Session Operations ──────────────────────────────────────

    /// Store a new session row.
    pub async fn insert_session(&self, sid: &str, sess: &str, expire: i64) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO {} (sid, sess, expire) VALUES (?, ?, ?)",
            tables::SESSIONS
        ))
        .bind(sid)
        .bind(sess)
        .bind(expire)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get a session that has not expired as of `now` (unix seconds).
    pub async fn find_live_session(
        &self,
        sid: &str,
        now: i64,
    ) -> Result<Option<SessionRow>, AppError> {
        sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT sid, sess, expire FROM {} WHERE sid = ? AND expire > ?",
            tables::SESSIONS
        ))
        .bind(sid)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Push a session's expiry forward.
    pub async fn touch_session(&self, sid: &str, expire: i64) -> Result<(), AppError> {
        sqlx::query(&format!(
            "UPDATE {} SET expire = ? WHERE sid = ?",
            tables::SESSIONS
        ))
        .bind(expire)
        .bind(sid)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a session (logout).
    pub async fn delete_session(&self, sid: &str) -> Result<(), AppError> {
        sqlx::query(&format!("DELETE FROM {} WHERE sid = ?", tables::SESSIONS))
            .bind(sid)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete every session expired as of `now`. Returns the number removed.
    pub async fn delete_expired_sessions(&self, now: i64) -> Result<u64, AppError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE expire <= ?", tables::SESSIONS))
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
