// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;

/// Session lifetime; each authenticated request slides the expiry forward by this much.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Minimum accepted length of `SESSION_SECRET`.
const MIN_SESSION_SECRET_LEN: usize = 32;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// sqlx connection URL for the relational store
    pub database_url: String,
    /// Upper bound on pooled store connections
    pub db_max_connections: u32,
    /// Externally visible base URL of this API (used for OAuth callbacks)
    pub public_url: String,
    /// Frontend URL for post-login redirects and CORS
    pub frontend_url: String,
    /// Secret from which session and OAuth-state signing keys are derived
    pub session_secret: Vec<u8>,
    /// Session lifetime
    pub session_ttl: chrono::Duration,
    /// How users log in
    pub auth: AuthMode,
}

/// Identity provider selection.
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// Local development: every login resolves to one configured user.
    Dev(DevUser),
    /// OpenID Connect authorization-code flow.
    Oidc(OidcSettings),
}

/// The identity handed out by the development provider.
#[derive(Debug, Clone)]
pub struct DevUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_image_url: Option<String>,
}

impl Default for DevUser {
    fn default() -> Self {
        Self {
            id: "local-dev-user".to_string(),
            email: "dev@example.com".to_string(),
            first_name: "Local".to_string(),
            last_name: "Developer".to_string(),
            profile_image_url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OidcSettings {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Config {
    /// Config for tests: in-memory store, dev login.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            public_url: "http://localhost:8080".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            session_secret: b"test_session_secret_32_bytes_min!".to_vec(),
            session_ttl: chrono::Duration::days(SESSION_TTL_DAYS),
            auth: AuthMode::Dev(DevUser::default()),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let session_secret = env::var("SESSION_SECRET")
            .map_err(|_| ConfigError::Missing("SESSION_SECRET"))?
            .into_bytes();
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::Invalid(
                "SESSION_SECRET",
                format!("must be at least {} bytes", MIN_SESSION_SECRET_LEN),
            ));
        }

        let auth = match env::var("AUTH_MODE")
            .unwrap_or_else(|_| "dev".to_string())
            .as_str()
        {
            "dev" => AuthMode::Dev(dev_user_from_env()),
            "oidc" => AuthMode::Oidc(OidcSettings {
                issuer_url: env::var("OIDC_ISSUER_URL")
                    .map(|v| v.trim().trim_end_matches('/').to_string())
                    .map_err(|_| ConfigError::Missing("OIDC_ISSUER_URL"))?,
                client_id: env::var("OIDC_CLIENT_ID")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::Missing("OIDC_CLIENT_ID"))?,
                client_secret: env::var("OIDC_CLIENT_SECRET")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::Missing("OIDC_CLIENT_SECRET"))?,
            }),
            other => {
                return Err(ConfigError::Invalid(
                    "AUTH_MODE",
                    format!("expected 'dev' or 'oidc', got '{}'", other),
                ))
            }
        };

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://pulse_connect.db?mode=rwc".to_string()),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(5),
            public_url: env::var("PUBLIC_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            session_secret,
            session_ttl: chrono::Duration::days(SESSION_TTL_DAYS),
            auth,
        })
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn cookies_secure(&self) -> bool {
        self.public_url.starts_with("https://")
    }

    /// Absolute URL the identity provider redirects back to.
    pub fn callback_url(&self) -> String {
        format!("{}/api/callback", self.public_url)
    }
}

fn dev_user_from_env() -> DevUser {
    let default = DevUser::default();
    DevUser {
        id: env::var("DEV_USER_ID").unwrap_or(default.id),
        email: env::var("DEV_USER_EMAIL").unwrap_or(default.email),
        first_name: env::var("DEV_USER_FIRST_NAME").unwrap_or(default.first_name),
        last_name: env::var("DEV_USER_LAST_NAME").unwrap_or(default.last_name),
        profile_image_url: env::var("DEV_USER_PROFILE_IMAGE_URL")
            .ok()
            .filter(|url| !url.is_empty()),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
