// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! PulseConnect: find nearby blood donors and reward donations.
//!
//! This crate provides the backend API: donor registration, radius search
//! by blood group, WhatsApp contact links, donation credits, and
//! session-based login.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod geo_utils;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::{AuthMode, Config};
use db::Db;
use services::{
    CreditLedger, DevIdentityProvider, DonorDirectory, IdentityProvider, OidcIdentityProvider,
    SessionResolver, SessionStore,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub directory: DonorDirectory,
    pub ledger: CreditLedger,
    pub sessions: SessionStore,
    /// Used by the auth gate; usually `sessions` itself.
    pub session_resolver: Arc<dyn SessionResolver>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Wire services over `db`, choosing the identity provider from config.
    pub fn new(config: Config, db: Db) -> anyhow::Result<Self> {
        let identity: Arc<dyn IdentityProvider> = match &config.auth {
            AuthMode::Dev(user) => Arc::new(DevIdentityProvider::new(user.clone())),
            AuthMode::Oidc(settings) => Arc::new(OidcIdentityProvider::new(settings)?),
        };
        Self::with_identity(config, db, identity)
    }

    /// Like [`AppState::new`] with an explicit identity provider.
    pub fn with_identity(
        config: Config,
        db: Db,
        identity: Arc<dyn IdentityProvider>,
    ) -> anyhow::Result<Self> {
        let sessions = SessionStore::new(db.clone(), &config.session_secret, config.session_ttl)?;
        Ok(Self {
            directory: DonorDirectory::new(db.clone()),
            ledger: CreditLedger::new(db.clone()),
            session_resolver: Arc::new(sessions.clone()),
            sessions,
            identity,
            config,
            db,
        })
    }
}
