// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod contact;
pub mod directory;
pub mod identity;
pub mod ledger;
pub mod oidc;
pub mod sessions;

pub use directory::DonorDirectory;
pub use identity::{DevIdentityProvider, Identity, IdentityError, IdentityProvider};
pub use ledger::CreditLedger;
pub use oidc::OidcIdentityProvider;
pub use sessions::{SessionResolver, SessionStore};
