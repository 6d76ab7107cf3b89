// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pluggable login collaborators.

use crate::config::DevUser;
use crate::error::AppError;
use crate::models::UpsertUser;
use async_trait::async_trait;

/// Authorization code the development provider hands back to the callback.
pub const DEV_LOGIN_CODE: &str = "local-dev";

/// Who logged in, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Stable subject identifier
    pub sub: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
}

impl From<Identity> for UpsertUser {
    fn from(identity: Identity) -> Self {
        UpsertUser {
            id: identity.sub,
            email: identity.email,
            first_name: identity.first_name,
            last_name: identity.last_name,
            profile_image_url: identity.profile_image_url,
        }
    }
}

/// Identity provider failures.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The code or ID token was refused; the user has to start over.
    #[error("login rejected: {0}")]
    Rejected(String),
    /// The provider could not be reached or answered nonsense.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected(reason) => {
                tracing::warn!(reason = %reason, "Login rejected by identity provider");
                AppError::Unauthorized
            }
            IdentityError::Unavailable(reason) => AppError::IdentityProvider(reason),
        }
    }
}

/// Login flow: send the browser to the provider, then turn the returned
/// authorization code into an [`Identity`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL to redirect the browser to. `state` must come back unchanged.
    async fn login_redirect(&self, state: &str, callback_url: &str)
        -> Result<String, IdentityError>;

    /// Exchange an authorization code for the logged-in identity.
    async fn complete_login(&self, code: &str, callback_url: &str)
        -> Result<Identity, IdentityError>;
}

/// Development login: skips the provider round trip and always yields the
/// configured user.
pub struct DevIdentityProvider {
    user: DevUser,
}

impl DevIdentityProvider {
    pub fn new(user: DevUser) -> Self {
        tracing::warn!(user_id = %user.id, "Using development identity provider");
        Self { user }
    }
}

#[async_trait]
impl IdentityProvider for DevIdentityProvider {
    async fn login_redirect(
        &self,
        state: &str,
        callback_url: &str,
    ) -> Result<String, IdentityError> {
        Ok(format!(
            "{}?code={}&state={}",
            callback_url,
            DEV_LOGIN_CODE,
            urlencoding::encode(state)
        ))
    }

    async fn complete_login(
        &self,
        code: &str,
        _callback_url: &str,
    ) -> Result<Identity, IdentityError> {
        if code != DEV_LOGIN_CODE {
            return Err(IdentityError::Rejected(
                "unknown development login code".to_string(),
            ));
        }

        Ok(Identity {
            sub: self.user.id.clone(),
            email: Some(self.user.email.clone()),
            first_name: Some(self.user.first_name.clone()),
            last_name: Some(self.user.last_name.clone()),
            profile_image_url: self.user.profile_image_url.clone(),
        })
    }
}
