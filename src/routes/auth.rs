// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Login, login callback, and logout routes.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Redirect,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::crypto;
use crate::error::{AppError, Result};
use crate::middleware::auth::{session_token, SESSION_COOKIE};
use crate::models::UpsertUser;
use crate::AppState;

/// How long a login attempt may take between `/api/login` and the callback.
const STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;
/// Tolerated clock drift for state timestamps from the future.
const STATE_CLOCK_SKEW_MS: u128 = 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/login", get(login))
        .route("/api/callback", get(callback))
        .route("/api/logout", get(logout))
}

/// Query parameters for starting the login flow.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginParams {
    /// Frontend path to land on after login.
    #[serde(default)]
    return_to: Option<String>,
}

/// Start login - redirect to the identity provider.
async fn login(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LoginParams>,
) -> Result<Redirect> {
    let return_to = params
        .return_to
        .as_deref()
        .filter(|path| is_safe_return_path(path))
        .unwrap_or("/");

    let key = crypto::derive_key(&state.config.session_secret, crypto::OAUTH_STATE_KEY_INFO)?;
    let oauth_state = sign_state(return_to, &key, now_millis()?)?;

    let url = state
        .identity
        .login_redirect(&oauth_state, &state.config.callback_url())
        .await?;

    tracing::info!(return_to = %return_to, "Starting login, redirecting to identity provider");

    Ok(Redirect::temporary(&url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Login callback - exchange the code, upsert the user, start a session.
async fn callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect)> {
    // Provider-reported failures (e.g. the user declined consent)
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "Login error from identity provider");
        let redirect = format!(
            "{}/?error={}",
            state.config.frontend_url,
            urlencoding::encode(&error)
        );
        return Ok((jar, Redirect::temporary(&redirect)));
    }

    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return Err(AppError::BadRequest(
            "code and state are required".to_string(),
        ));
    };

    let key = crypto::derive_key(&state.config.session_secret, crypto::OAUTH_STATE_KEY_INFO)?;
    let return_to = verify_and_decode_state(&oauth_state, &key, now_millis()?).ok_or_else(|| {
        tracing::warn!("Invalid, expired, or tampered login state");
        AppError::BadRequest("Invalid or expired login state".to_string())
    })?;

    let identity = state
        .identity
        .complete_login(&code, &state.config.callback_url())
        .await?;

    let user = state.db.upsert_user(&UpsertUser::from(identity)).await?;

    if let Err(e) = state.sessions.purge_expired().await {
        tracing::warn!(error = %e, "Failed to purge expired sessions, continuing anyway");
    }

    let token = state.sessions.create(&user.id).await?;

    tracing::info!(user_id = %user.id, "Login successful");

    let cookie = session_cookie(
        token,
        state.sessions.ttl(),
        state.config.cookies_secure(),
    );
    let redirect = format!("{}{}", state.config.frontend_url, return_to);

    Ok((jar.add(cookie), Redirect::temporary(&redirect)))
}

/// Logout - destroy the session and clear the cookie.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Redirect)> {
    if let Some(token) = session_token(&jar, &headers) {
        state.sessions.destroy(&token).await?;
    }

    // Always emit the removal, even when the request authenticated by header.
    // It must repeat the attributes the cookie was set with.
    let removal = session_cookie(
        String::new(),
        chrono::Duration::zero(),
        state.config.cookies_secure(),
    );
    let redirect = format!("{}/", state.config.frontend_url);

    Ok((jar.add(removal), Redirect::temporary(&redirect)))
}

fn session_cookie(value: String, ttl: chrono::Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .build()
}

/// Only same-site relative paths are accepted as post-login destinations.
fn is_safe_return_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.contains('|')
        && !path.chars().any(char::is_control)
}

fn now_millis() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

/// Build the OAuth `state`: base64url("return_to|timestamp_hex|signature_hex").
fn sign_state(return_to: &str, key: &[u8], now_ms: u128) -> Result<String> {
    let payload = format!("{}|{:x}", return_to, now_ms);
    let signature = crypto::sign(key, payload.as_bytes())?;
    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify the HMAC and age of an OAuth `state` and return its `return_to`.
fn verify_and_decode_state(state: &str, key: &[u8], now_ms: u128) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    let (payload, signature_hex) = state_str.rsplit_once('|')?;
    let (return_to, timestamp_hex) = payload.rsplit_once('|')?;

    if !crypto::verify(key, payload.as_bytes(), signature_hex) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_ms = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if issued_ms > now_ms + STATE_CLOCK_SKEW_MS || now_ms.saturating_sub(issued_ms) > STATE_MAX_AGE_MS
    {
        return None;
    }

    is_safe_return_path(return_to).then(|| return_to.to_string())
}
