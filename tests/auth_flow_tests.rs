// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Login, callback, and logout flow tests using the development identity provider.

use axum::{
    http::{header, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use pulse_connect::config::{AuthMode, Config, DevUser};

mod common;

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("missing Location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// The session token inside a `Set-Cookie: pulse_sid=...` header.
fn cookie_value(set_cookie: &str) -> String {
    set_cookie
        .trim_start_matches("pulse_sid=")
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

/// Start a login and return the callback path (with query) the provider sends us to.
async fn start_login(app: &Router, config: &Config, uri: &str) -> String {
    let response = common::send(app, "GET", uri, None, None).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let callback = location(&response);
    callback
        .strip_prefix(&config.public_url)
        .unwrap_or_else(|| panic!("unexpected callback URL {callback}"))
        .to_string()
}

/// The `state` query parameter of a callback path.
fn state_param(callback_path: &str) -> String {
    callback_path
        .split_once("state=")
        .map(|(_, state)| state.to_string())
        .unwrap()
}

#[tokio::test]
async fn test_full_login_flow() {
    let config = Config::test_default();
    let (app, _) = common::create_test_app_with_config(config.clone()).await;

    let callback = start_login(&app, &config, "/api/login?returnTo=/register").await;
    assert!(callback.starts_with("/api/callback?code=local-dev&state="));

    let response = common::send(&app, "GET", &callback, None, None).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "http://localhost:5173/register");

    let set_cookies = common::set_cookie_headers(&response);
    let session_cookie = common::find_cookie(&set_cookies, "pulse_sid");
    assert!(session_cookie.contains("Path=/"));
    assert!(session_cookie.contains("HttpOnly"));
    assert!(session_cookie.contains("SameSite=Lax"));
    assert!(session_cookie.contains("Max-Age=604800"));
    assert!(!session_cookie.contains("Secure"));

    let token = cookie_value(&session_cookie);
    let (status, user) =
        common::send_json(&app, "GET", "/api/auth/user", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["id"], "local-dev-user");
    assert_eq!(user["firstName"], "Local");
    assert_eq!(user["lastName"], "Developer");
}

#[tokio::test]
async fn test_login_defaults_to_root_and_rejects_absolute_return_to() {
    let config = Config::test_default();
    let (app, _) = common::create_test_app_with_config(config.clone()).await;

    for uri in [
        "/api/login",
        "/api/login?returnTo=https://evil.example.com",
        "/api/login?returnTo=//evil.example.com",
    ] {
        let callback = start_login(&app, &config, uri).await;
        let response = common::send(&app, "GET", &callback, None, None).await;
        assert_eq!(location(&response), "http://localhost:5173/", "for {uri}");
    }
}

#[tokio::test]
async fn test_repeat_login_updates_same_user() {
    let config = Config::test_default();
    let (app, state) = common::create_test_app_with_config(config.clone()).await;

    for _ in 0..2 {
        let callback = start_login(&app, &config, "/api/login").await;
        let response = common::send(&app, "GET", &callback, None, None).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    }

    let user = state.db.get_user("local-dev-user").await.unwrap().unwrap();
    assert!(user.updated_at >= user.created_at);
}

#[tokio::test]
async fn test_callback_rejects_tampered_state() {
    let config = Config::test_default();
    let (app, _) = common::create_test_app_with_config(config.clone()).await;

    let callback = start_login(&app, &config, "/api/login?returnTo=/profile").await;
    let state = state_param(&callback);

    let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&state).unwrap()).unwrap();
    let tampered = URL_SAFE_NO_PAD.encode(decoded.replacen("/profile", "/elsewhere", 1));

    let uri = format!("/api/callback?code=local-dev&state={tampered}");
    let (status, body) = common::send_json(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_callback_requires_code_and_state() {
    let (app, _) = common::create_test_app().await;

    let (status, _) = common::send_json(&app, "GET", "/api/callback?code=local-dev", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = common::send_json(&app, "GET", "/api/callback", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_rejects_unknown_code() {
    let config = Config::test_default();
    let (app, _) = common::create_test_app_with_config(config.clone()).await;

    let callback = start_login(&app, &config, "/api/login").await;
    let forged = callback.replacen("code=local-dev", "code=forged", 1);

    let response = common::send(&app, "GET", &forged, None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(common::set_cookie_headers(&response).is_empty());
}

#[tokio::test]
async fn test_callback_provider_error_redirects_to_frontend() {
    let (app, _) = common::create_test_app().await;

    let response = common::send(&app, "GET", "/api/callback?error=access_denied", None, None).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "http://localhost:5173/?error=access_denied"
    );
}

#[tokio::test]
async fn test_logout_clears_cookie_and_session() {
    let (app, state) = common::create_test_app().await;
    let token = common::login_as(&state, "user-logout").await;

    let response = common::send(&app, "GET", "/api/logout", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "http://localhost:5173/");

    let set_cookies = common::set_cookie_headers(&response);
    let removal = common::find_cookie(&set_cookies, "pulse_sid");
    assert!(removal.starts_with("pulse_sid=;"));
    assert!(removal.contains("Max-Age=0"));
    assert!(removal.contains("Path=/"));
    assert!(removal.contains("HttpOnly"));
    assert!(removal.contains("SameSite=Lax"));

    // The old token no longer authenticates
    let (status, _) = common::send_json(&app, "GET", "/api/auth/user", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_session_still_clears_cookie() {
    let (app, _) = common::create_test_app().await;

    let response = common::send(&app, "GET", "/api/logout", None, None).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let set_cookies = common::set_cookie_headers(&response);
    assert!(common::find_cookie(&set_cookies, "pulse_sid").contains("Max-Age=0"));
}

#[tokio::test]
async fn test_secure_cookie_for_https_deployments() {
    let config = Config {
        public_url: "https://api.pulse.example".to_string(),
        frontend_url: "https://pulse.example".to_string(),
        ..Config::test_default()
    };
    let (app, _) = common::create_test_app_with_config(config.clone()).await;

    let callback = start_login(&app, &config, "/api/login").await;
    let response = common::send(&app, "GET", &callback, None, None).await;
    assert_eq!(location(&response), "https://pulse.example/");

    let set_cookies = common::set_cookie_headers(&response);
    assert!(common::find_cookie(&set_cookies, "pulse_sid").contains("Secure"));
}

#[tokio::test]
async fn test_dev_login_carries_profile_image() {
    let config = Config {
        auth: AuthMode::Dev(DevUser {
            profile_image_url: Some("https://example.com/avatar.png".to_string()),
            ..DevUser::default()
        }),
        ..Config::test_default()
    };
    let (app, _) = common::create_test_app_with_config(config.clone()).await;

    let callback = start_login(&app, &config, "/api/login").await;
    let response = common::send(&app, "GET", &callback, None, None).await;
    let set_cookies = common::set_cookie_headers(&response);
    let token = cookie_value(&common::find_cookie(&set_cookies, "pulse_sid"));

    let (status, user) =
        common::send_json(&app, "GET", "/api/auth/user", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["profileImageUrl"], "https://example.com/avatar.png");
}
