// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use pulse_connect::config::Config;
use pulse_connect::db::Db;
use pulse_connect::models::UpsertUser;
use pulse_connect::routes::create_router;
use pulse_connect::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Create a fresh, migrated in-memory database.
#[allow(dead_code)]
pub async fn test_db() -> Db {
    Db::in_memory()
        .await
        .expect("Failed to create in-memory database")
}

/// Create a test app over an in-memory database with dev login.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub async fn create_test_app() -> (Router, Arc<AppState>) {
    create_test_app_with_config(Config::test_default()).await
}

#[allow(dead_code)]
pub async fn create_test_app_with_config(config: Config) -> (Router, Arc<AppState>) {
    let db = test_db().await;
    let state = Arc::new(AppState::new(config, db).expect("Failed to build app state"));
    (create_router(state.clone()), state)
}

/// Create a user and a session for them directly; returns the session token.
#[allow(dead_code)]
pub async fn login_as(state: &AppState, user_id: &str) -> String {
    state
        .db
        .upsert_user(&UpsertUser {
            id: user_id.to_string(),
            email: Some(format!("{user_id}@example.com")),
            first_name: Some("Test".to_string()),
            last_name: Some(user_id.to_string()),
            profile_image_url: None,
        })
        .await
        .expect("Failed to create test user");

    state
        .sessions
        .create(user_id)
        .await
        .expect("Failed to create session")
}

/// All `Set-Cookie` header values of a response.
#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// The `Set-Cookie` header for `name`; panics if absent.
#[allow(dead_code)]
pub fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

/// Send a request with an optional session token and JSON body.
#[allow(dead_code)]
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("pulse_sid={token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

/// Send a request and decode the JSON response body.
#[allow(dead_code)]
pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = send(app, method, uri, token, body).await;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// A valid registration payload located in central Bengaluru.
#[allow(dead_code)]
pub fn donor_payload(full_name: &str, blood_group: &str, latitude: f64, longitude: f64) -> Value {
    json!({
        "fullName": full_name,
        "age": 29,
        "bloodGroup": blood_group,
        "weight": 64.5,
        "whatsappNumber": "+91 98450 12345",
        "latitude": latitude,
        "longitude": longitude,
        "address": "Indiranagar, Bengaluru"
    })
}

/// Log `user_id` in and register them as a donor; returns (token, donor id).
#[allow(dead_code)]
pub async fn register_donor(
    app: &Router,
    state: &AppState,
    user_id: &str,
    blood_group: &str,
    latitude: f64,
    longitude: f64,
) -> (String, String) {
    let token = login_as(state, user_id).await;
    let (status, body) = send_json(
        app,
        "POST",
        "/api/donors",
        Some(&token),
        Some(donor_payload(user_id, blood_group, latitude, longitude)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "registration failed: {body}");
    let donor_id = body["id"].as_str().unwrap().to_string();
    (token, donor_id)
}
