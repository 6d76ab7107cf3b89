// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session store tests: signing, expiry, destruction, purge.

use chrono::Utc;
use pulse_connect::services::{SessionResolver, SessionStore};
use pulse_connect::time_utils::unix_seconds;

mod common;

const SECRET: &[u8] = b"test_session_secret_32_bytes_min!";

async fn store_with_ttl(ttl: chrono::Duration) -> SessionStore {
    let db = common::test_db().await;
    db.upsert_user(&pulse_connect::models::UpsertUser {
        id: "user-1".to_string(),
        email: None,
        first_name: None,
        last_name: None,
        profile_image_url: None,
    })
    .await
    .unwrap();
    SessionStore::new(db, SECRET, ttl).unwrap()
}

#[tokio::test]
async fn test_create_and_resolve() {
    let store = store_with_ttl(chrono::Duration::days(7)).await;
    let token = store.create("user-1").await.unwrap();

    let (sid, signature) = token.split_once('.').unwrap();
    assert_eq!(sid.len(), 43);
    assert_eq!(signature.len(), 64);

    assert_eq!(store.resolve(&token).await.unwrap().as_deref(), Some("user-1"));
    assert_eq!(store.resolve(&token).await.unwrap().as_deref(), Some("user-1"));
}

#[tokio::test]
async fn test_resolve_slides_expiry_forward() {
    let db = common::test_db().await;
    let store = SessionStore::new(db.clone(), SECRET, chrono::Duration::hours(1)).unwrap();
    let token = store.create("user-1").await.unwrap();
    let (sid, _) = token.split_once('.').unwrap();

    // Leave the session a few seconds from expiring
    let now = unix_seconds(Utc::now());
    db.touch_session(sid, now + 5).await.unwrap();
    let before = db.find_live_session(sid, now).await.unwrap().unwrap().expire;
    assert_eq!(before, now + 5);

    assert_eq!(store.resolve(&token).await.unwrap().as_deref(), Some("user-1"));

    let after = db.find_live_session(sid, now).await.unwrap().unwrap().expire;
    assert!(after > before, "expiry did not move: {before} -> {after}");
    assert!(after >= now + 3600, "expiry not renewed to full ttl: {after}");

    // Still alive past the original expiry
    let later = now + 60;
    assert!(db.find_live_session(sid, later).await.unwrap().is_some());
}

#[tokio::test]
async fn test_tampered_tokens_are_rejected() {
    let store = store_with_ttl(chrono::Duration::days(7)).await;
    let token = store.create("user-1").await.unwrap();
    let (sid, signature) = token.split_once('.').unwrap();

    let mut flipped = signature.to_string();
    let last = if flipped.ends_with('0') { "1" } else { "0" };
    flipped.replace_range(flipped.len() - 1.., last);

    let candidates = [
        format!("{sid}.{flipped}"),
        format!("{sid}x.{signature}"),
        sid.to_string(),
        format!(".{signature}"),
        String::new(),
        "garbage".to_string(),
    ];
    for candidate in candidates {
        assert_eq!(
            store.resolve(&candidate).await.unwrap(),
            None,
            "accepted {candidate:?}"
        );
    }
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let store = store_with_ttl(chrono::Duration::days(7)).await;
    let token = store.create("user-1").await.unwrap();

    let other = SessionStore::new(
        common::test_db().await,
        b"another_secret_that_is_long_enough",
        chrono::Duration::days(7),
    )
    .unwrap();
    assert_eq!(other.resolve(&token).await.unwrap(), None);
}

#[tokio::test]
async fn test_expired_session_resolves_to_nobody() {
    let store = store_with_ttl(chrono::Duration::seconds(-10)).await;
    let token = store.create("user-1").await.unwrap();

    assert_eq!(store.resolve(&token).await.unwrap(), None);
    assert_eq!(store.purge_expired().await.unwrap(), 1);
    assert_eq!(store.purge_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn test_destroy() {
    let store = store_with_ttl(chrono::Duration::days(7)).await;
    let token = store.create("user-1").await.unwrap();

    store.destroy(&token).await.unwrap();
    assert_eq!(store.resolve(&token).await.unwrap(), None);

    // Destroying unknown or forged tokens is a no-op
    store.destroy(&token).await.unwrap();
    store.destroy("not-a-token").await.unwrap();
}

#[tokio::test]
async fn test_resolver_trait_object() {
    let store = store_with_ttl(chrono::Duration::days(7)).await;
    let token = store.create("user-1").await.unwrap();

    let resolver: std::sync::Arc<dyn SessionResolver> = std::sync::Arc::new(store);
    assert_eq!(
        resolver.resolve_session(&token).await.unwrap().as_deref(),
        Some("user-1")
    );
}
