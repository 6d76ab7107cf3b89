// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::geo_utils::Coordinates;
use crate::middleware::auth::AuthUser;
use crate::models::{BloodGroup, CreditBalance, Donor, DonorMatch, DonorPatch, DonorProfile, User};
use crate::services::contact::whatsapp_link;
use crate::services::directory::DEFAULT_SEARCH_RADIUS_KM;
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require an authenticated session).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/user", get(get_current_user))
        .route("/api/donors", post(register_donor))
        .route("/api/donors/me", get(get_my_donor))
        .route("/api/donors/search", get(search_donors))
        .route("/api/donors/{id}", patch(update_donor))
        .route("/api/donors/{id}/donate", post(record_donation))
        .route("/api/donors/{id}/credits", get(get_credits))
        .route("/api/donors/{id}/contact", get(get_contact))
}

// ─── User Profile ────────────────────────────────────────────

/// Get the logged-in user.
async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<User>> {
    let profile = state
        .db
        .get_user(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;
    Ok(Json(profile))
}

// ─── Donor Profiles ──────────────────────────────────────────

/// Register the current user as a donor.
async fn register_donor(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: std::result::Result<Json<DonorProfile>, JsonRejection>,
) -> Result<(StatusCode, Json<Donor>)> {
    let Json(profile) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let donor = state.directory.register_donor(&user.user_id, profile).await?;
    Ok((StatusCode::CREATED, Json(donor)))
}

/// The current user's donor profile.
async fn get_my_donor(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Donor>> {
    Ok(Json(state.directory.get_donor_by_user(&user.user_id).await?))
}

/// Edit a donor profile (owner only).
async fn update_donor(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(donor_id): Path<String>,
    payload: std::result::Result<Json<DonorPatch>, JsonRejection>,
) -> Result<Json<Donor>> {
    let Json(patch) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let donor = state
        .directory
        .update_donor_profile(&user.user_id, &donor_id, patch)
        .await?;
    Ok(Json(donor))
}

// ─── Search ──────────────────────────────────────────────────

/// Query parameters for donor search.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub radius_km: Option<f64>,
    #[serde(default)]
    pub blood_group: Option<String>,
}

/// Donors near a point, nearest first.
async fn search_donors(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<DonorMatch>>> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let blood_group = parse_blood_group_filter(params.blood_group.as_deref())?;
    let matches = state
        .directory
        .search_donors(
            Coordinates::new(params.lat, params.lon),
            params.radius_km.unwrap_or(DEFAULT_SEARCH_RADIUS_KM),
            blood_group,
        )
        .await?;

    Ok(Json(matches))
}

/// `None` for no filter. An unencoded `+` in a query string arrives as a
/// space, so `"A "` is read as `A+`.
fn parse_blood_group_filter(raw: Option<&str>) -> Result<Option<BloodGroup>> {
    let Some(raw) = raw.map(str::trim_start) else {
        return Ok(None);
    };
    if raw.trim().is_empty() || raw.trim().eq_ignore_ascii_case("all") {
        return Ok(None);
    }

    raw.replace(' ', "+")
        .parse::<BloodGroup>()
        .map(Some)
        .map_err(|e| AppError::invalid_field("bloodGroup", e.to_string()))
}

// ─── Credits ─────────────────────────────────────────────────

/// Record a donation for a donor: +5 credits, +1 donation.
async fn record_donation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(donor_id): Path<String>,
) -> Result<Json<Donor>> {
    tracing::info!(donor_id = %donor_id, recorded_by = %user.user_id, "Recording donation");
    Ok(Json(state.ledger.record_donation(&donor_id).await?))
}

async fn get_credits(
    State(state): State<Arc<AppState>>,
    Path(donor_id): Path<String>,
) -> Result<Json<CreditBalance>> {
    Ok(Json(state.ledger.get_balance(&donor_id).await?))
}

// ─── Contact ─────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ContactResponse {
    pub whatsapp_url: String,
}

async fn get_contact(
    State(state): State<Arc<AppState>>,
    Path(donor_id): Path<String>,
) -> Result<Json<ContactResponse>> {
    let donor = state.directory.get_donor(&donor_id).await?;
    Ok(Json(ContactResponse {
        whatsapp_url: whatsapp_link(&donor),
    }))
}
