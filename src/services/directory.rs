// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Donor directory: registration, lookup, profile edits, and radius search.

use crate::db::{sqlite::NewDonor, Db};
use crate::error::{AppError, FieldErrors};
use crate::geo_utils::{
    distance_km, is_valid_latitude, is_valid_longitude, round_to_tenth, Coordinates,
};
use crate::models::{BloodGroup, Donor, DonorMatch, DonorPatch, DonorProfile};
use chrono::Utc;

/// Search radius used when the caller does not give one.
pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 10.0;
/// Largest search radius accepted.
pub const MAX_SEARCH_RADIUS_KM: f64 = 500.0;

/// Donor profile operations over the relational store.
#[derive(Clone)]
pub struct DonorDirectory {
    db: Db,
}

impl DonorDirectory {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Register the caller as a donor. One donor profile per user.
    pub async fn register_donor(
        &self,
        user_id: &str,
        profile: DonorProfile,
    ) -> Result<Donor, AppError> {
        profile.check()?;

        let blood_group = profile
            .blood_group
            .parse::<BloodGroup>()
            .map_err(|e| AppError::invalid_field("bloodGroup", e.to_string()))?;

        let new_donor = NewDonor {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            full_name: profile.full_name.trim().to_string(),
            age: profile.age,
            blood_group,
            weight: profile.weight,
            whatsapp_number: profile.whatsapp_number.trim().to_string(),
            latitude: profile.latitude,
            longitude: profile.longitude,
            address: profile.address.trim().to_string(),
            last_donation_date: profile.last_donation_date,
            created_at: Utc::now(),
        };

        let donor = self.db.insert_donor(&new_donor).await?;

        tracing::info!(
            donor_id = %donor.id,
            user_id = %user_id,
            blood_group = %donor.blood_group,
            "Donor registered"
        );

        Ok(donor)
    }

    pub async fn get_donor(&self, donor_id: &str) -> Result<Donor, AppError> {
        self.db
            .get_donor(donor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Donor {}", donor_id)))
    }

    pub async fn get_donor_by_user(&self, user_id: &str) -> Result<Donor, AppError> {
        self.db
            .get_donor_by_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No donor profile for current user".to_string()))
    }

    /// Donors within `radius_km` of `center`, nearest first.
    pub async fn search_donors(
        &self,
        center: Coordinates,
        radius_km: f64,
        blood_group: Option<BloodGroup>,
    ) -> Result<Vec<DonorMatch>, AppError> {
        validate_search(center, radius_km)?;

        let candidates = self.db.list_donors(blood_group).await?;
        let matches = rank_by_distance(candidates, center, radius_km);

        tracing::debug!(
            latitude = center.latitude,
            longitude = center.longitude,
            radius_km,
            blood_group = blood_group.map(|g| g.as_str()),
            count = matches.len(),
            "Donor search"
        );

        Ok(matches)
    }

    /// Apply a partial profile edit on behalf of `requester_id`.
    ///
    /// Only the donor's owner may edit. An empty patch returns the donor unchanged.
    pub async fn update_donor_profile(
        &self,
        requester_id: &str,
        donor_id: &str,
        patch: DonorPatch,
    ) -> Result<Donor, AppError> {
        let existing = self.get_donor(donor_id).await?;
        if existing.user_id != requester_id {
            return Err(AppError::Forbidden(
                "Only the donor may edit this profile".to_string(),
            ));
        }

        patch.check()?;
        if patch.is_empty() {
            return Ok(existing);
        }

        let blood_group = patch
            .blood_group
            .as_deref()
            .map(str::parse::<BloodGroup>)
            .transpose()
            .map_err(|e| AppError::invalid_field("bloodGroup", e.to_string()))?;

        let patch = DonorPatch {
            full_name: patch.full_name.map(|s| s.trim().to_string()),
            whatsapp_number: patch.whatsapp_number.map(|s| s.trim().to_string()),
            address: patch.address.map(|s| s.trim().to_string()),
            ..patch
        };

        let donor = self
            .db
            .update_donor(donor_id, &patch, blood_group)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Donor {}", donor_id)))?;

        tracing::info!(donor_id = %donor.id, "Donor profile updated");
        Ok(donor)
    }
}

/// Check search center and radius before touching the store.
///
/// Errors are reported per query parameter, like profile validation.
pub fn validate_search(center: Coordinates, radius_km: f64) -> Result<(), AppError> {
    let mut fields = FieldErrors::new();
    if !is_valid_latitude(center.latitude) {
        fields.insert(
            "lat".to_string(),
            vec!["Latitude must be between -90 and 90".to_string()],
        );
    }
    if !is_valid_longitude(center.longitude) {
        fields.insert(
            "lon".to_string(),
            vec!["Longitude must be between -180 and 180".to_string()],
        );
    }
    if !radius_km.is_finite() || radius_km <= 0.0 || radius_km > MAX_SEARCH_RADIUS_KM {
        fields.insert(
            "radiusKm".to_string(),
            vec![format!(
                "Radius must be greater than 0 and at most {} km",
                MAX_SEARCH_RADIUS_KM
            )],
        );
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(fields))
    }
}

/// Keep donors within `radius_km` of `center` and sort them nearest first.
///
/// Filtering and ordering use the exact distance; only the reported
/// `distance` is rounded to one decimal.
pub fn rank_by_distance(
    donors: impl IntoIterator<Item = Donor>,
    center: Coordinates,
    radius_km: f64,
) -> Vec<DonorMatch> {
    let mut within: Vec<(f64, Donor)> = donors
        .into_iter()
        .filter_map(|donor| {
            let km = distance_km(center, Coordinates::new(donor.latitude, donor.longitude));
            (km <= radius_km).then_some((km, donor))
        })
        .collect();

    within.sort_by(|a, b| a.0.total_cmp(&b.0));

    within
        .into_iter()
        .map(|(km, donor)| DonorMatch {
            donor,
            distance: round_to_tenth(km),
        })
        .collect()
}
