// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Donor profile model, request payloads, and their validation rules.

use crate::geo_utils::{is_valid_latitude, is_valid_longitude};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::{Validate, ValidationError, ValidationErrors};

/// ABO/Rh blood group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodGroup {
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::APositive,
        BloodGroup::ANegative,
        BloodGroup::BPositive,
        BloodGroup::BNegative,
        BloodGroup::AbPositive,
        BloodGroup::AbNegative,
        BloodGroup::OPositive,
        BloodGroup::ONegative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodGroup::APositive => "A+",
            BloodGroup::ANegative => "A-",
            BloodGroup::BPositive => "B+",
            BloodGroup::BNegative => "B-",
            BloodGroup::AbPositive => "AB+",
            BloodGroup::AbNegative => "AB-",
            BloodGroup::OPositive => "O+",
            BloodGroup::ONegative => "O-",
        }
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown blood group '{0}' (expected one of A+, A-, B+, B-, AB+, AB-, O+, O-)")]
pub struct UnknownBloodGroup(pub String);

impl FromStr for BloodGroup {
    type Err = UnknownBloodGroup;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        BloodGroup::ALL
            .into_iter()
            .find(|group| group.as_str() == normalized)
            .ok_or_else(|| UnknownBloodGroup(s.to_string()))
    }
}

impl TryFrom<String> for BloodGroup {
    type Error = UnknownBloodGroup;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Stored donor profile.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Donor {
    pub id: String,
    /// Owning user (one donor per user)
    pub user_id: String,
    pub full_name: String,
    pub age: i64,
    #[sqlx(try_from = "String")]
    pub blood_group: BloodGroup,
    /// Weight in kilograms
    pub weight: f64,
    pub whatsapp_number: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub last_donation_date: Option<DateTime<Utc>>,
    pub credits: i64,
    pub total_donations: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Search hit: a donor plus its distance from the query point.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DonorMatch {
    #[serde(flatten)]
    pub donor: Donor,
    /// Kilometers, rounded to one decimal
    pub distance: f64,
}

/// Current credit standing of a donor.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CreditBalance {
    pub donor_id: String,
    pub credits: i64,
    pub total_donations: i64,
}

/// Registration payload (`POST /api/donors`).
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DonorProfile {
    #[validate(length(min = 1, max = 100, message = "Full name must be 1-100 characters"))]
    pub full_name: String,
    #[validate(range(
        min = 18,
        max = 65,
        message = "Donors must be between 18 and 65 years old"
    ))]
    pub age: i64,
    pub blood_group: String,
    #[validate(range(exclusive_min = 0.0, message = "Weight must be greater than 0"))]
    pub weight: f64,
    pub whatsapp_number: String,
    pub latitude: f64,
    pub longitude: f64,
    #[validate(length(min = 1, max = 255, message = "Address must be 1-255 characters"))]
    pub address: String,
    #[serde(default)]
    pub last_donation_date: Option<DateTime<Utc>>,
}

/// Partial profile update (`PATCH /api/donors/{id}`); absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DonorPatch {
    #[validate(length(min = 1, max = 100, message = "Full name must be 1-100 characters"))]
    pub full_name: Option<String>,
    #[validate(range(
        min = 18,
        max = 65,
        message = "Donors must be between 18 and 65 years old"
    ))]
    pub age: Option<i64>,
    pub blood_group: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "Weight must be greater than 0"))]
    pub weight: Option<f64>,
    pub whatsapp_number: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[validate(length(min = 1, max = 255, message = "Address must be 1-255 characters"))]
    pub address: Option<String>,
    pub last_donation_date: Option<DateTime<Utc>>,
}

impl DonorProfile {
    /// Run every field rule; errors are keyed by field name.
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);

        collect(&mut errors, "full_name", validate_not_blank(&self.full_name));
        collect(&mut errors, "address", validate_not_blank(&self.address));
        collect(&mut errors, "blood_group", validate_blood_group(&self.blood_group));
        collect(
            &mut errors,
            "whatsapp_number",
            validate_whatsapp_number(&self.whatsapp_number),
        );
        collect(&mut errors, "latitude", validate_latitude(self.latitude));
        collect(&mut errors, "longitude", validate_longitude(self.longitude));
        if let Some(date) = &self.last_donation_date {
            collect(&mut errors, "last_donation_date", validate_not_in_future(date));
        }

        finish(errors)
    }
}

impl DonorPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.age.is_none()
            && self.blood_group.is_none()
            && self.weight.is_none()
            && self.whatsapp_number.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.address.is_none()
            && self.last_donation_date.is_none()
    }

    /// Same rules as registration, applied only to the fields present.
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);

        if let Some(name) = &self.full_name {
            collect(&mut errors, "full_name", validate_not_blank(name));
        }
        if let Some(address) = &self.address {
            collect(&mut errors, "address", validate_not_blank(address));
        }
        if let Some(group) = &self.blood_group {
            collect(&mut errors, "blood_group", validate_blood_group(group));
        }
        if let Some(number) = &self.whatsapp_number {
            collect(&mut errors, "whatsapp_number", validate_whatsapp_number(number));
        }
        if let Some(latitude) = self.latitude {
            collect(&mut errors, "latitude", validate_latitude(latitude));
        }
        if let Some(longitude) = self.longitude {
            collect(&mut errors, "longitude", validate_longitude(longitude));
        }
        if let Some(date) = &self.last_donation_date {
            collect(&mut errors, "last_donation_date", validate_not_in_future(date));
        }

        finish(errors)
    }
}

fn collect(errors: &mut ValidationErrors, field: &'static str, result: Result<(), ValidationError>) {
    if let Err(err) = result {
        errors.add(field, err);
    }
}

fn finish(errors: ValidationErrors) -> Result<(), ValidationErrors> {
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn invalid(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Length rules see the raw string; stored values are trimmed.
fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(invalid("blank", "Must not be blank"))
    } else {
        Ok(())
    }
}

fn validate_blood_group(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<BloodGroup>()
        .map(|_| ())
        .map_err(|e| invalid("blood_group", e.to_string()))
}

/// 7-15 digits with an optional leading `+`; spaces, dashes, dots and parentheses are ignored.
fn validate_whatsapp_number(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let mut digits = 0;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(invalid(
                    "whatsapp_number",
                    "WhatsApp number may only contain digits, spaces, dashes and a leading +",
                ))
            }
        }
    }

    if !(7..=15).contains(&digits) {
        return Err(invalid(
            "whatsapp_number",
            "WhatsApp number must have between 7 and 15 digits",
        ));
    }
    Ok(())
}

fn validate_latitude(value: f64) -> Result<(), ValidationError> {
    if is_valid_latitude(value) {
        Ok(())
    } else {
        Err(invalid("latitude", "Latitude must be between -90 and 90"))
    }
}

fn validate_longitude(value: f64) -> Result<(), ValidationError> {
    if is_valid_longitude(value) {
        Ok(())
    } else {
        Err(invalid("longitude", "Longitude must be between -180 and 180"))
    }
}

fn validate_not_in_future(value: &DateTime<Utc>) -> Result<(), ValidationError> {
    if *value > Utc::now() {
        return Err(invalid(
            "last_donation_date",
            "Last donation date cannot be in the future",
        ));
    }
    Ok(())
}
