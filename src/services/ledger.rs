// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Donation credit bookkeeping.

use crate::db::Db;
use crate::error::AppError;
use crate::models::{CreditBalance, Donor};
use chrono::Utc;

/// Credits awarded for each recorded donation.
pub const DONATION_CREDIT_AWARD: i64 = 5;

#[derive(Clone)]
pub struct CreditLedger {
    db: Db,
}

impl CreditLedger {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Credit a donation to `donor_id` and stamp its last donation date.
    pub async fn record_donation(&self, donor_id: &str) -> Result<Donor, AppError> {
        let donor = self
            .db
            .record_donation(donor_id, DONATION_CREDIT_AWARD, Utc::now())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Donor {}", donor_id)))?;

        tracing::info!(
            donor_id = %donor.id,
            credits = donor.credits,
            total_donations = donor.total_donations,
            "Donation recorded"
        );

        Ok(donor)
    }

    pub async fn get_balance(&self, donor_id: &str) -> Result<CreditBalance, AppError> {
        self.db
            .get_balance(donor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Donor {}", donor_id)))
    }
}
