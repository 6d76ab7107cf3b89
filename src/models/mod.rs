// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod donor;
pub mod session;
pub mod user;

pub use donor::{BloodGroup, CreditBalance, Donor, DonorMatch, DonorPatch, DonorProfile};
pub use session::SessionData;
pub use user::{UpsertUser, User};
