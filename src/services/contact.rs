// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! WhatsApp deep links for contacting a donor.

use crate::models::Donor;

/// `https://wa.me/<digits>?text=<message>` prefilled with a request for the
/// donor's blood group.
pub fn whatsapp_link(donor: &Donor) -> String {
    let digits: String = donor
        .whatsapp_number
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let message = format!(
        "Hello! I found your profile on PulseConnect and I'm looking for {} blood. \
         Could you please help? Thank you!",
        donor.blood_group
    );
    format!("https://wa.me/{}?text={}", digits, urlencoding::encode(&message))
}
