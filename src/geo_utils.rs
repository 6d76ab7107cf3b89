// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Great-circle distance helpers.

use geo::{Distance, Haversine, Point};

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    fn to_point(self) -> Point<f64> {
        // geo points are (x, y) = (lon, lat)
        Point::new(self.longitude, self.latitude)
    }
}

pub fn is_valid_latitude(latitude: f64) -> bool {
    latitude.is_finite() && (-90.0..=90.0).contains(&latitude)
}

pub fn is_valid_longitude(longitude: f64) -> bool {
    longitude.is_finite() && (-180.0..=180.0).contains(&longitude)
}

/// Haversine distance in kilometers on a spherical Earth.
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    Haversine.distance(a.to_point(), b.to_point()) / 1000.0
}

/// Round a distance to one decimal place for display.
pub fn round_to_tenth(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}
