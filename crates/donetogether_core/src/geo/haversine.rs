//! Haversine distance on a sphere of radius 6371 km.
//!
//! # Invariants
//! - Inputs are degrees; `haversine_km` returns kilometers.
//! - Zero-distance and antipodal inputs never produce NaN.

use crate::model::position::Position;

/// Mean Earth radius used by all distance math.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometers between two degree coordinates.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push `a` marginally outside [0, 1] near antipodes.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Distance in meters from `position` to a `(latitude, longitude)` target.
pub fn distance_meters(position: &Position, target: (f64, f64)) -> f64 {
    haversine_km(position.latitude, position.longitude, target.0, target.1) * 1000.0
}

/// Four-decimal `"lat, lon"` label, e.g. `"59.3293, 18.0686"`.
pub fn format_coordinates(latitude: f64, longitude: f64) -> String {
    format!("{latitude:.4}, {longitude:.4}")
}
