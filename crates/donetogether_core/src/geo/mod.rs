//! Great-circle distance helpers.
//!
//! # Responsibility
//! - Compute distances between degree coordinates on a spherical Earth.
//! - Render coordinate fallback labels for targets without a place name.

mod haversine;

pub use haversine::{distance_meters, format_coordinates, haversine_km, EARTH_RADIUS_KM};
