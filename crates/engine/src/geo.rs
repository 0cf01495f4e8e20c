//! Geographic primitives: WGS84 coordinates, great-circle distance, and the
//! configured study-area bounding box.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters used for haversine distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Approximate meters per degree of latitude.
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// A point on the Earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_m(&self, other: &Coordinate) -> f64 {
        haversine_m(self.lat, self.lon, other.lat, other.lon)
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Haversine distance between two lat/lon pairs, in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Degrees of longitude spanned by `meters` at latitude `lat`.
///
/// Used to size lat/lon bucket searches; never returns less than the latitude
/// span so polar inputs stay bounded.
pub fn meters_to_lon_degrees(meters: f64, lat: f64) -> f64 {
    let cos = lat.to_radians().cos().abs().max(1e-6);
    meters / (METERS_PER_DEGREE_LAT * cos)
}

pub fn meters_to_lat_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE_LAT
}

/// Axis-aligned bounding box of the study area. Reports outside it are
/// malformed input and never scored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StudyBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl StudyBounds {
    /// Mahanadi delta, Odisha.
    pub const MAHANADI_DELTA: StudyBounds = StudyBounds {
        min_lat: 19.5,
        max_lat: 21.5,
        min_lon: 84.5,
        max_lon: 87.0,
    };

    pub fn contains(&self, coord: &Coordinate) -> bool {
        coord.lat >= self.min_lat
            && coord.lat <= self.max_lat
            && coord.lon >= self.min_lon
            && coord.lon <= self.max_lon
    }

    pub fn is_well_formed(&self) -> bool {
        self.min_lat.is_finite()
            && self.max_lat.is_finite()
            && self.min_lon.is_finite()
            && self.max_lon.is_finite()
            && self.min_lat < self.max_lat
            && self.min_lon < self.max_lon
            && self.min_lat >= -90.0
            && self.max_lat <= 90.0
            && self.min_lon >= -180.0
            && self.max_lon <= 180.0
    }
}

impl Default for StudyBounds {
    fn default() -> Self {
        Self::MAHANADI_DELTA
    }
}
