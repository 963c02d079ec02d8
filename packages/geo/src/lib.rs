#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geographic math shared by the aggregation pipeline.
//!
//! All public functions take and return decimal degrees (or meters).
//! Trigonometry is done in radians internally. The meter/degree
//! conversions use a flat 111 km per degree of latitude, which is what the
//! report grid has always been sized with; they are not geodesically exact
//! and are not meant to be.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by [`haversine_distance_meters`].
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Meters per degree of latitude used for grid sizing.
pub const METERS_PER_DEGREE_LAT: f64 = 111_000.0;

/// Lower bound on `cos(latitude)` so longitude conversions never divide by
/// zero near the poles.
const MIN_COS_LATITUDE: f64 = 0.000_001;

/// Great-circle distance between two points in meters (Haversine).
#[must_use]
pub fn haversine_distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Converts a north-south distance in meters to degrees of latitude.
#[must_use]
pub fn meters_to_lat_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE_LAT
}

/// Converts an east-west distance in meters to degrees of longitude at the
/// given latitude.
#[must_use]
pub fn meters_to_lon_degrees(meters: f64, at_latitude: f64) -> f64 {
    let cos = at_latitude.to_radians().cos().max(MIN_COS_LATITUDE);
    meters / (METERS_PER_DEGREE_LAT * cos)
}

/// Rounds `value` to `digits` decimal places (half away from zero).
#[must_use]
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10_f64.powi(digits);
    (value * factor).round() / factor
}

/// A WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a new point.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Haversine distance to another position, in meters.
    #[must_use]
    pub fn distance_to(&self, latitude: f64, longitude: f64) -> f64 {
        haversine_distance_meters(self.latitude, self.longitude, latitude, longitude)
    }

    /// Whether both coordinates are finite numbers.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// A geographic bounding box in WGS84 coordinates. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Coarse square box around `center` that fully contains the circle of
    /// `radius_meters`. Used as a cheap store-side prefilter only.
    #[must_use]
    pub fn around(center: GeoPoint, radius_meters: f64) -> Self {
        let lat_delta = meters_to_lat_degrees(radius_meters);
        let lon_delta = meters_to_lon_degrees(radius_meters, center.latitude);

        Self {
            west: center.longitude - lon_delta,
            south: center.latitude - lat_delta,
            east: center.longitude + lon_delta,
            north: center.latitude + lat_delta,
        }
    }

    /// Whether the given position lies inside (or on the edge of) the box.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.south..=self.north).contains(&latitude) && (self.west..=self.east).contains(&longitude)
    }

    /// Whether `west <= east` and `south <= north` and every edge is finite.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite())
            && self.west <= self.east
            && self.south <= self.north
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_identical_points() {
        let d = haversine_distance_meters(34.6937, 135.5023, 34.6937, 135.5023);
        assert!(d.abs() < f64::EPSILON);
    }

    #[test]
    fn haversine_one_degree_latitude() {
        // One degree of arc on a 6371 km sphere.
        let d = haversine_distance_meters(34.0, 135.0, 35.0, 135.0);
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = haversine_distance_meters(34.6937, 135.5023, 35.0, 136.0);
        let b = haversine_distance_meters(35.0, 136.0, 34.6937, 135.5023);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn lat_degrees_use_flat_constant() {
        assert!((meters_to_lat_degrees(111_000.0) - 1.0).abs() < 1e-12);
        assert!((meters_to_lat_degrees(75.0) - 75.0 / 111_000.0).abs() < 1e-15);
    }

    #[test]
    fn lon_degrees_widen_with_latitude() {
        let equator = meters_to_lon_degrees(1000.0, 0.0);
        let osaka = meters_to_lon_degrees(1000.0, 34.6937);
        assert!((equator - meters_to_lat_degrees(1000.0)).abs() < 1e-12);
        assert!(osaka > equator);
    }

    #[test]
    fn lon_degrees_stay_finite_at_pole() {
        let v = meters_to_lon_degrees(100.0, 90.0);
        assert!(v.is_finite());
        assert!(v > 0.0);
    }

    #[test]
    fn round_to_decimal_places() {
        assert!((round_to(33.333_333, 2) - 33.33).abs() < 1e-12);
        assert!((round_to(0.666_666, 3) - 0.667).abs() < 1e-12);
        assert!((round_to(1.0, 3) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bbox_around_contains_radius_edge_points() {
        let center = GeoPoint::new(34.6937, 135.5023);
        let bbox = BoundingBox::around(center, 800.0);

        assert!(bbox.contains(center.latitude, center.longitude));
        // 790 m due north and due east are still inside the box
        assert!(bbox.contains(center.latitude + meters_to_lat_degrees(790.0), center.longitude));
        assert!(bbox.contains(
            center.latitude,
            center.longitude + meters_to_lon_degrees(790.0, center.latitude)
        ));
        assert!(!bbox.contains(35.0, 136.0));
    }

    #[test]
    fn bbox_well_formed() {
        assert!(BoundingBox::new(123.0, 24.0, 146.0, 46.0).is_well_formed());
        assert!(!BoundingBox::new(146.0, 24.0, 123.0, 46.0).is_well_formed());
        assert!(!BoundingBox::new(f64::NAN, 24.0, 146.0, 46.0).is_well_formed());
    }
}
