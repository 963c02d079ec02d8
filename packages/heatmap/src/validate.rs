//! Query parameter validation.
//!
//! Every parameter arrives as an optional string. Blank strings count as
//! absent, numbers are parsed strictly and range-checked against the
//! [`HeatmapConfig`], and nothing is clamped. The first invalid parameter
//! short-circuits with a [`ValidationError`] naming it.

use chrono::{DateTime, Duration, Utc};
use nosmoke_map_geo::{BoundingBox, GeoPoint};
use nosmoke_map_heatmap_models::{HeatmapMode, HeatmapQueryParams, StatsQueryParams};
use nosmoke_map_report::ReportFilter;
use nosmoke_map_report_models::Category;

use crate::config::{HeatmapConfig, ParamRange};

/// Parameter names as they appear in requests.
pub mod param {
    /// Category slug.
    pub const CATEGORY: &str = "category";
    /// Look-back window.
    pub const DAYS: &str = "days";
    /// Display threshold.
    pub const MIN_REPORTS: &str = "min_reports";
    /// Reference point latitude.
    pub const REFERENCE_LAT: &str = "referenceLat";
    /// Reference point longitude.
    pub const REFERENCE_LON: &str = "referenceLon";
    /// Radius around the reference point.
    pub const RADIUS: &str = "radius";
    /// Grid cell size.
    pub const GRID_M: &str = "grid_m";
}

/// A rejected query parameter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// An integer parameter did not parse.
    #[error("Invalid {parameter} parameter '{value}'. Must be an integer.")]
    NotAnInteger {
        /// Parameter name.
        parameter: &'static str,
        /// Raw value received.
        value: String,
    },

    /// A coordinate did not parse as a finite number.
    #[error("Invalid {parameter} parameter '{value}'. Must be a finite number.")]
    NotANumber {
        /// Parameter name.
        parameter: &'static str,
        /// Raw value received.
        value: String,
    },

    /// An integer parameter was outside its accepted range.
    #[error("Invalid {parameter} parameter {value}. Must be between {min} and {max}.")]
    OutOfRange {
        /// Parameter name.
        parameter: &'static str,
        /// Parsed value.
        value: i64,
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
    },

    /// The category is not one of the configured categories.
    #[error("Invalid category '{value}'. Must be one of: {allowed}")]
    UnknownCategory {
        /// Raw value received.
        value: String,
        /// Accepted categories, comma separated.
        allowed: String,
    },

    /// Only one half of the reference point was given.
    #[error("Missing {missing} parameter. referenceLat and referenceLon must be given together.")]
    IncompleteReferencePoint {
        /// The parameter that was absent.
        missing: &'static str,
    },

    /// The reference point lies outside the service region.
    #[error("Reference point ({latitude}, {longitude}) is outside the service region.")]
    ReferenceOutsideRegion {
        /// Parsed latitude.
        latitude: f64,
        /// Parsed longitude.
        longitude: f64,
    },
}

impl ValidationError {
    /// Name of the offending parameter.
    #[must_use]
    pub const fn parameter(&self) -> &'static str {
        match self {
            Self::NotAnInteger { parameter, .. }
            | Self::NotANumber { parameter, .. }
            | Self::OutOfRange { parameter, .. } => parameter,
            Self::UnknownCategory { .. } => param::CATEGORY,
            Self::IncompleteReferencePoint { missing } => missing,
            Self::ReferenceOutsideRegion { .. } => param::REFERENCE_LAT,
        }
    }
}

/// A reference point and the radius around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceArea {
    /// The reference point.
    pub center: GeoPoint,
    /// Radius in meters.
    pub radius_meters: u32,
}

impl ReferenceArea {
    /// Coarse box enclosing the radius, for store-side prefiltering.
    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::around(self.center, f64::from(self.radius_meters))
    }

    /// Whether a point lies within the radius.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.center.distance_to(latitude, longitude) <= f64::from(self.radius_meters)
    }
}

/// A fully validated heatmap query.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapQuery {
    /// Category to restrict to.
    pub category: Option<Category>,
    /// Look-back window in days.
    pub days: u32,
    /// Minimum reports per displayed cell.
    pub min_reports: u32,
    /// Reference point and radius, in nearby mode.
    pub reference: Option<ReferenceArea>,
    /// Grid cell size in meters.
    pub cell_size_meters: u32,
}

impl HeatmapQuery {
    /// Nearby when a reference point was given, wide otherwise.
    #[must_use]
    pub const fn mode(&self) -> HeatmapMode {
        if self.reference.is_some() {
            HeatmapMode::Nearby
        } else {
            HeatmapMode::Wide
        }
    }

    /// Start of the look-back window ending at `now`.
    #[must_use]
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        window_start(self.days, now)
    }

    /// Store filter for this query.
    #[must_use]
    pub fn report_filter(&self, now: DateTime<Utc>, limit: u32) -> ReportFilter {
        ReportFilter {
            since: self.since(now),
            category: self.category.clone(),
            bbox: self.reference.as_ref().map(ReferenceArea::bounding_box),
            limit,
        }
    }
}

pub(crate) fn window_start(days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(i64::from(days))
}

/// Validates raw heatmap parameters.
///
/// Checks run in a fixed order: category, days, min reports, reference
/// point, radius, then cell size. The radius is range-checked whenever it
/// is present, even without a reference point.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate_query(
    params: &HeatmapQueryParams,
    config: &HeatmapConfig,
) -> Result<HeatmapQuery, ValidationError> {
    let category = match present(params.category.as_ref()) {
        None => None,
        Some(raw) => Some(config.categories.get(raw).cloned().ok_or_else(|| {
            ValidationError::UnknownCategory {
                value: raw.to_string(),
                allowed: config.categories.to_string(),
            }
        })?),
    };

    let days = bounded_int(param::DAYS, present(params.days.as_ref()), &config.days)?;
    let min_reports = bounded_int(
        param::MIN_REPORTS,
        present(params.min_reports.as_ref()),
        &config.min_reports,
    )?;

    let center = reference_point(params, config)?;
    let radius_meters = bounded_int(
        param::RADIUS,
        present(params.radius.as_ref()),
        &config.radius_meters,
    )?;
    let reference = center.map(|center| ReferenceArea {
        center,
        radius_meters,
    });

    let sizes = &config.cell_size_meters;
    let default_size = if reference.is_some() {
        sizes.nearby_default
    } else {
        sizes.wide_default
    };
    let cell_size_meters = bounded_int(
        param::GRID_M,
        present(params.grid_m.as_ref()),
        &ParamRange::new(sizes.min, sizes.max, default_size),
    )?;

    Ok(HeatmapQuery {
        category,
        days,
        min_reports,
        reference,
        cell_size_meters,
    })
}

/// Validates raw stats parameters, returning the window length in days.
///
/// # Errors
///
/// Returns a [`ValidationError`] if `days` is malformed or out of range.
pub fn validate_stats_days(
    params: &StatsQueryParams,
    config: &HeatmapConfig,
) -> Result<u32, ValidationError> {
    bounded_int(param::DAYS, present(params.days.as_ref()), &config.days)
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn bounded_int(
    parameter: &'static str,
    raw: Option<&str>,
    range: &ParamRange,
) -> Result<u32, ValidationError> {
    let Some(raw) = raw else {
        return Ok(range.default);
    };

    let value: i64 = raw.parse().map_err(|_| ValidationError::NotAnInteger {
        parameter,
        value: raw.to_string(),
    })?;

    u32::try_from(value)
        .ok()
        .filter(|v| (range.min..=range.max).contains(v))
        .ok_or(ValidationError::OutOfRange {
            parameter,
            value,
            min: range.min,
            max: range.max,
        })
}

fn coordinate(parameter: &'static str, raw: &str) -> Result<f64, ValidationError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::NotANumber {
            parameter,
            value: raw.to_string(),
        })
}

fn reference_point(
    params: &HeatmapQueryParams,
    config: &HeatmapConfig,
) -> Result<Option<GeoPoint>, ValidationError> {
    let (raw_lat, raw_lon) = match (
        present(params.reference_lat.as_ref()),
        present(params.reference_lon.as_ref()),
    ) {
        (None, None) => return Ok(None),
        (Some(_), None) => {
            return Err(ValidationError::IncompleteReferencePoint {
                missing: param::REFERENCE_LON,
            });
        }
        (None, Some(_)) => {
            return Err(ValidationError::IncompleteReferencePoint {
                missing: param::REFERENCE_LAT,
            });
        }
        (Some(lat), Some(lon)) => (lat, lon),
    };

    let latitude = coordinate(param::REFERENCE_LAT, raw_lat)?;
    let longitude = coordinate(param::REFERENCE_LON, raw_lon)?;
    if !config.region.contains(latitude, longitude) {
        return Err(ValidationError::ReferenceOutsideRegion {
            latitude,
            longitude,
        });
    }

    Ok(Some(GeoPoint::new(latitude, longitude)))
}
