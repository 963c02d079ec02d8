#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Request and response types for the report heatmap.
//!
//! Query parameters arrive as raw strings (typically an HTTP query string)
//! and are parsed and range-checked by the heatmap pipeline, not here.
//! Responses convert into a `GeoJSON` `FeatureCollection` for the map layer.

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use nosmoke_map_report_models::{Category, CategoryCounts};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Raw query parameters for the heatmap.
///
/// Every field is the unparsed string as received. Empty strings count as
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapQueryParams {
    /// Category slug to restrict to.
    #[serde(default)]
    pub category: Option<String>,
    /// Look-back window in days.
    #[serde(default)]
    pub days: Option<String>,
    /// Minimum reports for a cell to be shown.
    #[serde(default)]
    pub min_reports: Option<String>,
    /// Reference point latitude.
    #[serde(default, rename = "referenceLat", alias = "userLat")]
    pub reference_lat: Option<String>,
    /// Reference point longitude.
    #[serde(default, rename = "referenceLon", alias = "userLon")]
    pub reference_lon: Option<String>,
    /// Radius around the reference point, in meters.
    #[serde(default)]
    pub radius: Option<String>,
    /// Grid cell size, in meters.
    #[serde(default)]
    pub grid_m: Option<String>,
}

/// Raw query parameters for the stats breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsQueryParams {
    /// Look-back window in days.
    #[serde(default)]
    pub days: Option<String>,
}

/// Whether a query is centered on a reference point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HeatmapMode {
    /// Around a reference point, with a radius filter and finer cells.
    Nearby,
    /// The whole region, with coarser cells.
    Wide,
}

/// Properties of one heatmap feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    /// Reports in the cell.
    pub count: u64,
    /// Most reported category in the cell.
    pub category: Category,
    /// Reports per category.
    pub categories: CategoryCounts,
    /// Percentage of reports near the reference point that fall in this
    /// cell. Absent outside nearby mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density_ratio: Option<f64>,
    /// Count relative to the busiest cell shown (0-1).
    pub intensity: f64,
}

/// One cell of the heatmap.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapFeature {
    /// Cell center as `[longitude, latitude]`.
    pub coordinates: [f64; 2],
    /// Cell properties.
    pub properties: FeatureProperties,
}

impl HeatmapFeature {
    /// Cell center longitude.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    /// Cell center latitude.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.coordinates[1]
    }
}

impl TryFrom<&HeatmapFeature> for Feature {
    type Error = serde_json::Error;

    fn try_from(feature: &HeatmapFeature) -> Result<Self, Self::Error> {
        let properties = match serde_json::to_value(&feature.properties)? {
            serde_json::Value::Object(map) => map,
            _ => JsonObject::new(),
        };

        Ok(Self {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(feature.coordinates.to_vec()))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        })
    }
}

/// The heatmap for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapResponse {
    /// Whether the query was centered on a reference point.
    pub mode: HeatmapMode,
    /// Grid cell size used, in meters.
    pub cell_size_meters: u32,
    /// Cells at or above the minimum report count.
    pub features: Vec<HeatmapFeature>,
}

impl TryFrom<&HeatmapResponse> for FeatureCollection {
    type Error = serde_json::Error;

    fn try_from(response: &HeatmapResponse) -> Result<Self, Self::Error> {
        let features = response
            .features
            .iter()
            .map(Feature::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            bbox: None,
            features,
            foreign_members: None,
        })
    }
}

/// Reports attributed to one location label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationCount {
    /// Prefecture name.
    pub prefecture: String,
    /// City/ward name.
    pub city: String,
    /// Number of reports.
    pub count: u64,
}

/// Summary of recent reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStats {
    /// Reports in the window.
    pub total_reports: u64,
    /// Reports per category, in first-seen order.
    pub category_breakdown: CategoryCounts,
    /// Busiest locations, most reports first.
    pub top_locations: Vec<LocationCount>,
    /// Window length in days.
    pub period_days: u32,
}

/// Broad class of a heatmap failure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// A request parameter was outside its accepted domain.
    Validation,
    /// The report store could not be queried.
    DataUnavailable,
    /// An invariant was violated; indicates a bug.
    Internal,
}

/// Caller-facing error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Error class.
    pub kind: ErrorKind,
    /// Offending parameter, for validation errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    /// Human-readable message.
    pub message: String,
}
