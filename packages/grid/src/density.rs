//! Density ratio and intensity scoring of grid cells.

use nosmoke_map_geo::{GeoPoint, round_to};
use nosmoke_map_report_models::{Category, Report};

use crate::grid::{CellKey, GridCell, GridCells};

/// Decimal places kept on density ratios (a percentage).
const DENSITY_DECIMALS: i32 = 2;

/// Decimal places kept on intensities (a 0-1 fraction).
const INTENSITY_DECIMALS: i32 = 3;

/// A grid cell with no reports reached scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("grid cell ({}, {}) has no reports", key.lat_index, key.lon_index)]
pub struct EmptyCellError {
    /// The offending cell.
    pub key: CellKey,
}

/// The reference population density ratios are measured against: every
/// report within `radius_meters` of `center`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityReference {
    /// Reference point.
    pub center: GeoPoint,
    /// Radius around the reference point, in meters.
    pub radius_meters: f64,
    /// Individual reports (not cells) within the radius.
    pub total_in_range: u64,
}

impl DensityReference {
    /// Counts the reports in `reports` that lie within `radius_meters` of
    /// `center`.
    #[must_use]
    pub fn from_reports(center: GeoPoint, radius_meters: f64, reports: &[Report]) -> Self {
        let total_in_range = reports
            .iter()
            .filter(|r| center.distance_to(r.latitude, r.longitude) <= radius_meters)
            .count() as u64;

        Self {
            center,
            radius_meters,
            total_in_range,
        }
    }

    /// Share of the reference population in `cell`, as a percentage.
    ///
    /// `None` when the reference population is empty; `Some(0.0)` when the
    /// cell's representative point lies outside the radius.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio_for(&self, cell: &GridCell) -> Option<f64> {
        if self.total_in_range == 0 {
            return None;
        }
        if self.center.distance_to(cell.latitude, cell.longitude) > self.radius_meters {
            return Some(0.0);
        }
        Some(round_to(
            cell.count as f64 / self.total_in_range as f64 * 100.0,
            DENSITY_DECIMALS,
        ))
    }
}

/// A grid cell annotated for output.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCell {
    /// The underlying cell.
    pub cell: GridCell,
    /// Category with the highest count (first-seen wins ties).
    pub primary_category: Category,
    /// Percentage of the reference population in this cell, if there is
    /// one.
    pub density_ratio: Option<f64>,
    /// Count relative to the busiest surviving cell. Zero until
    /// [`assign_intensity`] runs.
    pub intensity: f64,
}

/// Attaches primary category and density ratio to every cell, keeping the
/// cells' key order.
///
/// # Errors
///
/// Returns [`EmptyCellError`] if a cell has no category tallies, which can
/// only happen if the aggregator is broken.
pub fn score_cells(
    cells: GridCells,
    reference: Option<&DensityReference>,
) -> Result<Vec<ScoredCell>, EmptyCellError> {
    cells
        .into_values()
        .map(|cell| {
            if cell.count == 0 {
                return Err(EmptyCellError { key: cell.key });
            }
            let primary_category = cell
                .category_counts
                .primary()
                .cloned()
                .ok_or(EmptyCellError { key: cell.key })?;
            let density_ratio = reference.and_then(|r| r.ratio_for(&cell));

            Ok(ScoredCell {
                cell,
                primary_category,
                density_ratio,
                intensity: 0.0,
            })
        })
        .collect()
}

/// Sets each cell's intensity to its count over the largest count among
/// `cells`. Call this after dropping cells below the display threshold so
/// the busiest displayed cell reads as 1.
#[allow(clippy::cast_precision_loss)]
pub fn assign_intensity(cells: &mut [ScoredCell]) {
    let max_count = cells.iter().map(|c| c.cell.count).max().unwrap_or(0);
    if max_count == 0 {
        return;
    }

    for scored in cells {
        scored.intensity = round_to(
            scored.cell.count as f64 / max_count as f64,
            INTENSITY_DECIMALS,
        );
    }
}
