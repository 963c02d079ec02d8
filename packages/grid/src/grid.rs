//! Meter-based grid bucketing.
//!
//! Cell dimensions are fixed once per run: the latitude step comes straight
//! from the cell size, the longitude step from the cell size at a single
//! reference latitude. Using one reference latitude for the whole run keeps
//! every cell the same width in degrees, so neighbouring cells tile cleanly.

use std::collections::BTreeMap;

use nosmoke_map_geo::{meters_to_lat_degrees, meters_to_lon_degrees, round_to};
use nosmoke_map_report_models::{CategoryCounts, Report};

/// Decimal places kept on a cell's representative coordinates.
const COORDINATE_DECIMALS: i32 = 6;

/// Integer grid coordinates of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    /// `round(latitude / lat_step)`.
    pub lat_index: i64,
    /// `round(longitude / lon_step)`.
    pub lon_index: i64,
}

/// Cell dimensions for one aggregation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    cell_size_meters: f64,
    lat_step: f64,
    lon_step: f64,
}

impl GridSpec {
    /// Derives degree steps for a `cell_size_meters` grid whose longitude
    /// width is measured at `reference_latitude`.
    ///
    /// # Panics
    ///
    /// Panics if `cell_size_meters` is not a positive finite number. The
    /// query pipeline range-checks it first, so this only fires on a bug.
    #[must_use]
    pub fn new(cell_size_meters: f64, reference_latitude: f64) -> Self {
        assert!(
            cell_size_meters.is_finite() && cell_size_meters > 0.0,
            "cell size must be positive, got {cell_size_meters}"
        );

        Self {
            cell_size_meters,
            lat_step: meters_to_lat_degrees(cell_size_meters),
            lon_step: meters_to_lon_degrees(cell_size_meters, reference_latitude),
        }
    }

    /// Cell height in degrees of latitude.
    #[must_use]
    pub const fn lat_step(&self) -> f64 {
        self.lat_step
    }

    /// Cell width in degrees of longitude.
    #[must_use]
    pub const fn lon_step(&self) -> f64 {
        self.lon_step
    }

    /// The cell containing a position.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn key_for(&self, latitude: f64, longitude: f64) -> CellKey {
        CellKey {
            lat_index: (latitude / self.lat_step).round() as i64,
            lon_index: (longitude / self.lon_step).round() as i64,
        }
    }

    /// Representative `(latitude, longitude)` of a cell, snapped back from
    /// its indices rather than taken from any report in it.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn center_of(&self, key: CellKey) -> (f64, f64) {
        (
            round_to(key.lat_index as f64 * self.lat_step, COORDINATE_DECIMALS),
            round_to(key.lon_index as f64 * self.lon_step, COORDINATE_DECIMALS),
        )
    }
}

/// Reports that fell into one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    /// Grid coordinates.
    pub key: CellKey,
    /// Representative latitude.
    pub latitude: f64,
    /// Representative longitude.
    pub longitude: f64,
    /// Number of reports in the cell.
    pub count: u64,
    /// Reports per category, in first-seen order.
    pub category_counts: CategoryCounts,
}

/// Cells produced by one run. Iteration is in key order, which callers
/// should treat as arbitrary but repeatable.
pub type GridCells = BTreeMap<CellKey, GridCell>;

/// Buckets `reports` into cells of `spec`.
///
/// Every report lands in exactly one cell, so the cell counts always sum to
/// `reports.len()`.
#[must_use]
pub fn aggregate(reports: &[Report], spec: &GridSpec) -> GridCells {
    let mut cells = GridCells::new();

    for report in reports {
        let key = spec.key_for(report.latitude, report.longitude);
        let cell = cells.entry(key).or_insert_with(|| {
            let (latitude, longitude) = spec.center_of(key);
            GridCell {
                key,
                latitude,
                longitude,
                count: 0,
                category_counts: CategoryCounts::new(),
            }
        });
        cell.count += 1;
        cell.category_counts.increment(&report.category);
    }

    log::debug!(
        "Aggregated {} reports into {} cells ({} m grid)",
        reports.len(),
        cells.len(),
        spec.cell_size_meters
    );

    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const OSAKA_LAT: f64 = 34.6937;

    fn report(lat: f64, lon: f64, category: &str) -> Report {
        Report::new(lat, lon, category, Utc::now())
    }

    fn scenario() -> Vec<Report> {
        vec![
            report(34.6937, 135.5023, "walk_smoke"),
            report(34.6937, 135.5024, "walk_smoke"),
            report(34.6900, 135.5100, "stand_smoke"),
            report(35.0, 136.0, "litter"),
        ]
    }

    #[test]
    fn empty_input_yields_no_cells() {
        let cells = aggregate(&[], &GridSpec::new(75.0, OSAKA_LAT));
        assert!(cells.is_empty());
    }

    #[test]
    fn near_duplicates_share_a_cell() {
        let cells = aggregate(&scenario(), &GridSpec::new(75.0, OSAKA_LAT));
        assert_eq!(cells.len(), 3);

        let merged = cells.values().find(|c| c.count == 2).unwrap();
        assert_eq!(merged.category_counts.len(), 1);
        assert_eq!(merged.category_counts.get(&"walk_smoke".into()), 2);

        let singles: Vec<&GridCell> = cells.values().filter(|c| c.count == 1).collect();
        assert_eq!(singles.len(), 2);
    }

    #[test]
    fn every_report_counted_once() {
        let reports = scenario();
        let cells = aggregate(&reports, &GridSpec::new(75.0, OSAKA_LAT));
        let total: u64 = cells.values().map(|c| c.count).sum();
        assert_eq!(total, reports.len() as u64);

        for cell in cells.values() {
            assert_eq!(cell.category_counts.total(), cell.count);
        }
    }

    #[test]
    fn aggregation_is_deterministic() {
        let reports = scenario();
        let spec = GridSpec::new(75.0, OSAKA_LAT);
        assert_eq!(aggregate(&reports, &spec), aggregate(&reports, &spec));
    }

    #[test]
    fn larger_cells_merge_more() {
        let reports = scenario();
        let fine = aggregate(&reports, &GridSpec::new(75.0, OSAKA_LAT));
        let coarse = aggregate(&reports, &GridSpec::new(2000.0, OSAKA_LAT));
        assert!(coarse.len() <= fine.len());
        let total: u64 = coarse.values().map(|c| c.count).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn representative_point_is_snapped_center() {
        let spec = GridSpec::new(75.0, OSAKA_LAT);
        let cells = aggregate(&[report(34.6937, 135.5023, "litter")], &spec);
        let cell = cells.values().next().unwrap();

        let (lat, lon) = spec.center_of(cell.key);
        assert!((cell.latitude - lat).abs() < f64::EPSILON);
        assert!((cell.longitude - lon).abs() < f64::EPSILON);
        // snapped center stays within half a cell of the report
        assert!((cell.latitude - 34.6937).abs() <= spec.lat_step() / 2.0 + 1e-6);
        assert!((cell.longitude - 135.5023).abs() <= spec.lon_step() / 2.0 + 1e-6);
    }

    #[test]
    fn lon_step_uses_reference_latitude() {
        let osaka = GridSpec::new(100.0, OSAKA_LAT);
        let sapporo = GridSpec::new(100.0, 43.06);
        assert!((osaka.lat_step() - sapporo.lat_step()).abs() < f64::EPSILON);
        assert!(sapporo.lon_step() > osaka.lon_step());
    }

    #[test]
    #[should_panic(expected = "cell size must be positive")]
    fn zero_cell_size_is_a_bug() {
        let _ = GridSpec::new(0.0, OSAKA_LAT);
    }
}
