#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Grid aggregation and density scoring for the report heatmap.
//!
//! [`grid::aggregate`] buckets reports into square-ish cells sized in
//! meters. [`density::score_cells`] then attaches a primary category and a
//! density ratio to each cell, and [`density::assign_intensity`] normalizes
//! counts against the busiest surviving cell.
//!
//! Both stages trust their inputs. Parameter validation happens in the
//! query pipeline before anything here is called.

pub mod density;
pub mod grid;

pub use density::{DensityReference, EmptyCellError, ScoredCell, assign_intensity, score_cells};
pub use grid::{CellKey, GridCell, GridCells, GridSpec, aggregate};
