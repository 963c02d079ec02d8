#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report store contract and report submission validation.
//!
//! The aggregation pipeline never talks to a database directly. It asks a
//! [`ReportSource`] for candidate rows matching a [`ReportFilter`], and each
//! store backend (the `PostgREST` client, the in-memory source used by the
//! CLI and tests, ...) implements that one method.

pub mod memory;
pub mod submission;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nosmoke_map_geo::BoundingBox;
use nosmoke_map_report_models::{Category, Report};

pub use memory::InMemoryReportSource;

/// Errors a report store can return.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The store could not be reached or rejected the request.
    #[error("Report store unavailable: {message}")]
    Unavailable {
        /// Description of what went wrong.
        message: String,
    },

    /// The store did not answer in time.
    #[error("Report store timed out after {seconds}s")]
    Timeout {
        /// Timeout that elapsed.
        seconds: u64,
    },

    /// The store answered with rows that could not be decoded.
    #[error("Failed to decode report rows: {message}")]
    Decode {
        /// Description of what went wrong.
        message: String,
    },
}

/// Which rows to fetch from a [`ReportSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFilter {
    /// Only reports submitted at or after this instant.
    pub since: DateTime<Utc>,
    /// Only reports of this category.
    pub category: Option<Category>,
    /// Only reports inside this box. This is a coarse prefilter; callers
    /// apply their own precise spatial filter afterwards.
    pub bbox: Option<BoundingBox>,
    /// Maximum number of rows to return.
    pub limit: u32,
}

impl ReportFilter {
    /// Whether `report` satisfies every condition of this filter (ignoring
    /// the row limit).
    #[must_use]
    pub fn matches(&self, report: &Report) -> bool {
        report.reported_at >= self.since
            && self.category.as_ref().is_none_or(|c| *c == report.category)
            && self
                .bbox
                .is_none_or(|b| b.contains(report.latitude, report.longitude))
    }
}

/// A store of citizen reports.
///
/// Implementations return at most [`ReportFilter::limit`] rows. They must
/// not substitute placeholder data on failure; errors are surfaced to the
/// caller, which decides on any fallback.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Short identifier used in logs (e.g. `"postgrest"`).
    fn name(&self) -> &str;

    /// Fetches reports matching `filter`, newest first. When more rows match
    /// than [`ReportFilter::limit`], the oldest ones are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the store cannot be queried or its rows
    /// cannot be decoded.
    async fn fetch_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>, SourceError>;
}
