//! Report statistics over a look-back window.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use nosmoke_map_heatmap_models::{LocationCount, ReportStats, StatsQueryParams};
use nosmoke_map_report::ReportFilter;
use nosmoke_map_report_models::{CategoryCounts, Report};

use crate::HeatmapError;
use crate::pipeline::HeatmapService;
use crate::validate::{validate_stats_days, window_start};

impl HeatmapService {
    /// Summarizes reports over the window ending now.
    ///
    /// # Errors
    ///
    /// * [`HeatmapError::Validation`] if `days` is invalid
    /// * [`HeatmapError::DataUnavailable`] if the source fails
    /// * [`HeatmapError::Internal`] if fetched data breaks an invariant
    pub async fn stats(&self, params: &StatsQueryParams) -> Result<ReportStats, HeatmapError> {
        self.stats_at(params, Utc::now()).await
    }

    /// Summarizes reports over the window ending at `now`.
    ///
    /// # Errors
    ///
    /// See [`Self::stats`].
    pub async fn stats_at(
        &self,
        params: &StatsQueryParams,
        now: DateTime<Utc>,
    ) -> Result<ReportStats, HeatmapError> {
        let config = self.config();
        let days = validate_stats_days(params, config)?;

        let filter = ReportFilter {
            since: window_start(days, now),
            category: None,
            bbox: None,
            limit: config.stats.row_limit,
        };
        let fetched = self
            .source()
            .fetch_reports(&filter)
            .await
            .inspect_err(|e| log::error!("Fetching reports for stats failed: {e}"))?;
        let reports = self.usable_reports(fetched)?;

        let stats = summarize(&reports, days, config.stats.top_locations);
        log::info!(
            "Stats over {days} days: {} reports, {} categories",
            stats.total_reports,
            stats.category_breakdown.len()
        );
        Ok(stats)
    }
}

/// Totals reports per category and per location.
///
/// Locations are ranked by count, then by prefecture and city name. Reports
/// missing either name, or with an empty one, count toward the totals but
/// not toward locations.
#[must_use]
pub fn summarize(reports: &[Report], period_days: u32, top_locations: usize) -> ReportStats {
    let mut category_breakdown = CategoryCounts::new();
    let mut locations: BTreeMap<(&str, &str), u64> = BTreeMap::new();

    for report in reports {
        category_breakdown.increment(&report.category);
        if let Some(location) = report.location() {
            *locations.entry(location).or_default() += 1;
        }
    }

    let mut ranked: Vec<((&str, &str), u64)> = locations.into_iter().collect();
    // stable sort keeps the map's name order among equal counts
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    ReportStats {
        total_reports: reports.len() as u64,
        category_breakdown,
        top_locations: ranked
            .into_iter()
            .take(top_locations)
            .map(|((prefecture, city), count)| LocationCount {
                prefecture: prefecture.to_string(),
                city: city.to_string(),
                count,
            })
            .collect(),
        period_days,
    }
}
