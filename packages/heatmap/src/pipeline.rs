//! The heatmap query pipeline.
//!
//! validate -> fetch -> radius filter -> aggregate -> score -> threshold ->
//! intensity. Each call is independent; the service holds no per-query
//! state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nosmoke_map_grid::{
    DensityReference, GridSpec, ScoredCell, aggregate, assign_intensity, score_cells,
};
use nosmoke_map_heatmap_models::{
    FeatureProperties, HeatmapFeature, HeatmapQueryParams, HeatmapResponse,
};
use nosmoke_map_report::ReportSource;
use nosmoke_map_report_models::Report;

use crate::HeatmapError;
use crate::config::HeatmapConfig;
use crate::validate::{HeatmapQuery, validate_query};

/// Builds heatmaps from a [`ReportSource`].
#[derive(Clone)]
pub struct HeatmapService {
    source: Arc<dyn ReportSource>,
    config: Arc<HeatmapConfig>,
}

impl std::fmt::Debug for HeatmapService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeatmapService")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .finish()
    }
}

impl HeatmapService {
    /// Creates a service reading from `source`.
    #[must_use]
    pub fn new(source: Arc<dyn ReportSource>, config: HeatmapConfig) -> Self {
        Self {
            source,
            config: Arc::new(config),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &HeatmapConfig {
        &self.config
    }

    /// The report source in use.
    #[must_use]
    pub fn source(&self) -> &dyn ReportSource {
        self.source.as_ref()
    }

    /// Builds the heatmap for `params` over the window ending now.
    ///
    /// # Errors
    ///
    /// * [`HeatmapError::Validation`] if a parameter is invalid; the source
    ///   is not queried
    /// * [`HeatmapError::DataUnavailable`] if the source fails
    /// * [`HeatmapError::Internal`] if fetched data breaks an invariant
    pub async fn build(&self, params: &HeatmapQueryParams) -> Result<HeatmapResponse, HeatmapError> {
        self.build_at(params, Utc::now()).await
    }

    /// Builds the heatmap for `params` over the window ending at `now`.
    ///
    /// # Errors
    ///
    /// See [`Self::build`].
    pub async fn build_at(
        &self,
        params: &HeatmapQueryParams,
        now: DateTime<Utc>,
    ) -> Result<HeatmapResponse, HeatmapError> {
        let query = validate_query(params, &self.config)?;
        self.run_query(&query, now).await
    }

    /// Runs an already validated query.
    ///
    /// # Errors
    ///
    /// * [`HeatmapError::DataUnavailable`] if the source fails
    /// * [`HeatmapError::Internal`] if fetched data breaks an invariant
    pub async fn run_query(
        &self,
        query: &HeatmapQuery,
        now: DateTime<Utc>,
    ) -> Result<HeatmapResponse, HeatmapError> {
        let filter = query.report_filter(now, self.config.fetch_limit);
        let fetched = self
            .source
            .fetch_reports(&filter)
            .await
            .inspect_err(|e| log::error!("Fetching reports from {} failed: {e}", self.source.name()))?;
        if fetched.len() >= self.config.fetch_limit as usize {
            log::warn!(
                "Fetched {} rows, the configured limit; older reports may be missing",
                fetched.len()
            );
        }
        let fetched_count = fetched.len();

        let mut reports = self.usable_reports(fetched)?;
        if let Some(area) = &query.reference {
            reports.retain(|r| area.contains(r.latitude, r.longitude));
        }
        log::debug!(
            "{} of {fetched_count} fetched reports usable for {} query",
            reports.len(),
            query.mode()
        );

        let reference_latitude = query
            .reference
            .map_or(self.config.fallback_latitude, |a| a.center.latitude);
        let spec = GridSpec::new(f64::from(query.cell_size_meters), reference_latitude);
        let cells = aggregate(&reports, &spec);
        let cell_count = cells.len();

        let density = query.reference.map(|area| {
            DensityReference::from_reports(area.center, f64::from(area.radius_meters), &reports)
        });
        let mut scored =
            score_cells(cells, density.as_ref()).map_err(|e| HeatmapError::Internal {
                message: e.to_string(),
            })?;

        let min_reports = u64::from(query.min_reports);
        scored.retain(|c| c.cell.count >= min_reports);
        assign_intensity(&mut scored);

        log::info!(
            "Built {} heatmap: {} reports, {cell_count} cells, {} shown (min_reports={}, grid_m={})",
            query.mode(),
            reports.len(),
            scored.len(),
            query.min_reports,
            query.cell_size_meters
        );

        Ok(HeatmapResponse {
            mode: query.mode(),
            cell_size_meters: query.cell_size_meters,
            features: scored.into_iter().map(to_feature).collect(),
        })
    }

    /// Drops rows outside the service region. Non-finite coordinates mean
    /// the store handed back corrupt data.
    pub(crate) fn usable_reports(&self, fetched: Vec<Report>) -> Result<Vec<Report>, HeatmapError> {
        let mut reports = Vec::with_capacity(fetched.len());
        for report in fetched {
            if !report.latitude.is_finite() || !report.longitude.is_finite() {
                return Err(HeatmapError::Internal {
                    message: format!(
                        "report source {} returned non-finite coordinates ({}, {})",
                        self.source.name(),
                        report.latitude,
                        report.longitude
                    ),
                });
            }
            if !self.config.region.contains(report.latitude, report.longitude) {
                log::warn!(
                    "Skipping report at ({}, {}): outside service region",
                    report.latitude,
                    report.longitude
                );
                continue;
            }
            reports.push(report);
        }
        Ok(reports)
    }
}

fn to_feature(scored: ScoredCell) -> HeatmapFeature {
    HeatmapFeature {
        coordinates: [scored.cell.longitude, scored.cell.latitude],
        properties: FeatureProperties {
            count: scored.cell.count,
            category: scored.primary_category,
            categories: scored.cell.category_counts,
            density_ratio: scored.density_ratio,
            intensity: scored.intensity,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use nosmoke_map_geo::{GeoPoint, meters_to_lat_degrees, meters_to_lon_degrees};
    use nosmoke_map_heatmap_models::{ErrorKind, HeatmapMode};
    use nosmoke_map_report::{InMemoryReportSource, ReportFilter, SourceError};

    const OSAKA: GeoPoint = GeoPoint::new(34.6937, 135.5023);

    fn now() -> DateTime<Utc> {
        "2025-06-01T12:00:00Z".parse().unwrap()
    }

    fn report(lat: f64, lon: f64, category: &str) -> Report {
        Report::new(lat, lon, category, now() - Duration::days(1))
    }

    fn offset(north_m: f64, east_m: f64, category: &str) -> Report {
        report(
            OSAKA.latitude + meters_to_lat_degrees(north_m),
            OSAKA.longitude + meters_to_lon_degrees(east_m, OSAKA.latitude),
            category,
        )
    }

    fn four_reports() -> Vec<Report> {
        vec![
            report(34.6937, 135.5023, "walk_smoke"),
            report(34.6937, 135.5024, "walk_smoke"),
            report(34.6900, 135.5100, "stand_smoke"),
            report(35.0, 136.0, "litter"),
        ]
    }

    fn near_and_far() -> Vec<Report> {
        vec![
            offset(0.0, 0.0, "walk_smoke"),
            offset(100.0, 0.0, "walk_smoke"),
            offset(0.0, 250.0, "stand_smoke"),
            offset(-300.0, -200.0, "litter"),
            offset(400.0, 200.0, "walk_smoke"),
            offset(2500.0, 0.0, "litter"),
            offset(0.0, -3000.0, "litter"),
            offset(-2200.0, 1500.0, "walk_smoke"),
        ]
    }

    fn service(reports: Vec<Report>) -> (Arc<InMemoryReportSource>, HeatmapService) {
        let source = Arc::new(InMemoryReportSource::new(reports));
        let service = HeatmapService::new(source.clone(), HeatmapConfig::default());
        (source, service)
    }

    fn wide(grid_m: &str, min_reports: &str) -> HeatmapQueryParams {
        HeatmapQueryParams {
            grid_m: Some(grid_m.to_string()),
            min_reports: Some(min_reports.to_string()),
            ..HeatmapQueryParams::default()
        }
    }

    fn nearby(min_reports: &str) -> HeatmapQueryParams {
        HeatmapQueryParams {
            reference_lat: Some(OSAKA.latitude.to_string()),
            reference_lon: Some(OSAKA.longitude.to_string()),
            min_reports: Some(min_reports.to_string()),
            ..HeatmapQueryParams::default()
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ReportSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch_reports(&self, _filter: &ReportFilter) -> Result<Vec<Report>, SourceError> {
            Err(SourceError::Unavailable {
                message: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn four_reports_make_three_cells() {
        let (_, service) = service(four_reports());
        let response = service.build_at(&wide("75", "1"), now()).await.unwrap();

        assert_eq!(response.mode, HeatmapMode::Wide);
        assert_eq!(response.cell_size_meters, 75);
        assert_eq!(response.features.len(), 3);
        let total: u64 = response.features.iter().map(|f| f.properties.count).sum();
        assert_eq!(total, 4);
        for feature in &response.features {
            assert_eq!(
                feature.properties.categories.total(),
                feature.properties.count
            );
            assert!(feature.properties.density_ratio.is_none());
        }
    }

    #[tokio::test]
    async fn threshold_keeps_only_the_busy_cell() {
        let (_, service) = service(four_reports());
        let response = service.build_at(&wide("75", "2"), now()).await.unwrap();

        assert_eq!(response.features.len(), 1);
        let feature = &response.features[0];
        assert_eq!(feature.properties.count, 2);
        assert_eq!(feature.properties.category.as_str(), "walk_smoke");
        assert!((feature.properties.intensity - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn output_is_deterministic() {
        let (_, service) = service(four_reports());
        let first = service.build_at(&wide("75", "1"), now()).await.unwrap();
        let second = service.build_at(&wide("75", "1"), now()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn intensity_is_normalized_over_shown_cells() {
        let (_, service) = service(four_reports());
        let response = service.build_at(&wide("75", "1"), now()).await.unwrap();

        let max = response
            .features
            .iter()
            .map(|f| f.properties.intensity)
            .fold(0.0, f64::max);
        assert!((max - 1.0).abs() < f64::EPSILON);
        for feature in &response.features {
            assert!((0.0..=1.0).contains(&feature.properties.intensity));
        }
    }

    #[tokio::test]
    async fn nearby_drops_far_reports_and_ratios_sum_to_one_hundred() {
        let (_, service) = service(near_and_far());
        let response = service.build_at(&nearby("1"), now()).await.unwrap();

        assert_eq!(response.mode, HeatmapMode::Nearby);
        assert_eq!(response.cell_size_meters, 75);
        let total: u64 = response.features.iter().map(|f| f.properties.count).sum();
        assert_eq!(total, 5);

        let mut ratio_sum = 0.0;
        for feature in &response.features {
            let distance = OSAKA.distance_to(feature.latitude(), feature.longitude());
            assert!(distance < 1000.0, "far cell at {distance}m was shown");
            let ratio = feature.properties.density_ratio.unwrap();
            assert!((0.0..=100.0).contains(&ratio));
            ratio_sum += ratio;
        }
        assert!((ratio_sum - 100.0).abs() < 0.05, "ratios sum to {ratio_sum}");
    }

    #[tokio::test]
    async fn no_cell_below_min_reports() {
        let mut reports = near_and_far();
        reports.extend(four_reports());
        reports.extend(four_reports());
        let (_, service) = service(reports);

        for min in ["1", "2", "3", "5"] {
            let response = service.build_at(&wide("75", min), now()).await.unwrap();
            let min: u64 = min.parse().unwrap();
            assert!(response.features.iter().all(|f| f.properties.count >= min));
        }
    }

    #[tokio::test]
    async fn invalid_params_never_reach_the_source() {
        let (source, service) = service(four_reports());
        let bad = [
            HeatmapQueryParams {
                days: Some("0".to_string()),
                ..HeatmapQueryParams::default()
            },
            HeatmapQueryParams {
                days: Some("366".to_string()),
                ..HeatmapQueryParams::default()
            },
            HeatmapQueryParams {
                min_reports: Some("0".to_string()),
                ..HeatmapQueryParams::default()
            },
            HeatmapQueryParams {
                min_reports: Some("101".to_string()),
                ..HeatmapQueryParams::default()
            },
            HeatmapQueryParams {
                radius: Some("10".to_string()),
                ..HeatmapQueryParams::default()
            },
            HeatmapQueryParams {
                radius: Some("20000".to_string()),
                ..HeatmapQueryParams::default()
            },
            HeatmapQueryParams {
                category: Some("bogus".to_string()),
                ..HeatmapQueryParams::default()
            },
            HeatmapQueryParams {
                reference_lat: Some("34.69".to_string()),
                ..HeatmapQueryParams::default()
            },
        ];

        for params in &bad {
            let err = service.build_at(params, now()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{params:?}");
        }
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn source_failure_is_data_unavailable() {
        let service = HeatmapService::new(Arc::new(FailingSource), HeatmapConfig::default());
        let err = service
            .build_at(&HeatmapQueryParams::default(), now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataUnavailable);
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn old_reports_fall_outside_window() {
        let mut old = report(34.6937, 135.5023, "litter");
        old.reported_at = now() - Duration::days(10);
        let (_, service) = service(vec![old]);

        let params = HeatmapQueryParams {
            days: Some("7".to_string()),
            min_reports: Some("1".to_string()),
            ..HeatmapQueryParams::default()
        };
        let response = service.build_at(&params, now()).await.unwrap();
        assert!(response.features.is_empty());
    }

    #[tokio::test]
    async fn fetch_limit_keeps_the_newest_reports() {
        let aged = |lat: f64, category: &str, age_days: i64| {
            let mut r = report(lat, 135.5023, category);
            r.reported_at = now() - Duration::days(age_days);
            r
        };
        let source = Arc::new(InMemoryReportSource::new(vec![
            aged(34.60, "litter", 20),
            aged(34.65, "litter", 19),
            aged(34.70, "walk_smoke", 1),
        ]));
        let config = HeatmapConfig {
            fetch_limit: 2,
            ..HeatmapConfig::default()
        };
        let service = HeatmapService::new(source, config);

        let response = service.build_at(&wide("75", "1"), now()).await.unwrap();
        let mut categories: Vec<&str> = response
            .features
            .iter()
            .map(|f| f.properties.category.as_str())
            .collect();
        categories.sort_unstable();
        assert_eq!(categories, vec!["litter", "walk_smoke"]);
    }

    #[tokio::test]
    async fn category_filter_applies() {
        let (_, service) = service(four_reports());
        let params = HeatmapQueryParams {
            category: Some("litter".to_string()),
            ..wide("75", "1")
        };
        let response = service.build_at(&params, now()).await.unwrap();
        assert_eq!(response.features.len(), 1);
        assert_eq!(response.features[0].properties.category.as_str(), "litter");
    }

    #[tokio::test]
    async fn rows_outside_region_are_skipped() {
        let mut reports = four_reports();
        reports.push(report(51.5074, -0.1278, "litter"));
        let (_, service) = service(reports);

        let response = service.build_at(&wide("75", "1"), now()).await.unwrap();
        let total: u64 = response.features.iter().map(|f| f.properties.count).sum();
        assert_eq!(total, 4);
    }

    #[tokio::test]
    async fn non_finite_rows_are_internal_errors() {
        let mut reports = four_reports();
        reports.push(report(f64::NAN, 135.5, "litter"));
        let (_, service) = service(reports);

        let err = service
            .build_at(&wide("75", "1"), now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn empty_store_yields_empty_heatmap() {
        let (source, service) = service(Vec::new());
        let response = service.build_at(&nearby("1"), now()).await.unwrap();
        assert!(response.features.is_empty());
        assert_eq!(source.fetch_count(), 1);
    }
}
