//! In-memory [`ReportSource`] backed by a `Vec<Report>`.
//!
//! Used by the CLI when reports are read from a JSON file, and by tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use nosmoke_map_report_models::Report;

use crate::{ReportFilter, ReportSource, SourceError};

/// A report source that filters a fixed set of reports held in memory.
#[derive(Debug, Default)]
pub struct InMemoryReportSource {
    reports: Vec<Report>,
    fetches: AtomicUsize,
}

impl InMemoryReportSource {
    /// Creates a source over `reports`.
    #[must_use]
    pub const fn new(reports: Vec<Report>) -> Self {
        Self {
            reports,
            fetches: AtomicUsize::new(0),
        }
    }

    /// How many times [`ReportSource::fetch_reports`] has been called.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReportSource for InMemoryReportSource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>, SourceError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let limit = usize::try_from(filter.limit).unwrap_or(usize::MAX);
        let mut matched: Vec<&Report> = self
            .reports
            .iter()
            .filter(|r| filter.matches(r))
            .collect();
        // newest first, so the row limit drops the oldest reports
        matched.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
        let rows: Vec<Report> = matched.into_iter().take(limit).cloned().collect();

        log::debug!(
            "In-memory source matched {} of {} reports",
            rows.len(),
            self.reports.len()
        );

        Ok(rows)
    }
}
