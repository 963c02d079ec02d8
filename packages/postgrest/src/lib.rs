#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! [`ReportSource`] backed by a `PostgREST` `reports` table (as exposed by
//! Supabase).
//!
//! The filter is pushed down as `PostgREST` operators so only the window,
//! category, and coarse bounding box travel over the wire. Requests are
//! sent once; a failed or slow request surfaces as a [`SourceError`] and
//! the caller decides what to do.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nosmoke_map_report::{ReportFilter, ReportSource, SourceError};
use nosmoke_map_report_models::Report;
use serde::Deserialize;

/// Base URL of the Supabase project.
pub const URL_VAR: &str = "SUPABASE_URL";
/// Preferred API key.
pub const SERVICE_ROLE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";
/// Fallback API key.
pub const ANON_KEY_VAR: &str = "SUPABASE_ANON_KEY";
/// Per-request timeout in seconds.
pub const TIMEOUT_VAR: &str = "POSTGREST_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const REPORTS_PATH: &str = "/rest/v1/reports";
const SELECT_COLUMNS: &str = "lat,lon,category,reported_at,prefecture,city";
const BODY_PREVIEW_LEN: usize = 200;

/// Errors that can occur while setting up the client.
#[derive(Debug, thiserror::Error)]
pub enum PostgrestError {
    /// Required settings are missing or malformed.
    #[error("PostgREST configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Connection settings for the report table.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgrestConfig {
    /// Project base URL, without a trailing slash.
    pub base_url: String,
    /// API key sent as both `apikey` and bearer token.
    pub api_key: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PostgrestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl PostgrestConfig {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`PostgrestError::Config`] if the URL or both keys are
    /// missing, or the timeout is not a positive integer.
    pub fn from_env() -> Result<Self, PostgrestError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PostgrestError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base_url = non_empty(URL_VAR).ok_or_else(|| PostgrestError::Config {
            message: format!("{URL_VAR} environment variable not set"),
        })?;

        let api_key = non_empty(SERVICE_ROLE_KEY_VAR)
            .or_else(|| {
                log::warn!("{SERVICE_ROLE_KEY_VAR} not set; falling back to {ANON_KEY_VAR}");
                non_empty(ANON_KEY_VAR)
            })
            .ok_or_else(|| PostgrestError::Config {
                message: format!("neither {SERVICE_ROLE_KEY_VAR} nor {ANON_KEY_VAR} is set"),
            })?;

        let timeout_secs = match non_empty(TIMEOUT_VAR) {
            None => DEFAULT_TIMEOUT_SECS,
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|&secs| secs > 0)
                .ok_or_else(|| PostgrestError::Config {
                    message: format!("{TIMEOUT_VAR} must be a positive integer, got '{raw}'"),
                })?,
        };

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key,
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}{REPORTS_PATH}", self.base_url)
    }
}

/// Reads reports from a `PostgREST` endpoint.
pub struct PostgrestReportSource {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_secs: u64,
}

impl std::fmt::Debug for PostgrestReportSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestReportSource")
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl PostgrestReportSource {
    /// Creates a source for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PostgrestError::Client`] if the HTTP client cannot be
    /// built.
    pub fn new(config: &PostgrestConfig) -> Result<Self, PostgrestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Creates a source from the process environment.
    ///
    /// # Errors
    ///
    /// See [`PostgrestConfig::from_env`] and [`Self::new`].
    pub fn from_env() -> Result<Self, PostgrestError> {
        let config = PostgrestConfig::from_env()?;
        log::info!("Reading reports from {}", config.endpoint());
        Self::new(&config)
    }

    fn map_transport_error(&self, e: &reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout {
                seconds: self.timeout_secs,
            }
        } else {
            SourceError::Unavailable {
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ReportSource for PostgrestReportSource {
    fn name(&self) -> &str {
        "postgrest"
    }

    async fn fetch_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>, SourceError> {
        let pairs = query_pairs(filter);
        log::debug!("GET {} {pairs:?}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&pairs)
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        if !status.is_success() {
            return Err(SourceError::Unavailable {
                message: format!("HTTP {status}: {}", preview(&body)),
            });
        }

        let reports = decode_rows(&body)?;
        log::debug!("Fetched {} report rows", reports.len());
        Ok(reports)
    }
}

/// `PostgREST` query parameters for `filter`, newest rows first.
#[must_use]
pub fn query_pairs(filter: &ReportFilter) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("select", SELECT_COLUMNS.to_string()),
        (
            "reported_at",
            format!(
                "gte.{}",
                filter.since.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
        ),
    ];

    if let Some(category) = &filter.category {
        pairs.push(("category", format!("eq.{category}")));
    }

    if let Some(bbox) = &filter.bbox {
        pairs.push(("lat", format!("gte.{}", bbox.south)));
        pairs.push(("lat", format!("lte.{}", bbox.north)));
        pairs.push(("lon", format!("gte.{}", bbox.west)));
        pairs.push(("lon", format!("lte.{}", bbox.east)));
    }

    pairs.push(("order", "reported_at.desc".to_string()));
    pairs.push(("limit", filter.limit.to_string()));
    pairs
}

/// One row of the `reports` table.
#[derive(Debug, Deserialize)]
struct ReportRow {
    lat: f64,
    lon: f64,
    category: String,
    reported_at: DateTime<Utc>,
    #[serde(default)]
    prefecture: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        let mut report = Self::new(row.lat, row.lon, row.category, row.reported_at);
        report.prefecture = row.prefecture;
        report.city = row.city;
        report
    }
}

/// Decodes a `PostgREST` JSON array of report rows.
///
/// # Errors
///
/// Returns [`SourceError::Decode`] if the body is not an array of rows.
pub fn decode_rows(body: &str) -> Result<Vec<Report>, SourceError> {
    let rows: Vec<ReportRow> = serde_json::from_str(body).map_err(|e| SourceError::Decode {
        message: format!("{e} (body: {})", preview(body)),
    })?;
    Ok(rows.into_iter().map(Report::from).collect())
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(BODY_PREVIEW_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
