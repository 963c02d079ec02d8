//! Subcommand implementations. Each returns the JSON text to print.

use std::path::Path;
use std::sync::Arc;

use geojson::FeatureCollection;
use nosmoke_map_heatmap::{ConfigError, HeatmapConfig, HeatmapError, HeatmapService};
use nosmoke_map_heatmap_models::{ApiError, ErrorKind, HeatmapQueryParams, StatsQueryParams};
use nosmoke_map_postgrest::{PostgrestError, PostgrestReportSource};
use nosmoke_map_report::submission::{SubmissionError, validate_submission};
use nosmoke_map_report::{InMemoryReportSource, ReportSource};
use nosmoke_map_report_models::{Report, ReportSubmission};
use serde::Serialize;

/// Errors that can occur while running a subcommand.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The config file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The `PostgREST` source could not be set up.
    #[error(transparent)]
    Postgrest(#[from] PostgrestError),

    /// The reports file could not be read or parsed.
    #[error("Failed to read reports from {path}: {message}")]
    ReportsFile {
        /// Path that failed.
        path: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The heatmap or stats query failed.
    #[error(transparent)]
    Heatmap(#[from] HeatmapError),

    /// The report submission was rejected.
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// The result could not be encoded.
    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Caller-facing error body.
    #[must_use]
    pub fn to_api_error(&self) -> ApiError {
        let (kind, parameter) = match self {
            Self::Heatmap(e) => return e.to_api_error(),
            Self::Submission(e) => (ErrorKind::Validation, Some(e.parameter().to_string())),
            Self::Postgrest(_) | Self::ReportsFile { .. } => (ErrorKind::DataUnavailable, None),
            Self::Config(_) | Self::Output(_) => (ErrorKind::Internal, None),
        };
        ApiError {
            kind,
            parameter,
            message: self.to_string(),
        }
    }
}

/// Loads the config file at `path`, or the built-in defaults.
///
/// # Errors
///
/// Returns [`CliError::Config`] if the file cannot be loaded.
pub fn load_config(path: Option<&Path>) -> Result<HeatmapConfig, CliError> {
    match path {
        Some(path) => Ok(HeatmapConfig::load(path)?),
        None => {
            log::debug!("No config file given; using built-in defaults");
            Ok(HeatmapConfig::default())
        }
    }
}

/// Parses a JSON array of reports.
///
/// # Errors
///
/// Returns an error if `json` is not an array of reports.
pub fn parse_reports(json: &str) -> Result<Vec<Report>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Opens the report source: the JSON file at `reports` if given, otherwise
/// `PostgREST` configured from the environment.
///
/// # Errors
///
/// Returns [`CliError`] if the file cannot be read or the `PostgREST`
/// settings are incomplete.
pub fn open_source(reports: Option<&Path>) -> Result<Arc<dyn ReportSource>, CliError> {
    let Some(path) = reports else {
        return Ok(Arc::new(PostgrestReportSource::from_env()?));
    };

    let file_error = |message: String| CliError::ReportsFile {
        path: path.display().to_string(),
        message,
    };
    let json = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
    let reports = parse_reports(&json).map_err(|e| file_error(e.to_string()))?;
    log::info!("Loaded {} reports from {}", reports.len(), path.display());

    Ok(Arc::new(InMemoryReportSource::new(reports)))
}

/// Builds the heatmap and encodes it as a `GeoJSON` `FeatureCollection`.
///
/// # Errors
///
/// Returns [`CliError`] if the query fails or the output cannot be encoded.
pub async fn heatmap(
    service: &HeatmapService,
    params: &HeatmapQueryParams,
    pretty: bool,
) -> Result<String, CliError> {
    let response = service.build(params).await?;
    let collection = FeatureCollection::try_from(&response)?;
    Ok(to_json(&collection, pretty)?)
}

/// Summarizes recent reports as JSON.
///
/// # Errors
///
/// Returns [`CliError`] if the query fails or the output cannot be encoded.
pub async fn stats(
    service: &HeatmapService,
    params: &StatsQueryParams,
    pretty: bool,
) -> Result<String, CliError> {
    let stats = service.stats(params).await?;
    Ok(to_json(&stats, pretty)?)
}

/// Validates a report submission and echoes the accepted report.
///
/// # Errors
///
/// Returns [`CliError::Submission`] if the submission is rejected.
pub fn check_report(
    submission: &ReportSubmission,
    config: &HeatmapConfig,
    pretty: bool,
) -> Result<String, CliError> {
    let report = validate_submission(submission, &config.region, &config.categories)?;
    Ok(to_json(&report, pretty)?)
}

/// Encodes `value` as compact or pretty JSON.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}
