#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Heatmap query pipeline for the no-smoke report map.
//!
//! [`HeatmapService`] validates raw query parameters, fetches candidate
//! reports from a [`nosmoke_map_report::ReportSource`], and runs them
//! through the grid aggregator and density scorer. [`CachedHeatmapService`]
//! optionally sits in front of it.

pub mod cache;
pub mod config;
pub mod pipeline;
pub mod stats;
pub mod validate;

use nosmoke_map_heatmap_models::{ApiError, ErrorKind};
use nosmoke_map_report::SourceError;

pub use cache::CachedHeatmapService;
pub use config::{ConfigError, HeatmapConfig};
pub use pipeline::HeatmapService;
pub use validate::{HeatmapQuery, ReferenceArea, ValidationError, validate_query};

/// Errors that can occur while building a heatmap or stats.
#[derive(Debug, thiserror::Error)]
pub enum HeatmapError {
    /// A query parameter was rejected. Nothing was fetched.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The report store failed.
    #[error(transparent)]
    DataUnavailable(#[from] SourceError),

    /// Fetched data broke an invariant.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of what went wrong.
        message: String,
    },
}

impl HeatmapError {
    /// Broad class of the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::DataUnavailable(_) => ErrorKind::DataUnavailable,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Caller-facing error body.
    #[must_use]
    pub fn to_api_error(&self) -> ApiError {
        let parameter = match self {
            Self::Validation(e) => Some(e.parameter().to_string()),
            Self::DataUnavailable(_) | Self::Internal { .. } => None,
        };
        ApiError {
            kind: self.kind(),
            parameter,
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_parameter() {
        let err = HeatmapError::from(ValidationError::OutOfRange {
            parameter: "days",
            value: 400,
            min: 1,
            max: 365,
        });
        let api = err.to_api_error();
        assert_eq!(api.kind, ErrorKind::Validation);
        assert_eq!(api.parameter.as_deref(), Some("days"));
        assert_eq!(
            api.message,
            "Invalid days parameter 400. Must be between 1 and 365."
        );
    }

    #[test]
    fn source_error_is_data_unavailable() {
        let err = HeatmapError::from(SourceError::Timeout { seconds: 10 });
        let api = err.to_api_error();
        assert_eq!(api.kind, ErrorKind::DataUnavailable);
        assert!(api.parameter.is_none());
        assert_eq!(api.message, "Report store timed out after 10s");
    }

    #[test]
    fn internal_error_kind() {
        let err = HeatmapError::Internal {
            message: "cell without reports".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal error: cell without reports");
    }
}
