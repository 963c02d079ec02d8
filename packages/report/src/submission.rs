//! Validation of incoming report submissions.
//!
//! Storing the validated [`NewReport`] and any abuse checks around it are
//! the caller's business.

use nosmoke_map_geo::BoundingBox;
use nosmoke_map_report_models::{CategorySet, NewReport, ReportSubmission};

/// Reasons a submission is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmissionError {
    /// A required field was absent.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// The coordinates are not finite or fall outside the service region.
    #[error("Coordinates ({latitude}, {longitude}) are outside the service region")]
    OutOfRegion {
        /// Submitted latitude.
        latitude: f64,
        /// Submitted longitude.
        longitude: f64,
    },

    /// The category is not one of the configured categories.
    #[error("Invalid category '{value}'. Must be one of: {allowed}")]
    UnknownCategory {
        /// Submitted category.
        value: String,
        /// Comma-separated accepted categories.
        allowed: String,
    },
}

impl SubmissionError {
    /// Name of the offending field.
    #[must_use]
    pub const fn parameter(&self) -> &'static str {
        match self {
            Self::MissingField { field } => field,
            Self::OutOfRegion { .. } => "lat",
            Self::UnknownCategory { .. } => "category",
        }
    }
}

/// Validates a submission against the service region and category set.
///
/// # Errors
///
/// Returns [`SubmissionError`] if a field is missing, the coordinates are
/// outside `region`, or the category is not in `categories`.
pub fn validate_submission(
    submission: &ReportSubmission,
    region: &BoundingBox,
    categories: &CategorySet,
) -> Result<NewReport, SubmissionError> {
    let latitude = submission
        .resolved_latitude()
        .ok_or(SubmissionError::MissingField { field: "lat" })?;
    let longitude = submission
        .resolved_longitude()
        .ok_or(SubmissionError::MissingField { field: "lon" })?;
    let slug = submission
        .category
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SubmissionError::MissingField { field: "category" })?;

    if !latitude.is_finite() || !longitude.is_finite() || !region.contains(latitude, longitude) {
        return Err(SubmissionError::OutOfRegion {
            latitude,
            longitude,
        });
    }

    let category = categories
        .get(slug)
        .ok_or_else(|| SubmissionError::UnknownCategory {
            value: slug.to_string(),
            allowed: categories.to_string(),
        })?
        .clone();

    log::debug!("Accepted {category} submission at ({latitude}, {longitude})");

    Ok(NewReport {
        latitude,
        longitude,
        category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn japan() -> BoundingBox {
        BoundingBox::new(123.0, 24.0, 146.0, 46.0)
    }

    fn submission(lat: Option<f64>, lon: Option<f64>, category: Option<&str>) -> ReportSubmission {
        ReportSubmission {
            lat,
            lon,
            category: category.map(ToString::to_string),
            ..ReportSubmission::default()
        }
    }

    #[test]
    fn accepts_valid_submission() {
        let report = validate_submission(
            &submission(Some(34.6937), Some(135.5023), Some("walk_smoke")),
            &japan(),
            &CategorySet::default(),
        )
        .unwrap();
        assert_eq!(report.category.as_str(), "walk_smoke");
    }

    #[test]
    fn accepts_long_coordinate_names() {
        let sub = ReportSubmission {
            latitude: Some(34.6937),
            longitude: Some(135.5023),
            category: Some("litter".to_string()),
            ..ReportSubmission::default()
        };
        assert!(validate_submission(&sub, &japan(), &CategorySet::default()).is_ok());
    }

    #[test]
    fn zero_latitude_is_present_not_missing() {
        let err = validate_submission(
            &submission(Some(0.0), Some(135.0), Some("litter")),
            &japan(),
            &CategorySet::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SubmissionError::OutOfRegion { .. }));
    }

    #[test]
    fn rejects_missing_fields() {
        let categories = CategorySet::default();
        assert_eq!(
            validate_submission(&submission(None, Some(135.0), Some("litter")), &japan(), &categories),
            Err(SubmissionError::MissingField { field: "lat" })
        );
        assert_eq!(
            validate_submission(&submission(Some(34.0), None, Some("litter")), &japan(), &categories),
            Err(SubmissionError::MissingField { field: "lon" })
        );
        assert_eq!(
            validate_submission(&submission(Some(34.0), Some(135.0), Some("  ")), &japan(), &categories),
            Err(SubmissionError::MissingField { field: "category" })
        );
    }

    #[test]
    fn rejects_out_of_region_and_non_finite() {
        let categories = CategorySet::default();
        for (lat, lon) in [(51.5, -0.12), (f64::NAN, 135.0), (34.0, f64::INFINITY)] {
            let err = validate_submission(
                &submission(Some(lat), Some(lon), Some("litter")),
                &japan(),
                &categories,
            )
            .unwrap_err();
            assert!(matches!(err, SubmissionError::OutOfRegion { .. }));
        }
    }

    #[test]
    fn rejects_unknown_category() {
        let err = validate_submission(
            &submission(Some(34.6937), Some(135.5023), Some("smoking")),
            &japan(),
            &CategorySet::default(),
        )
        .unwrap_err();
        assert_eq!(err.parameter(), "category");
        assert_eq!(
            err.to_string(),
            "Invalid category 'smoking'. Must be one of: walk_smoke, stand_smoke, litter"
        );
    }
}
