#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report and category types for the no-smoke map.
//!
//! A [`Report`] is a single citizen observation (someone smoking while
//! walking, littering, ...) at a point. Which categories are valid is
//! configuration, not code: the closed set lives in a [`CategorySet`] that
//! callers load alongside the rest of their settings.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap as _;
use serde::{Deserialize, Serialize, Serializer};

/// Category slugs accepted when no configuration overrides them.
pub const DEFAULT_CATEGORIES: &[&str] = &["walk_smoke", "stand_smoke", "litter"];

/// A report category slug (e.g. `"walk_smoke"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Creates a category from its slug.
    #[must_use]
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    /// Returns the slug.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(slug: &str) -> Self {
        Self::new(slug)
    }
}

impl From<String> for Category {
    fn from(slug: String) -> Self {
        Self(slug)
    }
}

impl AsRef<str> for Category {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The closed set of categories a deployment accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategorySet(Vec<Category>);

impl CategorySet {
    /// Creates a set from the given categories, dropping duplicates while
    /// keeping the first occurrence's position.
    #[must_use]
    pub fn new(categories: impl IntoIterator<Item = Category>) -> Self {
        let mut out: Vec<Category> = Vec::new();
        for category in categories {
            if !out.contains(&category) {
                out.push(category);
            }
        }
        Self(out)
    }

    /// Looks up a category by slug.
    #[must_use]
    pub fn get(&self, slug: &str) -> Option<&Category> {
        self.0.iter().find(|c| c.as_str() == slug)
    }

    /// Number of categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORIES.iter().copied().map(Category::from))
    }
}

impl std::fmt::Display for CategorySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, category) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(category.as_str())?;
        }
        Ok(())
    }
}

/// Per-category tallies, kept in the order each category was first seen.
///
/// The order matters: it is the tie-break when two categories share the
/// highest count (see [`CategoryCounts::primary`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryCounts(Vec<(Category, u64)>);

impl CategoryCounts {
    /// Creates an empty tally.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds one to `category`, appending it if this is its first occurrence.
    pub fn increment(&mut self, category: &Category) {
        if let Some((_, count)) = self.0.iter_mut().find(|(c, _)| c == category) {
            *count += 1;
        } else {
            self.0.push((category.clone(), 1));
        }
    }

    /// Count for `category` (0 if never seen).
    #[must_use]
    pub fn get(&self, category: &Category) -> u64 {
        self.0
            .iter()
            .find(|(c, _)| c == category)
            .map_or(0, |(_, n)| *n)
    }

    /// Sum of all tallies.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.iter().map(|(_, n)| n).sum()
    }

    /// Number of distinct categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in first-occurrence order.
    pub fn iter(&self) -> impl Iterator<Item = (&Category, u64)> {
        self.0.iter().map(|(c, n)| (c, *n))
    }

    /// The category with the strictly greatest count. On a tie the
    /// category seen first wins.
    #[must_use]
    pub fn primary(&self) -> Option<&Category> {
        let mut best: Option<(&Category, u64)> = None;
        for (category, count) in &self.0 {
            match best {
                Some((_, best_count)) if *count <= best_count => {}
                _ => best = Some((category, *count)),
            }
        }
        best.map(|(c, _)| c)
    }
}

impl Serialize for CategoryCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (category, count) in &self.0 {
            map.serialize_entry(category.as_str(), count)?;
        }
        map.end()
    }
}

/// A citizen report as read from the report store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Report category.
    pub category: Category,
    /// When the report was submitted.
    pub reported_at: DateTime<Utc>,
    /// Prefecture label assigned at submission time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefecture: Option<String>,
    /// City/ward label assigned at submission time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl Report {
    /// Creates a report without location labels.
    #[must_use]
    pub fn new(
        latitude: f64,
        longitude: f64,
        category: impl Into<Category>,
        reported_at: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            category: category.into(),
            reported_at,
            prefecture: None,
            city: None,
        }
    }

    /// `(prefecture, city)`, if both names are known and non-empty.
    #[must_use]
    pub fn location(&self) -> Option<(&str, &str)> {
        match (self.prefecture.as_deref(), self.city.as_deref()) {
            (Some(p), Some(c)) if !p.is_empty() && !c.is_empty() => Some((p, c)),
            _ => None,
        }
    }
}

/// A report submission as posted by the reporting form.
///
/// Older clients send `lat`/`lon`, newer ones `latitude`/`longitude`; both
/// spellings are accepted and the short form wins when both are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSubmission {
    /// Latitude (short form).
    #[serde(default)]
    pub lat: Option<f64>,
    /// Longitude (short form).
    #[serde(default)]
    pub lon: Option<f64>,
    /// Latitude (long form).
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude (long form).
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Category slug.
    #[serde(default)]
    pub category: Option<String>,
}

impl ReportSubmission {
    /// Resolved latitude, preferring `lat` over `latitude`.
    #[must_use]
    pub fn resolved_latitude(&self) -> Option<f64> {
        self.lat.or(self.latitude)
    }

    /// Resolved longitude, preferring `lon` over `longitude`.
    #[must_use]
    pub fn resolved_longitude(&self) -> Option<f64> {
        self.lon.or(self.longitude)
    }
}

/// A submission that passed validation and is ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Report category.
    pub category: Category,
}
