//! Heatmap configuration.
//!
//! Every limit the pipeline enforces lives here rather than in code, so a
//! deployment for another region only needs a different TOML file. Missing
//! keys fall back to the built-in values; a table that is present must be
//! complete.
//!
//! ```toml
//! fallback_latitude = 34.6937
//! categories = ["walk_smoke", "stand_smoke", "litter"]
//!
//! [region]
//! west = 123.0
//! south = 24.0
//! east = 146.0
//! north = 46.0
//!
//! [days]
//! min = 1
//! max = 365
//! default = 30
//! ```

use std::path::Path;

use nosmoke_map_geo::BoundingBox;
use nosmoke_map_report_models::CategorySet;
use serde::{Deserialize, Serialize};

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`HeatmapConfig`].
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The values parsed but contradict each other.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Accepted range and default for an integer query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRange {
    /// Smallest accepted value.
    pub min: u32,
    /// Largest accepted value.
    pub max: u32,
    /// Value used when the parameter is absent.
    pub default: u32,
}

impl ParamRange {
    /// Creates a range.
    #[must_use]
    pub const fn new(min: u32, max: u32, default: u32) -> Self {
        Self { min, max, default }
    }

    fn check(&self, name: &str) -> Result<(), ConfigError> {
        if self.min > self.max || !(self.min..=self.max).contains(&self.default) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "{name}: expected min <= default <= max, got {} <= {} <= {}",
                    self.min, self.default, self.max
                ),
            });
        }
        Ok(())
    }
}

/// Accepted range and mode-dependent defaults for the grid cell size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSizeRange {
    /// Smallest accepted cell size in meters.
    pub min: u32,
    /// Largest accepted cell size in meters.
    pub max: u32,
    /// Default when a reference point is given.
    pub nearby_default: u32,
    /// Default for region-wide queries.
    pub wide_default: u32,
}

impl CellSizeRange {
    fn check(&self) -> Result<(), ConfigError> {
        ParamRange::new(self.min, self.max, self.nearby_default).check("cell_size_meters")?;
        ParamRange::new(self.min, self.max, self.wide_default).check("cell_size_meters")?;
        if self.min == 0 {
            return Err(ConfigError::Invalid {
                message: "cell_size_meters: min must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Settings for the stats breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Maximum rows fetched for a stats query.
    pub row_limit: u32,
    /// How many locations to list.
    pub top_locations: usize,
}

/// Settings for the optional response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a cached response stays valid.
    pub ttl_secs: u64,
    /// Most responses held. Expired entries are swept first, then the
    /// oldest live ones are evicted.
    pub max_entries: usize,
    /// Decimal places reference coordinates are rounded to in cache keys.
    pub coordinate_decimals: i32,
}

/// Configuration for the heatmap pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Reports and reference points must fall inside this box.
    pub region: BoundingBox,
    /// Accepted report categories.
    pub categories: CategorySet,
    /// Latitude used to size grid longitude when there is no reference
    /// point.
    pub fallback_latitude: f64,
    /// Look-back window in days.
    pub days: ParamRange,
    /// Minimum reports per displayed cell.
    pub min_reports: ParamRange,
    /// Radius around a reference point, in meters.
    pub radius_meters: ParamRange,
    /// Grid cell size, in meters.
    pub cell_size_meters: CellSizeRange,
    /// Maximum rows fetched for a heatmap query.
    pub fetch_limit: u32,
    /// Stats breakdown settings.
    pub stats: StatsConfig,
    /// Response cache settings.
    pub cache: CacheConfig,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            // Japan mainland
            region: BoundingBox::new(123.0, 24.0, 146.0, 46.0),
            categories: CategorySet::default(),
            // Osaka
            fallback_latitude: 34.6937,
            days: ParamRange::new(1, 365, 30),
            min_reports: ParamRange::new(1, 100, 3),
            radius_meters: ParamRange::new(50, 10_000, 800),
            cell_size_meters: CellSizeRange {
                min: 25,
                max: 2000,
                nearby_default: 75,
                wide_default: 250,
            },
            fetch_limit: 1000,
            stats: StatsConfig {
                row_limit: 10_000,
                top_locations: 5,
            },
            cache: CacheConfig {
                ttl_secs: 300,
                max_entries: 100,
                coordinate_decimals: 3,
            },
        }
    }
}

impl HeatmapConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or the values are
    /// inconsistent.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, is malformed, or
    /// holds inconsistent values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&toml_str)?;
        log::info!("Loaded heatmap config from {}", path.display());
        Ok(config)
    }

    /// Checks that the values are consistent with each other.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.region.is_well_formed() {
            return Err(ConfigError::Invalid {
                message: format!("region is not a valid bounding box: {:?}", self.region),
            });
        }
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid {
                message: "categories must not be empty".to_string(),
            });
        }
        if !self.fallback_latitude.is_finite() || self.fallback_latitude.abs() > 90.0 {
            return Err(ConfigError::Invalid {
                message: format!("fallback_latitude out of range: {}", self.fallback_latitude),
            });
        }
        self.days.check("days")?;
        self.min_reports.check("min_reports")?;
        self.radius_meters.check("radius_meters")?;
        self.cell_size_meters.check()?;
        if self.days.min == 0 || self.min_reports.min == 0 || self.radius_meters.min == 0 {
            return Err(ConfigError::Invalid {
                message: "days, min_reports and radius_meters must have a positive min"
                    .to_string(),
            });
        }
        if self.fetch_limit == 0 || self.stats.row_limit == 0 {
            return Err(ConfigError::Invalid {
                message: "row limits must be positive".to_string(),
            });
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid {
                message: "cache.max_entries must be positive".to_string(),
            });
        }
        Ok(())
    }
}
