//! Short-lived response cache in front of [`HeatmapService`].
//!
//! Keys are built from the validated query, so differently spelled but
//! equivalent requests (`"030"` vs `"30"`, blank vs absent) share an entry.
//! Reference coordinates are rounded before keying so that nearby users hit
//! the same entry. Errors are never cached. The cache never holds more than
//! `max_entries` responses: expired entries go first, then the oldest.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use nosmoke_map_geo::round_to;
use nosmoke_map_heatmap_models::{HeatmapQueryParams, HeatmapResponse};

use crate::HeatmapError;
use crate::pipeline::HeatmapService;
use crate::validate::{HeatmapQuery, validate_query};

struct CacheEntry {
    sequence: u64,
    stored_at: Instant,
    response: HeatmapResponse,
}

/// A [`HeatmapService`] that reuses responses for repeated queries until
/// they expire.
pub struct CachedHeatmapService {
    inner: HeatmapService,
    ttl: Duration,
    max_entries: usize,
    coordinate_decimals: i32,
    stores: AtomicU64,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl std::fmt::Debug for CachedHeatmapService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedHeatmapService")
            .field("inner", &self.inner)
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl CachedHeatmapService {
    /// Wraps `inner`, taking cache settings from its configuration.
    #[must_use]
    pub fn new(inner: HeatmapService) -> Self {
        let cache = inner.config().cache;
        Self {
            inner,
            ttl: Duration::from_secs(cache.ttl_secs),
            max_entries: cache.max_entries,
            coordinate_decimals: cache.coordinate_decimals,
            stores: AtomicU64::new(0),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of entries held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Builds the heatmap for `params`, reusing a fresh cached response.
    ///
    /// # Errors
    ///
    /// See [`HeatmapService::build`].
    pub async fn build(&self, params: &HeatmapQueryParams) -> Result<HeatmapResponse, HeatmapError> {
        self.build_at(params, Utc::now()).await
    }

    /// Like [`Self::build`] with an explicit window end. `now` only affects
    /// responses computed on a miss; expiry runs on the monotonic clock.
    ///
    /// # Errors
    ///
    /// See [`HeatmapService::build`].
    pub async fn build_at(
        &self,
        params: &HeatmapQueryParams,
        now: DateTime<Utc>,
    ) -> Result<HeatmapResponse, HeatmapError> {
        let query = validate_query(params, self.inner.config())?;
        let key = self.cache_key(&query);

        if let Some(response) = self.lookup(&key) {
            log::debug!("Heatmap cache hit for {key}");
            return Ok(response);
        }

        let response = self.inner.run_query(&query, now).await?;
        self.store(key, response.clone());
        Ok(response)
    }

    fn cache_key(&self, query: &HeatmapQuery) -> String {
        let category = query.category.as_ref().map_or("all", |c| c.as_str());
        let reference = query.reference.map_or_else(
            || "wide".to_string(),
            |area| {
                format!(
                    "{},{},{}",
                    round_to(area.center.latitude, self.coordinate_decimals),
                    round_to(area.center.longitude, self.coordinate_decimals),
                    area.radius_meters
                )
            },
        );
        format!(
            "{category}|{}|{}|{reference}|{}",
            query.days, query.min_reports, query.cell_size_meters
        )
    }

    fn lookup(&self, key: &str) -> Option<HeatmapResponse> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: String, response: HeatmapResponse) {
        let sequence = self.stores.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.lock();
        entries.insert(
            key,
            CacheEntry {
                sequence,
                stored_at: Instant::now(),
                response,
            },
        );

        if entries.len() > self.max_entries {
            let before = entries.len();
            entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
            log::debug!(
                "Swept {} expired heatmap cache entries",
                before - entries.len()
            );
        }

        while entries.len() > self.max_entries {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.sequence)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            log::debug!("Evicting oldest heatmap cache entry {oldest}");
            entries.remove(&oldest);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
