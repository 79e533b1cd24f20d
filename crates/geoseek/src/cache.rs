//! Bounded, time-limited cache of search results.
//!
//! Keys are built from coordinates rounded to four decimal places, the radius
//! rounded to metres, and the sorted filter pairs, so repeated searches of the
//! "same" spot hit even with floating-point jitter. Expired entries are purged
//! lazily on lookup; when the cache is over capacity the entry with the oldest
//! creation time is evicted.

use std::{fmt, time::Duration};

use ahash::AHashMap as HashMap;
use geoseek_store::{GeoPoint, SearchFilters};
use itertools::Itertools;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{config::CacheConfig, search::SearchRecord};

/// Stable serialisation of the cache-relevant search parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(point: &GeoPoint, radius_km: f64, filters: &SearchFilters) -> Self {
        let lat = (point.lat * 10_000.0).round() as i64;
        let lng = (point.lng * 10_000.0).round() as i64;
        let radius_m = (radius_km * 1000.0).round() as i64;
        let filters = filters
            .pairs()
            .into_iter()
            .map(|(field, value)| format!("{field}={}", value.to_lowercase()))
            .join("&");
        Self(format!("{lat}:{lng}:{radius_m}:{filters}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
}

#[derive(Debug)]
struct CacheEntry {
    data: Vec<SearchRecord>,
    created_at: Instant,
    // Breaks ties between entries created at the same instant
    seq: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    next_seq: u64,
    stats: CacheStats,
}

/// Shared result cache. Wrap in an `Arc` to share between executors.
#[derive(Debug)]
pub struct ResultCache {
    enabled: bool,
    capacity: usize,
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            enabled: capacity > 0,
            capacity,
            ttl,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        if config.enabled {
            Self::new(config.capacity, config.ttl)
        } else {
            Self::disabled()
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(
        &self,
        point: &GeoPoint,
        radius_km: f64,
        filters: &SearchFilters,
    ) -> Option<Vec<SearchRecord>> {
        self.get_key(&CacheKey::new(point, radius_km, filters))
    }

    pub fn set(
        &self,
        point: &GeoPoint,
        radius_km: f64,
        filters: &SearchFilters,
        records: Vec<SearchRecord>,
    ) {
        self.set_key(CacheKey::new(point, radius_km, filters), records);
    }

    /// Whether a live entry exists. Does not touch the hit/miss counters.
    pub fn contains(&self, point: &GeoPoint, radius_km: f64, filters: &SearchFilters) -> bool {
        if !self.enabled {
            return false;
        }
        let key = CacheKey::new(point, radius_km, filters);
        self.inner
            .lock()
            .entries
            .get(&key)
            .is_some_and(|entry| entry.created_at.elapsed() < self.ttl)
    }

    pub fn get_key(&self, key: &CacheKey) -> Option<Vec<SearchRecord>> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.created_at.elapsed() >= self.ttl,
        };
        if expired {
            inner.entries.remove(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            debug!(%key, "Cache entry expired");
            return None;
        }
        inner.stats.hits += 1;
        trace!(%key, "Cache hit");
        inner.entries.get(key).map(|entry| entry.data.clone())
    }

    pub fn set_key(&self, key: CacheKey, records: Vec<SearchRecord>) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key,
            CacheEntry {
                data: records,
                created_at: Instant::now(),
                seq,
            },
        );
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.created_at, entry.seq))
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            inner.entries.remove(&oldest);
            inner.stats.evictions += 1;
            debug!(key = %oldest, "Evicted oldest cache entry");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use geoseek_store::{Record, test_data::LONDON};

    use super::*;

    fn records(n: usize) -> Vec<SearchRecord> {
        (0..n)
            .map(|i| SearchRecord::new(Record::new(format!("r{i}"), LONDON), &LONDON))
            .collect()
    }

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng).unwrap()
    }

    #[test]
    fn test_get_after_set_returns_same_records() {
        let cache = ResultCache::default();
        let filters = SearchFilters::new().status("active");
        cache.set(&LONDON, 5.0, &filters, records(3));
        assert_eq!(cache.get(&LONDON, 5.0, &filters), Some(records(3)));
    }

    #[test]
    fn test_jitter_beyond_fourth_decimal_hits() {
        let cache = ResultCache::default();
        let filters = SearchFilters::default();
        cache.set(&point(51.50741, -0.12781), 5.0, &filters, records(1));
        assert!(
            cache
                .get(&point(51.50744, -0.12779), 5.0, &filters)
                .is_some()
        );
        assert!(cache.get(&point(51.5080, -0.1278), 5.0, &filters).is_none());
    }

    #[test]
    fn test_key_depends_on_radius_and_filters() {
        let a = CacheKey::new(&LONDON, 5.0, &SearchFilters::default());
        let b = CacheKey::new(&LONDON, 2.0, &SearchFilters::default());
        let c = CacheKey::new(&LONDON, 5.0, &SearchFilters::new().status("active"));
        let d = CacheKey::new(&LONDON, 5.0, &SearchFilters::new().status("ACTIVE"));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(c, d);
        assert_eq!(c.as_str(), "515074:-1278:5000:status=active");
    }

    #[test]
    fn test_negative_zero_rounds_to_same_key() {
        let a = CacheKey::new(&point(0.00001, -0.00001), 1.0, &SearchFilters::default());
        let b = CacheKey::new(&point(0.0, 0.0), 1.0, &SearchFilters::default());
        assert_eq!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = ResultCache::new(20, Duration::from_secs(600));
        let filters = SearchFilters::default();
        cache.set(&LONDON, 5.0, &filters, records(2));

        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(cache.get(&LONDON, 5.0, &filters).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&LONDON, 5.0, &filters).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let cache = ResultCache::new(20, Duration::from_secs(600));
        let filters = SearchFilters::default();
        for i in 0..21 {
            cache.set(&point(10.0 + f64::from(i), 0.0), 1.0, &filters, records(1));
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        assert_eq!(cache.len(), 20);
        assert!(cache.get(&point(10.0, 0.0), 1.0, &filters).is_none());
        assert!(cache.get(&point(11.0, 0.0), 1.0, &filters).is_some());
        assert!(cache.get(&point(30.0, 0.0), 1.0, &filters).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_same_instant_evicts_first_inserted() {
        let cache = ResultCache::new(2, Duration::from_secs(600));
        let filters = SearchFilters::default();
        for i in 0..3 {
            cache.set(&point(f64::from(i), 0.0), 1.0, &filters, records(1));
        }
        assert!(cache.get(&point(0.0, 0.0), 1.0, &filters).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let cache = ResultCache::disabled();
        cache.set(&LONDON, 5.0, &SearchFilters::default(), records(1));
        assert!(cache.get(&LONDON, 5.0, &SearchFilters::default()).is_none());
        assert!(cache.is_empty());
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = ResultCache::default();
        let filters = SearchFilters::default();
        assert!(cache.get(&LONDON, 5.0, &filters).is_none());
        cache.set(&LONDON, 5.0, &filters, records(1));
        assert!(cache.get(&LONDON, 5.0, &filters).is_some());
        assert!(cache.contains(&LONDON, 5.0, &filters));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
