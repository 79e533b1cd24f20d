use std::sync::Arc;

use geoseek_store::{GeoPoint, Projection, RecordStore, SearchFilters};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{FallbackSearchClient, SearchRecord, effective_radius};
use crate::{
    config::{FallbackTier, ProgressiveConfig},
    error::SearchError,
};

/// Low-latency partial search over a reduced radius.
///
/// Always goes through a single bounding-box tier, never the indexed path.
pub struct ProgressiveSearchClient {
    fallback: FallbackSearchClient,
    radius_factor: f64,
}

impl ProgressiveSearchClient {
    pub fn new(store: Arc<dyn RecordStore>, config: &ProgressiveConfig) -> Self {
        let tier = FallbackTier {
            radius_factor: 1.0,
            min_radius_km: 0.0,
            limit: config.limit,
            timeout: config.timeout,
            projection: Projection::All,
        };
        Self {
            fallback: FallbackSearchClient::new(store, vec![tier]),
            radius_factor: config.radius_factor,
        }
    }

    pub fn quick_radius(&self, radius_km: f64) -> f64 {
        effective_radius(radius_km) * self.radius_factor
    }

    #[instrument(name = "Quick search", level = "debug", skip_all)]
    pub async fn quick_search(
        &self,
        point: &GeoPoint,
        radius_km: f64,
        filters: &SearchFilters,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchRecord>, SearchError> {
        self.fallback
            .search(point, self.quick_radius(radius_km), filters, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use geoseek_store::{
        InMemoryStore, Injected, bounding_box,
        test_data::{self, LONDON},
    };

    use super::*;
    use crate::classify::ErrorKind;

    #[tokio::test]
    async fn test_quick_search_uses_half_radius_table_query() {
        let store = Arc::new(InMemoryStore::new(test_data::london_records()));
        let client = ProgressiveSearchClient::new(store.clone(), &ProgressiveConfig::default());
        let records = client
            .quick_search(&LONDON, 4.0, &SearchFilters::default(), &CancellationToken::new())
            .await
            .unwrap();

        // Corners of a 2 km box sit just under 3 km away
        assert!(records.iter().all(|r| r.distance_km() < 3.0));
        assert_eq!(store.calls().nearby, 0);
        let queries = store.table_queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].bbox, bounding_box(&LONDON, 2.0));
        assert_eq!(queries[0].limit, 50);
        assert_eq!(queries[0].timeout, Duration::from_secs(8));
    }

    #[test]
    fn test_quick_radius_defaults_bad_input() {
        let store = Arc::new(InMemoryStore::new(Vec::new()));
        let client = ProgressiveSearchClient::new(store, &ProgressiveConfig::default());
        assert_eq!(client.quick_radius(0.0), 2.5);
        assert_eq!(client.quick_radius(10.0), 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tier_timeout_is_an_error() {
        let store = Arc::new(InMemoryStore::builder().script_table([Injected::Hang]).build());
        let client = ProgressiveSearchClient::new(store.clone(), &ProgressiveConfig::default());
        let err = client
            .quick_search(&LONDON, 5.0, &SearchFilters::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Timeout));
        assert_eq!(store.calls().table, 1);
    }
}
