use std::sync::Arc;

use geoseek_store::RecordStore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{
    FallbackSearchClient, SearchMethod, SearchRecord, SearchRequest, SearchResult, SearchTiming,
    SpatialOutcome, SpatialSearchClient, TierAttempt,
};
use crate::{cache::ResultCache, config::EngineConfig, error::SearchError};

/// Stage reached by a running [`SearchExecutor::execute_observed`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchProgress {
    CacheLookup,
    Spatial,
    Fallback(TierAttempt),
    Processing,
}

/// Runs one search request: cache, then the indexed tier, then the fallback ladder.
///
/// Only the first page is cached. The fallback ladder has no notion of pages,
/// so later pages are cut from its distance-sorted rows.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use geoseek::{EngineConfig, SearchExecutor, SearchFilters, SearchRequest};
/// use geoseek::store::{InMemoryStore, test_data};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), geoseek::SearchError> {
/// let store = Arc::new(InMemoryStore::new(test_data::london_records()));
/// let executor = SearchExecutor::new(store, &EngineConfig::default());
/// let request = SearchRequest::new(test_data::LONDON, 2.0, SearchFilters::default());
/// let result = executor.execute(&request, &CancellationToken::new()).await?;
/// println!("{} records via {}", result.len(), result.method);
/// # Ok(())
/// # }
/// ```
pub struct SearchExecutor {
    spatial: SpatialSearchClient,
    fallback: FallbackSearchClient,
    cache: Arc<ResultCache>,
}

impl SearchExecutor {
    pub fn new(store: Arc<dyn RecordStore>, config: &EngineConfig) -> Self {
        Self::with_cache(store, config, Arc::new(ResultCache::from_config(&config.cache)))
    }

    /// Build an executor that shares an existing cache.
    pub fn with_cache(
        store: Arc<dyn RecordStore>,
        config: &EngineConfig,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            spatial: SpatialSearchClient::new(store.clone(), config.spatial.clone()),
            fallback: FallbackSearchClient::new(store, config.fallback_tiers.clone()),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn invalidate_cache(&self) {
        self.cache.clear();
        debug!("Result cache invalidated");
    }

    pub async fn execute(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, SearchError> {
        self.execute_observed(request, cancel, &|_| {}).await
    }

    /// Like [`execute`](Self::execute), reporting each stage as it starts.
    #[instrument(
        name = "Execute search",
        level = "debug",
        skip_all,
        fields(
            lat = request.point().lat,
            lng = request.point().lng,
            radius_km = request.radius_km(),
            page = request.page()
        )
    )]
    pub async fn execute_observed(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
        observer: &(dyn Fn(SearchProgress) + Send + Sync),
    ) -> Result<SearchResult, SearchError> {
        let t_total = Instant::now();
        request.validate()?;
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let cacheable = request.page() == 0;
        if cacheable {
            observer(SearchProgress::CacheLookup);
            if let Some(records) =
                self.cache
                    .get(request.point(), request.radius_km(), request.filters())
            {
                debug!(records = records.len(), "Serving search from cache");
                return Ok(SearchResult {
                    records,
                    method: SearchMethod::Cache,
                    timing: SearchTiming {
                        total: t_total.elapsed(),
                        ..Default::default()
                    },
                });
            }
        }

        observer(SearchProgress::Spatial);
        let t_spatial = Instant::now();
        let spatial = self.spatial.search(request, cancel).await;
        let spatial_elapsed = t_spatial.elapsed();
        match spatial {
            Ok(SpatialOutcome::Records(records)) => {
                observer(SearchProgress::Processing);
                info!(
                    records = records.len(),
                    elapsed = ?spatial_elapsed,
                    "Spatial search complete"
                );
                return Ok(self.finish(
                    request,
                    records,
                    SearchMethod::Spatial,
                    SearchTiming {
                        total: t_total.elapsed(),
                        spatial: Some(spatial_elapsed),
                        fallback: None,
                    },
                ));
            }
            Ok(SpatialOutcome::Unavailable) => {
                info!("Indexed search unavailable, using fallback");
            }
            Err(SearchError::Cancelled) => return Err(SearchError::Cancelled),
            Err(SearchError::Failed(failure)) => {
                warn!(%failure, "Spatial search failed, using fallback");
            }
        }

        let t_fallback = Instant::now();
        let mut records = self
            .fallback
            .search_observed(
                request.point(),
                request.radius_km(),
                request.filters(),
                cancel,
                &|attempt| observer(SearchProgress::Fallback(attempt)),
            )
            .await?;
        if !cacheable {
            records = page_of(records, request.page(), request.page_size());
            debug!(page = request.page(), records = records.len(), "Sliced fallback page");
        }
        observer(SearchProgress::Processing);
        info!(records = records.len(), elapsed = ?t_fallback.elapsed(), "Fallback search complete");

        Ok(self.finish(
            request,
            records,
            SearchMethod::Fallback,
            SearchTiming {
                total: t_total.elapsed(),
                spatial: Some(spatial_elapsed),
                fallback: Some(t_fallback.elapsed()),
            },
        ))
    }

    fn finish(
        &self,
        request: &SearchRequest,
        records: Vec<SearchRecord>,
        method: SearchMethod,
        timing: SearchTiming,
    ) -> SearchResult {
        if request.page() == 0 {
            self.cache.set(
                request.point(),
                request.radius_km(),
                request.filters(),
                records.clone(),
            );
        }
        SearchResult {
            records,
            method,
            timing,
        }
    }
}

fn page_of(records: Vec<SearchRecord>, page: u32, page_size: u32) -> Vec<SearchRecord> {
    let skip = page as usize * page_size as usize;
    records.into_iter().skip(skip).take(page_size as usize).collect()
}
