use std::{sync::Arc, time::Duration};

use geoseek_store::{NearbyQuery, Record, RecordStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{
    SearchRecord, SearchRequest,
    deadline::{CallError, call_with_deadline},
    rank_by_distance,
};
use crate::{
    classify::{ErrorKind, SearchFailure, classify, is_non_critical},
    config::SpatialConfig,
    error::SearchError,
};

/// Result of the indexed tier.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialOutcome {
    /// Rows returned by the index, possibly empty or partial.
    Records(Vec<SearchRecord>),
    /// The store has no indexed nearby capability. Not an error.
    Unavailable,
}

/// Primary search tier backed by the store's indexed nearby query.
pub struct SpatialSearchClient {
    store: Arc<dyn RecordStore>,
    config: SpatialConfig,
}

impl SpatialSearchClient {
    pub fn new(store: Arc<dyn RecordStore>, config: SpatialConfig) -> Self {
        Self { store, config }
    }

    /// Large areas get a shorter deadline and keep partial rows on timeout.
    pub fn is_large_area(&self, radius_km: f64) -> bool {
        radius_km > self.config.large_area_radius_km
    }

    pub fn timeout_for(&self, radius_km: f64) -> Duration {
        if self.is_large_area(radius_km) {
            self.config.large_area_timeout
        } else {
            self.config.timeout
        }
    }

    #[instrument(
        name = "Spatial search",
        level = "debug",
        skip_all,
        fields(radius_km = request.radius_km(), page = request.page())
    )]
    pub async fn search(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SpatialOutcome, SearchError> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let radius_km = request.radius_km();
        let large_area = self.is_large_area(radius_km);
        let timeout = self.timeout_for(radius_km);
        let query = NearbyQuery {
            center: *request.point(),
            radius_km,
            page: request.page(),
            page_size: request.page_size(),
            timeout,
        };

        match call_with_deadline(self.store.nearby(query), timeout, cancel).await {
            Ok(rows) => Ok(SpatialOutcome::Records(self.finish(rows, request))),
            Err(CallError::Cancelled) => Err(SearchError::Cancelled),
            Err(CallError::Elapsed(deadline)) => {
                warn!(?deadline, large_area, "Nearby query exceeded its deadline");
                Err(SearchFailure::new(
                    ErrorKind::Timeout,
                    format!("nearby query exceeded {deadline:?}"),
                )
                .into())
            }
            Err(CallError::Store(err)) => {
                if is_non_critical(&err) {
                    debug!(error = %err, "Nearby capability unavailable");
                    return Ok(SpatialOutcome::Unavailable);
                }
                let kind = classify(&err);
                if kind == ErrorKind::Timeout && large_area && err.has_partial() {
                    warn!(
                        rows = err.partial.len(),
                        "Large-area nearby query timed out, keeping partial rows"
                    );
                    return Ok(SpatialOutcome::Records(self.finish(err.partial, request)));
                }
                Err(SearchFailure::new(kind, err.message).into())
            }
        }
    }

    /// Apply filters the nearby query cannot express, then rank by distance.
    fn finish(&self, rows: Vec<Record>, request: &SearchRequest) -> Vec<SearchRecord> {
        let filters = request.filters();
        let fetched = rows.len();
        let kept = rank_by_distance(
            rows.into_iter().filter(|r| filters.matches_loose(r)),
            request.point(),
        );
        debug!(fetched, kept = kept.len(), "Spatial rows filtered");
        kept
    }
}
