use std::sync::Arc;

use geoseek_store::{GeoPoint, RecordStore, SearchFilters, TableQuery, bounding_box};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{
    SearchRecord,
    deadline::{CallError, call_with_deadline},
    effective_radius, rank_by_distance,
};
use crate::{
    classify::{ErrorKind, SearchFailure},
    config::FallbackTier,
    error::SearchError,
};

/// A tier about to be queried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierAttempt {
    /// One-based tier number
    pub tier: usize,
    /// Number of tiers in the ladder
    pub of: usize,
    pub radius_km: f64,
    pub limit: usize,
}

/// How one tier ended.
enum TierVerdict {
    Settled(Result<Vec<SearchRecord>, SearchError>),
    Escalate(SearchFailure),
}

/// Bounding-box search with a ladder of shrinking tiers.
///
/// Each tier issues one table query. A timeout escalates to the next tier;
/// any other outcome settles the search. Network and permission failures are
/// returned as errors, while other backend failures mean "no results in
/// area". When every tier times out the last timeout is returned.
pub struct FallbackSearchClient {
    store: Arc<dyn RecordStore>,
    tiers: Vec<FallbackTier>,
}

impl FallbackSearchClient {
    pub fn new(store: Arc<dyn RecordStore>, tiers: Vec<FallbackTier>) -> Self {
        Self { store, tiers }
    }

    pub fn tiers(&self) -> &[FallbackTier] {
        &self.tiers
    }

    pub async fn search(
        &self,
        point: &GeoPoint,
        radius_km: f64,
        filters: &SearchFilters,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchRecord>, SearchError> {
        self.search_observed(point, radius_km, filters, cancel, &|_| {})
            .await
    }

    /// Like [`search`](Self::search), reporting each tier before it is queried.
    #[instrument(name = "Fallback search", level = "debug", skip_all, fields(radius_km))]
    pub async fn search_observed(
        &self,
        point: &GeoPoint,
        radius_km: f64,
        filters: &SearchFilters,
        cancel: &CancellationToken,
        observer: &(dyn Fn(TierAttempt) + Send + Sync),
    ) -> Result<Vec<SearchRecord>, SearchError> {
        let radius_km = effective_radius(radius_km);
        tracing::Span::current().record("radius_km", radius_km);

        let mut last_timeout = None;
        for (idx, tier) in self.tiers.iter().enumerate() {
            let attempt = TierAttempt {
                tier: idx + 1,
                of: self.tiers.len(),
                radius_km: tier.radius_for(radius_km),
                limit: tier.limit,
            };
            match self.run_tier(point, filters, tier, attempt, cancel, observer).await {
                TierVerdict::Settled(outcome) => return outcome,
                TierVerdict::Escalate(failure) => last_timeout = Some(failure),
            }
        }

        let failure = last_timeout.unwrap_or_else(|| {
            SearchFailure::new(ErrorKind::Timeout, "no fallback tiers configured")
        });
        warn!(tiers = self.tiers.len(), "All fallback tiers timed out");
        Err(failure.into())
    }

    async fn run_tier(
        &self,
        point: &GeoPoint,
        filters: &SearchFilters,
        tier: &FallbackTier,
        attempt: TierAttempt,
        cancel: &CancellationToken,
        observer: &(dyn Fn(TierAttempt) + Send + Sync),
    ) -> TierVerdict {
        if cancel.is_cancelled() {
            return TierVerdict::Settled(Err(SearchError::Cancelled));
        }
        observer(attempt);
        let query = TableQuery {
            bbox: bounding_box(point, attempt.radius_km),
            filters: filters.clone(),
            limit: tier.limit,
            projection: tier.projection,
            timeout: tier.timeout,
        };
        debug!(
            tier = attempt.tier,
            bbox = ?query.bbox,
            limit = tier.limit,
            "Querying fallback tier"
        );

        let t_tier = Instant::now();
        match call_with_deadline(self.store.query_table(query), tier.timeout, cancel).await {
            Ok(rows) => {
                let records = rank_by_distance(rows, point);
                info!(
                    tier = attempt.tier,
                    radius_km = attempt.radius_km,
                    records = records.len(),
                    elapsed = ?t_tier.elapsed(),
                    "Fallback tier returned"
                );
                TierVerdict::Settled(Ok(records))
            }
            Err(CallError::Cancelled) => TierVerdict::Settled(Err(SearchError::Cancelled)),
            Err(CallError::Elapsed(deadline)) => {
                warn!(tier = attempt.tier, ?deadline, "Fallback tier timed out");
                TierVerdict::Escalate(SearchFailure::new(
                    ErrorKind::Timeout,
                    format!("fallback tier {} exceeded {deadline:?}", attempt.tier),
                ))
            }
            Err(CallError::Store(err)) => {
                let failure = SearchFailure::from_store(&err);
                match failure.kind {
                    ErrorKind::Timeout => {
                        warn!(
                            tier = attempt.tier,
                            error = %err,
                            "Fallback tier timed out in backend"
                        );
                        TierVerdict::Escalate(failure)
                    }
                    ErrorKind::Network | ErrorKind::Permission => {
                        warn!(tier = attempt.tier, %failure, "Fallback tier failed");
                        TierVerdict::Settled(Err(failure.into()))
                    }
                    _ => {
                        warn!(
                            tier = attempt.tier,
                            %failure,
                            "Fallback tier failed, treating as no results in area"
                        );
                        TierVerdict::Settled(Ok(Vec::new()))
                    }
                }
            }
        }
    }
}
