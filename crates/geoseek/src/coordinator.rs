//! Debounced, deduplicated search session.
//!
//! [`SearchCoordinator`] owns the pending search parameters and at most one
//! active search. Parameter changes arm a debounce timer; when it fires the
//! pending request is compared with the last executed one and dropped if
//! identical. A distinct request cancels the running search, waits for it to
//! settle, then starts. Every task checks that its search id is still the
//! active one before touching shared state, so results of superseded searches
//! are discarded on arrival.
//!
//! State is published through a [`tokio::sync::watch`] channel.

use std::{fmt, sync::Arc, time::Duration};

use geoseek_store::{GeoPoint, RecordStore, SearchFilters};
use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cache::ResultCache,
    classify::SearchFailure,
    config::EngineConfig,
    error::SearchError,
    search::{
        DEFAULT_RADIUS_KM, ProgressiveSearchClient, SearchExecutor, SearchMethod, SearchProgress,
        SearchRecord, SearchRequest, SearchResult,
    },
    telemetry::{TelemetryEvent, TelemetryKind, TelemetryLogger, TracingTelemetry},
};

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SearchStage {
    #[default]
    Idle,
    Coordinates,
    Searching,
    Processing,
    Complete,
}

impl SearchStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Coordinates => "coordinates",
            Self::Searching => "searching",
            Self::Processing => "processing",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for SearchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of the current search.
///
/// `progress_pct` is advisory only.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    /// Id of the search this state belongs to, 0 before the first search
    pub search_id: u64,
    pub stage: SearchStage,
    pub progress_pct: u8,
    pub error: Option<SearchFailure>,
    pub method: SearchMethod,
    pub results: Vec<SearchRecord>,
    pub has_results: bool,
}

impl SearchState {
    pub fn is_searching(&self) -> bool {
        matches!(
            self.stage,
            SearchStage::Coordinates | SearchStage::Searching | SearchStage::Processing
        )
    }
}

fn tier_progress(tier: usize) -> u8 {
    match tier {
        0 | 1 => 50,
        2 => 70,
        _ => 85,
    }
}

#[derive(Debug, Clone)]
struct PendingParams {
    point: Option<GeoPoint>,
    radius_km: f64,
    filters: SearchFilters,
}

impl Default for PendingParams {
    fn default() -> Self {
        Self {
            point: None,
            radius_km: DEFAULT_RADIUS_KM,
            filters: SearchFilters::default(),
        }
    }
}

#[derive(Debug)]
struct ActiveSearch {
    id: u64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    /// The main path has resolved; quick results are no longer shown.
    main_settled: bool,
    /// An outcome (results or error) has been published for this id.
    reported: bool,
}

#[derive(Debug, Default)]
struct Session {
    pending: PendingParams,
    debounce_epoch: u64,
    timer: Option<JoinHandle<()>>,
    next_id: u64,
    active: Option<ActiveSearch>,
    last_executed: Option<SearchRequest>,
    last_request: Option<SearchRequest>,
}

impl Session {
    fn pending_request(&self, page_size: u32) -> Option<SearchRequest> {
        let point = self.pending.point?;
        Some(
            SearchRequest::new(point, self.pending.radius_km, self.pending.filters.clone())
                .with_page(0, page_size),
        )
    }

    fn is_current(&self, id: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.id == id && !active.reported)
    }

    fn stop_timer(&mut self) {
        self.debounce_epoch += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    executor: SearchExecutor,
    progressive: Option<ProgressiveSearchClient>,
    config: EngineConfig,
    telemetry: Arc<dyn TelemetryLogger>,
    state: watch::Sender<SearchState>,
    session: Mutex<Session>,
}

/// Front door of the engine.
///
/// Methods that schedule work spawn Tokio tasks and must be called from
/// within a Tokio runtime.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use geoseek::{SearchCoordinator, SearchFilters, SearchStage};
/// use geoseek::store::{InMemoryStore, test_data};
///
/// # async fn run() {
/// let store = Arc::new(InMemoryStore::new(test_data::london_records()));
/// let coordinator = SearchCoordinator::new(store);
/// let mut updates = coordinator.subscribe();
///
/// coordinator.start_search(test_data::LONDON, SearchFilters::default());
/// let state = updates
///     .wait_for(|s| matches!(s.stage, SearchStage::Complete | SearchStage::Idle) && s.search_id > 0)
///     .await
///     .unwrap()
///     .clone();
/// println!("{} results via {}", state.results.len(), state.method);
/// # }
/// ```
pub struct SearchCoordinator {
    inner: Arc<Inner>,
}

impl SearchCoordinator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::builder(store).build()
    }

    pub fn builder(store: Arc<dyn RecordStore>) -> SearchCoordinatorBuilder {
        SearchCoordinatorBuilder {
            store,
            config: EngineConfig::default(),
            telemetry: None,
            cache: None,
        }
    }

    /// Set the point and filters to search, subject to debounce.
    pub fn start_search(&self, point: GeoPoint, filters: SearchFilters) {
        let mut session = self.inner.session.lock();
        session.pending.point = Some(point);
        session.pending.filters = filters;
        self.inner.schedule(&mut session, self.inner.config.debounce, None);
    }

    /// Change the pending radius. Searches again once a point is set.
    pub fn set_radius(&self, radius_km: f64) {
        let mut session = self.inner.session.lock();
        session.pending.radius_km = radius_km;
        if session.pending.point.is_some() {
            self.inner.schedule(&mut session, self.inner.config.debounce, None);
        }
    }

    /// Change the pending filters. Searches again once a point is set.
    pub fn set_filters(&self, filters: SearchFilters) {
        let mut session = self.inner.session.lock();
        session.pending.filters = filters;
        if session.pending.point.is_some() {
            self.inner.schedule(&mut session, self.inner.config.debounce, None);
        }
    }

    /// Drop any pending or running search and return to idle.
    ///
    /// The running search is cancelled cooperatively; whatever it produces
    /// afterwards is discarded.
    pub fn cancel_search(&self) {
        let mut session = self.inner.session.lock();
        session.stop_timer();
        session.last_executed = None;
        if let Some(active) = session.active.take() {
            active.cancel.cancel();
            info!(search_id = active.id, "Search cancelled");
        }
        self.inner.state.send_replace(SearchState::default());
    }

    /// Run the most recent request again right away, skipping debounce and
    /// deduplication. Returns `false` when nothing has been requested yet.
    pub fn retry(&self) -> bool {
        let mut session = self.inner.session.lock();
        let Some(request) = session.last_request.clone() else {
            return false;
        };
        debug!("Retrying last search");
        self.inner.schedule(&mut session, Duration::ZERO, Some(request));
        true
    }

    /// Cancel everything and wait for the running search to wind down.
    pub async fn shutdown(&self) {
        let active = {
            let mut session = self.inner.session.lock();
            session.stop_timer();
            session.active.take()
        };
        if let Some(active) = active {
            active.cancel.cancel();
            if let Some(task) = active.task {
                let _ = task.await;
            }
        }
        self.inner.state.send_replace(SearchState::default());
        debug!("Search coordinator shut down");
    }

    pub fn state(&self) -> SearchState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.inner.state.subscribe()
    }

    /// Radius the next search will use, before defaulting.
    pub fn radius_km(&self) -> f64 {
        self.inner.session.lock().pending.radius_km
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        self.inner.executor.cache()
    }

    pub fn invalidate_cache(&self) {
        self.inner.executor.invalidate_cache();
    }
}

impl Drop for SearchCoordinator {
    fn drop(&mut self) {
        let mut session = self.inner.session.lock();
        session.stop_timer();
        if let Some(active) = session.active.take() {
            active.cancel.cancel();
        }
    }
}

impl Inner {
    /// (Re)arm the debounce timer. `forced` bypasses deduplication.
    fn schedule(
        self: &Arc<Self>,
        session: &mut Session,
        delay: Duration,
        forced: Option<SearchRequest>,
    ) {
        session.stop_timer();
        let epoch = session.debounce_epoch;
        let inner = Arc::clone(self);
        session.timer = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.fire(epoch, forced).await;
        }));
    }

    async fn fire(self: Arc<Self>, epoch: u64, forced: Option<SearchRequest>) {
        let (request, previous) = {
            let mut session = self.session.lock();
            if session.debounce_epoch != epoch {
                return;
            }
            let request = match forced {
                Some(request) => request,
                None => {
                    let Some(request) = session.pending_request(self.config.page_size) else {
                        return;
                    };
                    if session.last_executed.as_ref() == Some(&request) {
                        debug!("Request identical to last executed search, dropped");
                        return;
                    }
                    request
                }
            };
            session.last_request = Some(request.clone());
            let previous = session.active.take();
            if previous.as_ref().is_some_and(|p| !p.main_settled) {
                session.last_executed = None;
            }
            (request, previous)
        };

        if let Some(previous) = previous {
            previous.cancel.cancel();
            if let Some(task) = previous.task {
                debug!(search_id = previous.id, "Waiting for superseded search to settle");
                let _ = task.await;
            }
        }

        let mut session = self.session.lock();
        if session.debounce_epoch != epoch {
            return;
        }
        self.launch(&mut session, request);
    }

    fn launch(self: &Arc<Self>, session: &mut Session, request: SearchRequest) {
        session.next_id += 1;
        let id = session.next_id;
        let cancel = CancellationToken::new();
        session.last_executed = Some(request.clone());
        self.state.send_replace(SearchState {
            search_id: id,
            stage: SearchStage::Coordinates,
            progress_pct: 10,
            ..Default::default()
        });
        info!(
            search_id = id,
            lat = request.point().lat,
            lng = request.point().lng,
            radius_km = request.radius_km(),
            "Starting search"
        );
        self.telemetry.record(TelemetryEvent::new(
            id,
            TelemetryKind::Started {
                radius_km: request.radius_km(),
            },
        ));
        let task = tokio::spawn(Arc::clone(self).run(id, request, cancel.clone()));
        session.active = Some(ActiveSearch {
            id,
            cancel,
            task: Some(task),
            main_settled: false,
            reported: false,
        });
    }

    async fn run(self: Arc<Self>, id: u64, request: SearchRequest, cancel: CancellationToken) {
        let t_start = Instant::now();
        self.update(id, |state| {
            state.stage = SearchStage::Searching;
            state.progress_pct = 20;
        });

        let quick = self.spawn_progressive(id, &request, &cancel);
        let observer = |progress: SearchProgress| self.on_progress(id, progress);
        let outcome = self
            .executor
            .execute_observed(&request, &cancel, &observer)
            .await;
        if let Some(quick) = quick {
            quick.cancel();
        }
        self.settle(id, outcome, t_start.elapsed());
    }

    /// Start the quick search unless the main path will answer from cache.
    fn spawn_progressive(
        self: &Arc<Self>,
        id: u64,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Option<CancellationToken> {
        self.progressive.as_ref()?;
        if request.validate().is_err()
            || self.executor.cache().contains(
                request.point(),
                request.radius_km(),
                request.filters(),
            )
        {
            return None;
        }
        let token = cancel.child_token();
        let inner = Arc::clone(self);
        let request = request.clone();
        let quick_cancel = token.clone();
        tokio::spawn(async move {
            let Some(progressive) = inner.progressive.as_ref() else {
                return;
            };
            match progressive
                .quick_search(
                    request.point(),
                    request.radius_km(),
                    request.filters(),
                    &quick_cancel,
                )
                .await
            {
                Ok(records) => inner.show_quick_results(id, records),
                Err(err) => debug!(search_id = id, %err, "Quick search produced nothing"),
            }
        });
        Some(token)
    }

    fn show_quick_results(&self, id: u64, records: Vec<SearchRecord>) {
        let session = self.session.lock();
        let showable = session
            .active
            .as_ref()
            .is_some_and(|a| a.id == id && !a.main_settled && !a.reported);
        if !showable {
            debug!(search_id = id, "Quick results arrived after main search, dropped");
            return;
        }
        debug!(search_id = id, records = records.len(), "Showing quick results");
        self.state.send_modify(|state| {
            state.has_results = !records.is_empty();
            state.results = records;
            state.method = SearchMethod::Progressive;
        });
    }

    fn on_progress(&self, id: u64, progress: SearchProgress) {
        let (stage, pct) = match progress {
            SearchProgress::CacheLookup => (SearchStage::Searching, 20),
            SearchProgress::Spatial => (SearchStage::Searching, 30),
            SearchProgress::Fallback(attempt) => {
                (SearchStage::Searching, tier_progress(attempt.tier))
            }
            SearchProgress::Processing => (SearchStage::Processing, 95),
        };
        self.update(id, |state| {
            state.stage = stage;
            state.progress_pct = pct;
        });
    }

    /// Apply `f` to the published state if `id` is still the active search.
    fn update(&self, id: u64, f: impl FnOnce(&mut SearchState)) {
        let session = self.session.lock();
        if session.is_current(id) {
            self.state.send_modify(f);
        }
    }

    fn settle(&self, id: u64, outcome: Result<SearchResult, SearchError>, elapsed: Duration) {
        let event = {
            let mut session = self.session.lock();
            if !session.is_current(id) {
                drop(session);
                debug!(search_id = id, "Discarding outcome of superseded search");
                self.telemetry
                    .record(TelemetryEvent::new(id, TelemetryKind::Cancelled));
                return;
            }
            if let Some(active) = session.active.as_mut() {
                active.main_settled = true;
                active.reported = true;
            }

            match outcome {
                Ok(result) => {
                    info!(
                        search_id = id,
                        method = %result.method,
                        records = result.len(),
                        ?elapsed,
                        "Search complete"
                    );
                    let count = result.len();
                    let method = result.method;
                    self.state.send_replace(SearchState {
                        search_id: id,
                        stage: SearchStage::Complete,
                        progress_pct: 100,
                        error: None,
                        method,
                        has_results: !result.records.is_empty(),
                        results: result.records,
                    });
                    TelemetryKind::Completed {
                        method,
                        count,
                        elapsed,
                    }
                }
                Err(SearchError::Cancelled) => TelemetryKind::Cancelled,
                Err(SearchError::Failed(failure)) => {
                    warn!(search_id = id, %failure, "Search failed");
                    session.last_executed = None;
                    let kind = failure.kind;
                    self.state.send_replace(SearchState {
                        search_id: id,
                        stage: SearchStage::Idle,
                        progress_pct: 0,
                        error: Some(failure),
                        method: SearchMethod::Error,
                        results: Vec::new(),
                        has_results: false,
                    });
                    TelemetryKind::Failed { kind }
                }
            }
        };
        self.telemetry.record(TelemetryEvent::new(id, event));
    }
}

pub struct SearchCoordinatorBuilder {
    store: Arc<dyn RecordStore>,
    config: EngineConfig,
    telemetry: Option<Arc<dyn TelemetryLogger>>,
    cache: Option<Arc<ResultCache>>,
}

impl SearchCoordinatorBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetryLogger>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Share a cache with other coordinators or executors.
    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> SearchCoordinator {
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(ResultCache::from_config(&self.config.cache)));
        let executor = SearchExecutor::with_cache(self.store.clone(), &self.config, cache);
        let progressive = self
            .config
            .progressive
            .enabled
            .then(|| ProgressiveSearchClient::new(self.store, &self.config.progressive));
        let (state, _) = watch::channel(SearchState::default());
        SearchCoordinator {
            inner: Arc::new(Inner {
                executor,
                progressive,
                config: self.config,
                telemetry: self
                    .telemetry
                    .unwrap_or_else(|| Arc::new(TracingTelemetry)),
                state,
                session: Mutex::new(Session::default()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use geoseek_store::{
        InMemoryStore, Injected, StoreError,
        test_data::{self, LONDON},
    };

    use super::*;
    use crate::{classify::ErrorKind, telemetry::MemoryTelemetry};

    struct Harness {
        store: Arc<InMemoryStore>,
        telemetry: Arc<MemoryTelemetry>,
        coordinator: SearchCoordinator,
    }

    fn harness(store: InMemoryStore, config: EngineConfig) -> Harness {
        let store = Arc::new(store);
        let telemetry = Arc::new(MemoryTelemetry::new());
        let coordinator = SearchCoordinator::builder(store.clone())
            .config(config)
            .telemetry(telemetry.clone())
            .build();
        Harness {
            store,
            telemetry,
            coordinator,
        }
    }

    fn without_progressive() -> EngineConfig {
        EngineConfig::builder().progressive(false).build()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_with_spatial_results() {
        let h = harness(InMemoryStore::new(test_data::london_records()), without_progressive());
        h.coordinator.start_search(LONDON, SearchFilters::default());
        assert_eq!(h.coordinator.state().stage, SearchStage::Idle);
        settle().await;

        let state = h.coordinator.state();
        assert_eq!(state.stage, SearchStage::Complete);
        assert_eq!(state.progress_pct, 100);
        assert_eq!(state.method, SearchMethod::Spatial);
        assert!(state.has_results);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_requests_run_once() {
        let h = harness(InMemoryStore::new(test_data::london_records()), without_progressive());
        h.coordinator.start_search(LONDON, SearchFilters::default());
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.coordinator.start_search(LONDON, SearchFilters::default());
        settle().await;
        assert_eq!(h.store.calls().nearby, 1);

        // Same parameters after the first search finished
        h.coordinator.start_search(LONDON, SearchFilters::default());
        settle().await;
        assert_eq!(h.store.calls().nearby, 1);
        assert_eq!(h.telemetry.events().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_changes_coalesce() {
        let h = harness(InMemoryStore::new(test_data::london_records()), without_progressive());
        h.coordinator.start_search(LONDON, SearchFilters::default());
        h.coordinator.set_radius(2.0);
        h.coordinator.set_filters(SearchFilters::new().status("active"));
        settle().await;

        let queries = h.store.nearby_queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].radius_km, 2.0);
        assert_eq!(h.coordinator.radius_km(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_parameters_supersede_running_search() {
        let store = InMemoryStore::builder()
            .records(test_data::london_records())
            .script_nearby([Injected::Hang])
            .build();
        let h = harness(store, without_progressive());
        h.coordinator.start_search(LONDON, SearchFilters::default());
        tokio::time::sleep(Duration::from_millis(400)).await;
        let first = h.coordinator.state().search_id;
        assert!(h.coordinator.state().is_searching());

        h.coordinator.set_radius(2.0);
        settle().await;

        let state = h.coordinator.state();
        assert_ne!(state.search_id, first);
        assert_eq!(state.stage, SearchStage::Complete);
        let first_events: Vec<_> = h
            .telemetry
            .events_for(first)
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(first_events.len(), 2);
        assert_eq!(first_events[1], TelemetryKind::Cancelled);
        assert!(matches!(
            h.telemetry.events_for(state.search_id)[1].kind,
            TelemetryKind::Completed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_to_idle_and_discards_results() {
        let store = InMemoryStore::builder()
            .records(test_data::london_records())
            .latency(Duration::from_secs(2))
            .build();
        let h = harness(store, without_progressive());
        h.coordinator.start_search(LONDON, SearchFilters::default());
        tokio::time::sleep(Duration::from_millis(500)).await;
        let id = h.coordinator.state().search_id;

        h.coordinator.cancel_search();
        settle().await;

        assert_eq!(h.coordinator.state(), SearchState::default());
        let events = h.telemetry.events_for(id);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, TelemetryKind::Cancelled);

        // Cancelling clears dedup so the same request can run again
        h.coordinator.start_search(LONDON, SearchFilters::default());
        settle().await;
        assert_eq!(h.coordinator.state().stage, SearchStage::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reported_once_then_retry() {
        let store = InMemoryStore::builder()
            .records(test_data::london_records())
            .nearby_unavailable()
            .script_table([Injected::Fail(StoreError::new("Failed to fetch"))])
            .build();
        let h = harness(store, without_progressive());
        h.coordinator.start_search(LONDON, SearchFilters::default());
        settle().await;

        let state = h.coordinator.state();
        assert_eq!(state.stage, SearchStage::Idle);
        assert_eq!(state.method, SearchMethod::Error);
        let failure = state.error.clone().unwrap();
        assert_eq!(failure.kind, ErrorKind::Network);
        assert!(failure.is_recoverable());
        let failed = h
            .telemetry
            .events()
            .into_iter()
            .filter(|e| matches!(e.kind, TelemetryKind::Failed { .. }))
            .count();
        assert_eq!(failed, 1);

        assert!(h.coordinator.retry());
        settle().await;
        let state = h.coordinator.state();
        assert_eq!(state.stage, SearchStage::Complete);
        assert_eq!(state.method, SearchMethod::Fallback);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_point_fails_without_backend_calls() {
        let h = harness(
            InMemoryStore::new(test_data::london_records()),
            EngineConfig::default(),
        );
        h.coordinator.start_search(
            GeoPoint {
                lat: -95.0,
                lng: 0.0,
            },
            SearchFilters::default(),
        );
        settle().await;
        let state = h.coordinator.state();
        assert_eq!(state.error.map(|e| e.kind), Some(ErrorKind::Coordinates));
        assert_eq!(h.store.calls().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_results_shown_until_main_search_wins() {
        // Large area: the indexed query hangs until its 8 s deadline
        let store = InMemoryStore::builder()
            .records(test_data::london_records())
            .script_nearby([Injected::Hang])
            .build();
        let h = harness(store, EngineConfig::default());
        h.coordinator.start_search(LONDON, SearchFilters::default());
        tokio::time::sleep(Duration::from_millis(400)).await;

        let state = h.coordinator.state();
        assert_eq!(state.method, SearchMethod::Progressive);
        assert_eq!(state.stage, SearchStage::Searching);
        assert!(state.has_results);
        let quick_ids: Vec<_> = state.results.iter().map(|r| r.id().to_string()).collect();

        settle().await;
        let state = h.coordinator.state();
        assert_eq!(state.stage, SearchStage::Complete);
        assert_eq!(state.method, SearchMethod::Fallback);
        assert!(state.results.len() >= quick_ids.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_quick_results_never_overwrite_current_search() {
        let store = InMemoryStore::builder()
            .records(test_data::london_records())
            .latency(Duration::from_secs(2))
            .build();
        let h = harness(store, EngineConfig::default());
        h.coordinator.start_search(LONDON, SearchFilters::default());
        tokio::time::sleep(Duration::from_millis(800)).await;
        let first = h.coordinator.state().search_id;
        assert!(h.coordinator.state().is_searching());
        assert!(h.coordinator.state().results.is_empty());

        h.coordinator.set_radius(2.0);
        settle().await;

        let current = h.coordinator.state();
        assert_ne!(current.search_id, first);
        assert_eq!(current.stage, SearchStage::Complete);
        assert_eq!(current.method, SearchMethod::Spatial);
        assert!(current.has_results);

        // Late arrivals tagged with the superseded id are dropped
        let stale = current.results.iter().rev().take(1).cloned().collect();
        h.coordinator.inner.show_quick_results(first, stale);
        h.coordinator.inner.update(first, |state| {
            state.stage = SearchStage::Searching;
            state.progress_pct = 20;
        });
        assert_eq!(h.coordinator.state(), current);

        let first_events: Vec<_> = h
            .telemetry
            .events_for(first)
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(first_events.last(), Some(&TelemetryKind::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_recorded_before_cached_completion() {
        let h = harness(InMemoryStore::new(test_data::london_records()), without_progressive());
        h.coordinator.start_search(LONDON, SearchFilters::default());
        settle().await;
        h.coordinator.cancel_search();
        h.telemetry.clear();

        h.coordinator.start_search(LONDON, SearchFilters::default());
        settle().await;
        let kinds: Vec<_> = h.telemetry.events().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds.len(), 2);
        assert!(matches!(kinds[0], TelemetryKind::Started { .. }));
        assert!(matches!(
            kinds[1],
            TelemetryKind::Completed {
                method: SearchMethod::Cache,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_repeat_skips_quick_search() {
        let h = harness(InMemoryStore::new(test_data::london_records()), EngineConfig::default());
        h.coordinator.start_search(LONDON, SearchFilters::default());
        settle().await;
        h.coordinator.cancel_search();
        h.store.clear_log();

        h.coordinator.start_search(LONDON, SearchFilters::default());
        settle().await;
        assert_eq!(h.coordinator.state().method, SearchMethod::Cache);
        assert_eq!(h.store.calls().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_progress() {
        let h = harness(InMemoryStore::new(test_data::london_records()), without_progressive());
        let mut updates = h.coordinator.subscribe();
        h.coordinator.start_search(LONDON, SearchFilters::default());
        let state = updates
            .wait_for(|s| s.stage == SearchStage::Complete)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.progress_pct, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_running_search() {
        let store = InMemoryStore::builder()
            .records(test_data::london_records())
            .script_nearby([Injected::Hang])
            .build();
        let h = harness(store, without_progressive());
        h.coordinator.start_search(LONDON, SearchFilters::default());
        tokio::time::sleep(Duration::from_millis(400)).await;
        h.coordinator.shutdown().await;
        assert_eq!(h.coordinator.state().stage, SearchStage::Idle);
        assert!(h.telemetry.events().last().unwrap().is_terminal());
    }

    #[test]
    fn test_retry_without_history() {
        let h = harness(InMemoryStore::new(Vec::new()), EngineConfig::default());
        assert!(!h.coordinator.retry());
    }
}
