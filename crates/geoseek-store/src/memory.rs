//! In-memory [`RecordStore`] used by tests, demos and local development.
//!
//! Besides answering queries from a fixed record set, the store can simulate
//! latency, a missing spatial index, and scripted per-call faults, and it keeps
//! a log of every query it received.

use std::{collections::VecDeque, time::Duration};

use futures::FutureExt;
use itertools::Itertools;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    error::StoreError,
    geo::haversine_km,
    record::Record,
    store::{NearbyQuery, RecordStore, StoreFuture, TableQuery},
};

/// Name reported in the "function does not exist" error.
pub const NEARBY_FUNCTION: &str = "nearby_records";

/// Scripted outcome for a single store call.
#[derive(Debug, Clone)]
pub enum Injected {
    /// Fail with the given error.
    Fail(StoreError),
    /// Never resolve. The caller's deadline decides what happens.
    Hang,
    /// Resolve with no rows.
    Empty,
    /// Answer normally from the stored records.
    Pass,
}

/// Number of calls received per query shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub nearby: usize,
    pub table: usize,
}

impl StoreCalls {
    pub fn total(&self) -> usize {
        self.nearby + self.table
    }
}

#[derive(Debug, Default)]
struct StoreLog {
    nearby_script: VecDeque<Injected>,
    table_script: VecDeque<Injected>,
    nearby_queries: Vec<NearbyQuery>,
    table_queries: Vec<TableQuery>,
}

#[derive(Debug)]
pub struct InMemoryStore {
    records: Vec<Record>,
    nearby_available: bool,
    latency: Duration,
    log: Mutex<StoreLog>,
}

impl InMemoryStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self::builder().records(records).build()
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Queue an outcome for the next unscripted nearby call.
    pub fn push_nearby(&self, outcome: Injected) {
        self.log.lock().nearby_script.push_back(outcome);
    }

    /// Queue an outcome for the next unscripted table call.
    pub fn push_table(&self, outcome: Injected) {
        self.log.lock().table_script.push_back(outcome);
    }

    pub fn calls(&self) -> StoreCalls {
        let log = self.log.lock();
        StoreCalls {
            nearby: log.nearby_queries.len(),
            table: log.table_queries.len(),
        }
    }

    pub fn nearby_queries(&self) -> Vec<NearbyQuery> {
        self.log.lock().nearby_queries.clone()
    }

    pub fn table_queries(&self) -> Vec<TableQuery> {
        self.log.lock().table_queries.clone()
    }

    /// Forget recorded queries. Scripted outcomes are kept.
    pub fn clear_log(&self) {
        let mut log = self.log.lock();
        log.nearby_queries.clear();
        log.table_queries.clear();
    }

    fn serve_nearby(&self, query: &NearbyQuery) -> Vec<Record> {
        let page_size = query.page_size as usize;
        self.records
            .iter()
            .map(|r| (haversine_km(&query.center, &r.location), r))
            .filter(|(d, _)| *d <= query.radius_km)
            .sorted_by(|a, b| a.0.total_cmp(&b.0))
            .skip(query.page as usize * page_size)
            .take(page_size)
            .map(|(_, r)| r.clone())
            .collect()
    }

    fn serve_table(&self, query: &TableQuery) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| query.bbox.contains(&r.location) && query.filters.matches_exact(r))
            .take(query.limit)
            .map(|r| query.projection.apply(r.clone()))
            .collect()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn resolve(
        &self,
        injected: Option<Injected>,
        serve: impl FnOnce() -> Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        match injected.unwrap_or(Injected::Pass) {
            Injected::Fail(err) => Err(err),
            Injected::Hang => futures::future::pending().await,
            Injected::Empty => Ok(Vec::new()),
            Injected::Pass => {
                self.simulate_latency().await;
                Ok(serve())
            }
        }
    }
}

impl RecordStore for InMemoryStore {
    fn nearby(&self, query: NearbyQuery) -> StoreFuture<'_> {
        let injected = {
            let mut log = self.log.lock();
            log.nearby_queries.push(query.clone());
            log.nearby_script.pop_front()
        };
        async move {
            if !self.nearby_available {
                debug!("Nearby capability disabled, reporting missing function");
                return Err(StoreError::missing_function(NEARBY_FUNCTION));
            }
            let rows = self.resolve(injected, || self.serve_nearby(&query)).await?;
            trace!(rows = rows.len(), radius_km = query.radius_km, "Nearby query served");
            Ok(rows)
        }
        .boxed()
    }

    fn query_table(&self, query: TableQuery) -> StoreFuture<'_> {
        let injected = {
            let mut log = self.log.lock();
            log.table_queries.push(query.clone());
            log.table_script.pop_front()
        };
        async move {
            let rows = self.resolve(injected, || self.serve_table(&query)).await?;
            trace!(rows = rows.len(), limit = query.limit, "Table query served");
            Ok(rows)
        }
        .boxed()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    records: Vec<Record>,
    nearby_unavailable: bool,
    latency: Duration,
    nearby_script: Vec<Injected>,
    table_script: Vec<Injected>,
}

impl InMemoryStoreBuilder {
    pub fn records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    /// Behave like a backend without the indexed nearby function.
    pub fn nearby_unavailable(mut self) -> Self {
        self.nearby_unavailable = true;
        self
    }

    /// Delay every successful answer by `latency`.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn script_nearby(mut self, outcomes: impl IntoIterator<Item = Injected>) -> Self {
        self.nearby_script.extend(outcomes);
        self
    }

    pub fn script_table(mut self, outcomes: impl IntoIterator<Item = Injected>) -> Self {
        self.table_script.extend(outcomes);
        self
    }

    pub fn build(self) -> InMemoryStore {
        InMemoryStore {
            records: self.records,
            nearby_available: !self.nearby_unavailable,
            latency: self.latency,
            log: Mutex::new(StoreLog {
                nearby_script: self.nearby_script.into(),
                table_script: self.table_script.into(),
                ..Default::default()
            }),
        }
    }
}
