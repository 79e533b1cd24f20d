//! The two query shapes the search engine issues against a backing store.

use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    filters::SearchFilters,
    geo::{BoundingBox, GeoPoint},
    record::Record,
};

/// Columns kept by [`Projection::Minimal`].
pub const MINIMAL_FIELDS: &[&str] = &["id", "coordinates", "address", "title", "status"];

pub type StoreFuture<'a> = BoxFuture<'a, Result<Vec<Record>>>;

/// Indexed nearby-point query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyQuery {
    pub center: GeoPoint,
    pub radius_km: f64,
    /// Zero-based page index.
    pub page: u32,
    pub page_size: u32,
    /// Deadline the caller will enforce; backends with statement timeouts may use it.
    pub timeout: Duration,
}

/// Which columns a table query should return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    #[default]
    All,
    /// Only [`MINIMAL_FIELDS`].
    Minimal,
}

impl Projection {
    pub fn apply(self, record: Record) -> Record {
        match self {
            Self::All => record,
            Self::Minimal => record.project(MINIMAL_FIELDS),
        }
    }
}

/// Attribute-filtered table query over a bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableQuery {
    pub bbox: BoundingBox,
    pub filters: SearchFilters,
    pub limit: usize,
    pub projection: Projection,
    pub timeout: Duration,
}

/// A store able to answer both query shapes.
///
/// `nearby` is an optional capability: a store without a spatial index reports
/// a "function does not exist" style [`StoreError`](crate::StoreError) and the
/// engine falls back to `query_table`. Results of `nearby` are ordered by
/// proximity; results of `query_table` are unordered.
pub trait RecordStore: Send + Sync {
    fn nearby(&self, query: NearbyQuery) -> StoreFuture<'_>;

    fn query_table(&self, query: TableQuery) -> StoreFuture<'_>;
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn nearby(&self, query: NearbyQuery) -> StoreFuture<'_> {
        (**self).nearby(query)
    }

    fn query_table(&self, query: TableQuery) -> StoreFuture<'_> {
        (**self).query_table(query)
    }
}
