//! Search tiers and the executor that chooses between them.
//!
//! The spatial tier issues one indexed nearby query. The fallback tier issues
//! bounding-box table queries, shrinking the area each time a tier times out.
//! The progressive tier is a reduced-radius fallback used for early partial
//! results. [`SearchExecutor`] wires them together with the result cache.

use std::{fmt, time::Duration};

use geoseek_store::{GeoPoint, Record, SearchFilters, haversine_km};
use serde_json::Value;

use crate::classify::SearchFailure;

mod deadline;
mod executor;
mod fallback;
mod progressive;
mod spatial;

pub use executor::{SearchExecutor, SearchProgress};
pub use fallback::{FallbackSearchClient, TierAttempt};
pub use progressive::ProgressiveSearchClient;
pub use spatial::{SpatialOutcome, SpatialSearchClient};

/// Radius used when the caller supplies a non-positive or non-finite radius.
pub const DEFAULT_RADIUS_KM: f64 = 5.0;

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// The radius actually searched for a caller-supplied value.
pub fn effective_radius(radius_km: f64) -> f64 {
    if radius_km.is_finite() && radius_km > 0.0 {
        radius_km
    } else {
        DEFAULT_RADIUS_KM
    }
}

/// Parameters of one search.
///
/// The radius is normalised on construction, so `radius_km()` is always
/// positive and finite. The point is validated when the search runs.
///
/// # Examples
///
/// ```rust
/// use geoseek::{SearchRequest, SearchFilters};
/// use geoseek::store::GeoPoint;
///
/// let point = GeoPoint::new(51.5074, -0.1278)?;
/// let request = SearchRequest::new(point, 0.0, SearchFilters::default());
/// assert_eq!(request.radius_km(), 5.0);
/// # Ok::<(), geoseek::store::GeoError>(())
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    point: GeoPoint,
    radius_km: f64,
    filters: SearchFilters,
    page: u32,
    page_size: u32,
}

impl SearchRequest {
    pub fn new(point: GeoPoint, radius_km: f64, filters: SearchFilters) -> Self {
        Self {
            point,
            radius_km: effective_radius(radius_km),
            filters: filters.normalized(),
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Select a zero-based page. A zero page size is raised to one.
    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size.max(1);
        self
    }

    pub fn point(&self) -> &GeoPoint {
        &self.point
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    pub fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Reject coordinates outside the valid WGS84 range.
    pub fn validate(&self) -> Result<(), SearchFailure> {
        self.point.validate().map_err(SearchFailure::from)
    }
}

/// A store record annotated with its distance from the search point.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRecord {
    record: Record,
    distance_km: f64,
}

impl SearchRecord {
    pub fn new(record: Record, origin: &GeoPoint) -> Self {
        let distance_km = haversine_km(origin, &record.location);
        Self {
            record,
            distance_km,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn coordinates(&self) -> &GeoPoint {
        &self.record.location
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.record.field(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.record.field_str(name)
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}

/// Annotate `records` with distances from `origin` and sort nearest first.
pub(crate) fn rank_by_distance(
    records: impl IntoIterator<Item = Record>,
    origin: &GeoPoint,
) -> Vec<SearchRecord> {
    let mut ranked: Vec<SearchRecord> = records
        .into_iter()
        .map(|r| SearchRecord::new(r, origin))
        .collect();
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked
}

/// Which path produced a set of results.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SearchMethod {
    Spatial,
    Fallback,
    Cache,
    Progressive,
    #[default]
    None,
    Error,
}

impl SearchMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spatial => "spatial",
            Self::Fallback => "fallback",
            Self::Cache => "cache",
            Self::Progressive => "progressive",
            Self::None => "none",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock time spent per tier.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchTiming {
    pub total: Duration,
    pub spatial: Option<Duration>,
    pub fallback: Option<Duration>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub records: Vec<SearchRecord>,
    pub method: SearchMethod,
    pub timing: SearchTiming,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
