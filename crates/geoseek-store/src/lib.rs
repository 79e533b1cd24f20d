//! Record store boundary for geoseek.
//!
//! This crate defines everything the search engine needs to know about the
//! backing store: coordinates and geodesic helpers, the closed filter type,
//! raw records and errors, and the [`RecordStore`] trait with its two query
//! shapes. It also ships [`InMemoryStore`], a reference backend with fault
//! injection, and deterministic [`test_data`] fixtures.

mod error;
mod filters;
pub mod geo;
mod memory;
mod record;
mod store;
pub mod test_data;

pub use error::{GeoError, Result, StoreError};
pub use filters::SearchFilters;
pub use geo::{BoundingBox, GeoPoint, bounding_box, haversine_km};
pub use memory::{InMemoryStore, InMemoryStoreBuilder, Injected, NEARBY_FUNCTION, StoreCalls};
pub use record::Record;
pub use store::{MINIMAL_FIELDS, NearbyQuery, Projection, RecordStore, StoreFuture, TableQuery};
