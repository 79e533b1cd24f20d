//! Geoseek - Geospatial Search Orchestration
//!
//! Geoseek finds records near a point on the map, behind a debounced and
//! deduplicated search session. Each search tries an indexed nearby query
//! first and falls back to a ladder of shrinking bounding-box queries when the
//! index is missing or too slow, while a quick reduced-radius search supplies
//! early partial results. Results are ranked by great-circle distance and kept
//! in a small time-limited cache.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use geoseek::{EngineConfig, SearchExecutor, SearchFilters, SearchRequest};
//! use geoseek::store::{GeoPoint, InMemoryStore, test_data};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> geoseek::Result<()> {
//! let store = Arc::new(InMemoryStore::new(test_data::london_records()));
//! let executor = SearchExecutor::new(store, &EngineConfig::default());
//!
//! let point = GeoPoint::new(51.5074, -0.1278)?;
//! let filters = SearchFilters::new().status("active");
//! let result = executor
//!     .execute(&SearchRequest::new(point, 2.0, filters), &CancellationToken::new())
//!     .await?;
//! for record in &result.records {
//!     println!("{} at {:.2} km", record.id(), record.distance_km());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Interactive callers use [`SearchCoordinator`] instead, which debounces
//! parameter changes and publishes a [`SearchState`] stream.
//!
//! # Features
//!
//! - **Tiered fallback**: timeouts shrink the search area instead of failing the search
//! - **Progressive results**: a quick half-radius search fills the gap while the main search runs
//! - **Typed errors**: backend failures are classified into a closed set of kinds with user-facing messages
//! - **Pluggable backend**: anything implementing [`store::RecordStore`] can be searched
use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod cache;
pub mod classify;
mod config;
mod coordinator;
pub mod error;
mod search;
pub mod telemetry;

pub use cache::{CacheKey, CacheStats, ResultCache};
pub use classify::{ErrorKind, SearchFailure};
pub use config::{
    CacheConfig, EngineConfig, EngineConfigBuilder, FallbackTier, ProgressiveConfig,
    SpatialConfig, default_fallback_tiers,
};
pub use coordinator::{SearchCoordinator, SearchCoordinatorBuilder, SearchStage, SearchState};
pub use error::{GeoseekError, Result, SearchError};
pub use geoseek_store as store;
pub use geoseek_store::{GeoPoint, SearchFilters};
pub use search::{
    DEFAULT_PAGE_SIZE, DEFAULT_RADIUS_KM, FallbackSearchClient, ProgressiveSearchClient,
    SearchExecutor, SearchMethod, SearchProgress, SearchRecord, SearchRequest, SearchResult,
    SearchTiming, SpatialOutcome, SpatialSearchClient, TierAttempt, effective_radius,
};
pub use telemetry::{
    MemoryTelemetry, TelemetryEvent, TelemetryKind, TelemetryLogger, TracingTelemetry,
};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the Geoseek library.
///
/// Installs a `tracing` fmt subscriber filtered by `RUST_LOG` when set, or by
/// `level` otherwise. Safe to call more than once; only the first call
/// installs anything.
///
/// # Examples
///
/// ```rust
/// use geoseek::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), geoseek::GeoseekError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static ()> {
    LOGGER_INIT.get_or_try_init(|| -> Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?;

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    })
}
