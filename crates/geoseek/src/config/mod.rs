//! Engine configuration and its builder.

use std::time::Duration;

use geoseek_store::Projection;

use crate::{error::GeoseekError, search::DEFAULT_PAGE_SIZE};

/// One rung of the fallback ladder.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackTier {
    /// Fraction of the requested radius searched by this tier
    pub radius_factor: f64,
    /// Smallest radius this tier will search, before capping at the requested radius
    pub min_radius_km: f64,
    /// Maximum number of rows requested
    pub limit: usize,
    /// Per-call deadline
    pub timeout: Duration,
    /// Columns requested from the store
    pub projection: Projection,
}

impl FallbackTier {
    /// Radius searched for a requested radius. Never exceeds the request.
    pub fn radius_for(&self, requested_km: f64) -> f64 {
        (requested_km * self.radius_factor)
            .max(self.min_radius_km)
            .min(requested_km)
    }

    /// Full-area tier with every column projected.
    pub fn full(limit: usize, timeout: Duration) -> Self {
        Self {
            radius_factor: 1.0,
            min_radius_km: 0.0,
            limit,
            timeout,
            projection: Projection::All,
        }
    }
}

/// The default three-tier ladder: full area, 30% area, 15% area with minimal columns.
pub fn default_fallback_tiers() -> Vec<FallbackTier> {
    vec![
        FallbackTier::full(100, Duration::from_secs(20)),
        FallbackTier {
            radius_factor: 0.3,
            min_radius_km: 0.5,
            limit: 50,
            timeout: Duration::from_secs(15),
            projection: Projection::All,
        },
        FallbackTier {
            radius_factor: 0.15,
            min_radius_km: 0.25,
            limit: 20,
            timeout: Duration::from_secs(10),
            projection: Projection::Minimal,
        },
    ]
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialConfig {
    /// Radius above which a search counts as a large area
    pub large_area_radius_km: f64,
    /// Deadline for ordinary searches
    pub timeout: Duration,
    /// Deadline for large-area searches, which give up early and keep partial rows
    pub large_area_timeout: Duration,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            large_area_radius_km: 3.0,
            timeout: Duration::from_secs(15),
            large_area_timeout: Duration::from_secs(8),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressiveConfig {
    pub enabled: bool,
    /// Fraction of the requested radius covered by the quick search
    pub radius_factor: f64,
    pub limit: usize,
    pub timeout: Duration,
}

impl Default for ProgressiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius_factor: 0.5,
            limit: 50,
            timeout: Duration::from_secs(8),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 20,
            ttl: Duration::from_secs(10 * 60),
        }
    }
}

/// Configuration for the whole engine.
///
/// Use [`EngineConfigBuilder`] for presets and validated overrides.
///
/// # Examples
///
/// ```rust
/// use geoseek::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::builder()
///     .debounce(Duration::from_millis(150))
///     .cache_capacity(50)
///     .build();
/// assert_eq!(config.cache.capacity, 50);
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Page size used by coordinated searches
    pub page_size: u32,
    pub spatial: SpatialConfig,
    /// Fallback ladder, tried in order while tiers time out
    pub fallback_tiers: Vec<FallbackTier>,
    pub progressive: ProgressiveConfig,
    pub cache: CacheConfig,
    /// Quiet period before a parameter change starts a search
    pub debounce: Duration,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            spatial: SpatialConfig::default(),
            fallback_tiers: default_fallback_tiers(),
            progressive: ProgressiveConfig::default(),
            cache: CacheConfig::default(),
            debounce: Duration::from_millis(300),
        }
    }
}

/// Builder for creating engine configurations with ergonomic defaults
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new builder with the standard defaults
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Shorter deadlines everywhere, for interactive use on fast backends
    pub fn fast() -> Self {
        let mut builder = Self::new();
        builder.config.spatial.timeout = Duration::from_secs(5);
        builder.config.spatial.large_area_timeout = Duration::from_secs(3);
        for (tier, secs) in builder.config.fallback_tiers.iter_mut().zip([8, 5, 4]) {
            tier.timeout = Duration::from_secs(secs);
        }
        builder.config.progressive.timeout = Duration::from_secs(3);
        builder.config.debounce = Duration::from_millis(150);
        builder
    }

    /// Longer deadlines and larger first tier, for batch-style callers
    pub fn thorough() -> Self {
        let mut builder = Self::new();
        builder.config.spatial.timeout = Duration::from_secs(30);
        builder.config.spatial.large_area_timeout = Duration::from_secs(20);
        for (tier, secs) in builder.config.fallback_tiers.iter_mut().zip([40, 30, 20]) {
            tier.timeout = Duration::from_secs(secs);
        }
        if let Some(first) = builder.config.fallback_tiers.first_mut() {
            first.limit = 200;
        }
        builder.config.progressive.enabled = false;
        builder
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.config.page_size = page_size.max(1);
        self
    }

    /// Radius above which the spatial tier uses its large-area deadline
    pub fn large_area_threshold_km(mut self, radius_km: f64) -> Self {
        self.config.spatial.large_area_radius_km = radius_km.max(0.0);
        self
    }

    pub fn spatial_timeouts(mut self, standard: Duration, large_area: Duration) -> Self {
        self.config.spatial.timeout = standard;
        self.config.spatial.large_area_timeout = large_area;
        self
    }

    /// Replace the fallback ladder. Every tier needs a factor in (0, 1] and a
    /// non-zero limit, and the ladder cannot be empty.
    pub fn fallback_tiers(mut self, tiers: Vec<FallbackTier>) -> Result<Self, GeoseekError> {
        if tiers.is_empty() {
            return Err(GeoseekError::ConfigError(
                "At least one fallback tier is required".to_string(),
            ));
        }
        for (i, tier) in tiers.iter().enumerate() {
            if !(tier.radius_factor > 0.0 && tier.radius_factor <= 1.0) {
                return Err(GeoseekError::ConfigError(format!(
                    "Fallback tier {} radius factor must be in (0, 1], got {}",
                    i + 1,
                    tier.radius_factor
                )));
            }
            if tier.limit == 0 {
                return Err(GeoseekError::ConfigError(format!(
                    "Fallback tier {} limit must be positive",
                    i + 1
                )));
            }
        }
        self.config.fallback_tiers = tiers;
        Ok(self)
    }

    /// Enable or disable the concurrent quick search
    pub fn progressive(mut self, enabled: bool) -> Self {
        self.config.progressive.enabled = enabled;
        self
    }

    /// Fraction of the requested radius covered by the quick search
    pub fn progressive_radius_factor(mut self, factor: f64) -> Result<Self, GeoseekError> {
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(GeoseekError::ConfigError(format!(
                "Progressive radius factor must be in (0, 1], got {factor}"
            )));
        }
        self.config.progressive.radius_factor = factor;
        Ok(self)
    }

    pub fn progressive_timeout(mut self, timeout: Duration) -> Self {
        self.config.progressive.timeout = timeout;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache.capacity = capacity;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.ttl = ttl;
        self
    }

    /// Turn the result cache off. Results are unchanged, only slower.
    pub fn disable_cache(mut self) -> Self {
        self.config.cache.enabled = false;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config.debounce = debounce;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
