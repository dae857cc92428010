//! Cache configuration.
//!
//! Controls the shared read-through cache and the purge cascade via the
//! `[cache]` table of `loadcache.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::registry::EntityDescriptor;

// Default values for cache configuration
pub(crate) const DEFAULT_NAMESPACE: &str = "loadcache";
pub(crate) const DEFAULT_TTL_SECONDS: u64 = 300;
pub(crate) const DEFAULT_CAPACITY: usize = 10_000;
pub(crate) const DEFAULT_CASCADE_DEPTH: u32 = 3;
/// Longest TTL accepted from settings (365 days).
pub(crate) const MAX_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Cache configuration from `loadcache.toml`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Global switch; when off every lookup misses and nothing is written.
    pub enabled: bool,
    /// Prefix of every cache key, separating deployments that share a cache server.
    pub namespace: String,
    /// TTL applied to entities without their own override.
    pub default_ttl_seconds: u64,
    /// Maximum entries held by the in-memory store.
    pub capacity: usize,
    /// Relationship hops a purge follows unless the caller overrides it.
    pub cascade_depth: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            capacity: DEFAULT_CAPACITY,
            cascade_depth: DEFAULT_CASCADE_DEPTH,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            namespace: settings.namespace.clone(),
            default_ttl_seconds: settings.default_ttl.as_secs(),
            capacity: settings.capacity.get(),
            cascade_depth: settings.cascade_depth,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// TTL for entries of `descriptor`, or `None` when caching is off for it.
    pub fn ttl_for(&self, descriptor: &EntityDescriptor) -> Option<Duration> {
        if !self.enabled || !descriptor.caching_enabled() {
            return None;
        }
        Some(descriptor.ttl_override().unwrap_or_else(|| self.default_ttl()))
    }
}
