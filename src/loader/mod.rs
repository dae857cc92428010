//! Request-scoped batched loading.
//!
//! A [`RequestLoaderSet`] is created per external request and hands out one
//! [`BatchLoader`] per entity type. Loaders deduplicate keys, serve what they
//! can from the shared cache and fetch the rest with a single storage
//! multi-get per flush.

mod batch;
mod context;
mod set;

use std::sync::Arc;

use crate::cache::{CacheConfig, CacheKeyBuilder, CacheStore};
use crate::registry::EntityRegistry;

pub use batch::{BatchLoader, PendingLoad};
pub use context::RequestContext;
pub use set::{AttributeLoader, RequestLoaderSet};

/// Process-wide collaborators every loader reads through.
#[derive(Clone)]
pub struct SharedCache {
    pub registry: Arc<EntityRegistry>,
    pub cache: Arc<dyn CacheStore>,
    pub keys: CacheKeyBuilder,
    pub config: CacheConfig,
}

impl SharedCache {
    pub fn new(
        registry: Arc<EntityRegistry>,
        cache: Arc<dyn CacheStore>,
        config: CacheConfig,
    ) -> Self {
        Self {
            keys: CacheKeyBuilder::new(config.namespace.clone()),
            registry,
            cache,
            config,
        }
    }
}
