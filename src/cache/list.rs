//! Cached list results.
//!
//! List resolvers live outside this crate, but their cached results must be
//! addressable by the purger. Both sides derive the key the same way:
//! `build_key(list_identity, [context fields.., sorted name=value filters])`.

use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{ConfigError, EntityType, KeyValues};
use crate::registry::EntityRegistry;

use super::config::CacheConfig;
use super::keys::CacheKeyBuilder;
use super::store::CacheStore;

const METRIC_CACHE_ERROR: &str = "loadcache_cache_error_total";

pub struct ListCache {
    registry: Arc<EntityRegistry>,
    cache: Arc<dyn CacheStore>,
    keys: CacheKeyBuilder,
    config: CacheConfig,
}

impl ListCache {
    pub fn new(
        registry: Arc<EntityRegistry>,
        cache: Arc<dyn CacheStore>,
        keys: CacheKeyBuilder,
        config: CacheConfig,
    ) -> Self {
        Self {
            registry,
            cache,
            keys,
            config,
        }
    }

    pub fn key(
        &self,
        entity: EntityType,
        context: &KeyValues,
        filter: &KeyValues,
    ) -> Result<String, ConfigError> {
        let descriptor = self.registry.descriptor(entity)?;
        let args = descriptor.list_args(context, filter)?;
        Ok(self.keys.build_key(descriptor.list_identity(), &args))
    }

    /// Cached list for `filter`; cache failures read as a miss.
    pub async fn get(
        &self,
        entity: EntityType,
        context: &KeyValues,
        filter: &KeyValues,
    ) -> Result<Option<Value>, ConfigError> {
        let descriptor = self.registry.descriptor(entity)?;
        if self.config.ttl_for(descriptor).is_none() {
            return Ok(None);
        }
        let key = self.key(entity, context, filter)?;
        match self.cache.get(&key).await {
            Ok(value) => Ok(value),
            Err(err) => {
                counter!(METRIC_CACHE_ERROR, "entity_type" => entity.as_str()).increment(1);
                warn!(entity_type = %entity, cache_key = %key, error = %err, "list cache read failed");
                Ok(None)
            }
        }
    }

    /// Store a list result; write failures are logged and dropped.
    pub async fn set(
        &self,
        entity: EntityType,
        context: &KeyValues,
        filter: &KeyValues,
        value: Value,
    ) -> Result<(), ConfigError> {
        let descriptor = self.registry.descriptor(entity)?;
        let Some(ttl) = self.config.ttl_for(descriptor) else {
            debug!(entity_type = %entity, "caching disabled, list not stored");
            return Ok(());
        };
        let key = self.key(entity, context, filter)?;
        if let Err(err) = self.cache.set(&key, value, ttl).await {
            counter!(METRIC_CACHE_ERROR, "entity_type" => entity.as_str()).increment(1);
            warn!(entity_type = %entity, cache_key = %key, error = %err, "list cache write failed");
        }
        Ok(())
    }
}
