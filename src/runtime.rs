//! Process-wide wiring.
//!
//! [`CacheRuntime`] is built once at startup and passed to request handlers.
//! It owns the shared cache store, the validated registry and relationship
//! graph, and hands out per-request loader sets plus the memoized purger.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::cache::{CacheConfig, CacheStore, ListCache, MemoryCacheStore};
use crate::config::Settings;
use crate::domain::ConfigError;
use crate::loader::{RequestContext, RequestLoaderSet, SharedCache};
use crate::purge::CascadingCachePurger;
use crate::registry::{EntityRegistry, StandardStorage};
use crate::relations::RelationshipGraph;

pub struct CacheRuntime {
    shared: SharedCache,
    graph: Arc<RelationshipGraph>,
    purger: OnceCell<Arc<CascadingCachePurger>>,
}

impl CacheRuntime {
    pub fn new(
        registry: EntityRegistry,
        graph: RelationshipGraph,
        cache: Arc<dyn CacheStore>,
        config: CacheConfig,
    ) -> Self {
        Self {
            shared: SharedCache::new(Arc::new(registry), cache, config),
            graph: Arc::new(graph),
            purger: OnceCell::new(),
        }
    }

    /// Built-in catalogue and graph with settings overrides applied, backed
    /// by an in-memory store.
    pub fn from_settings(settings: &Settings, storage: StandardStorage) -> Result<Self, ConfigError> {
        let config = CacheConfig::from(&settings.cache);
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new(&config));
        Self::from_settings_with_store(settings, storage, cache)
    }

    /// Like [`from_settings`](Self::from_settings) with a caller-supplied store.
    pub fn from_settings_with_store(
        settings: &Settings,
        storage: StandardStorage,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Self, ConfigError> {
        let mut registry = EntityRegistry::standard(storage)?;
        registry.apply_overrides(&settings.entities)?;

        let mut graph = RelationshipGraph::standard(&registry)?;
        graph.extend_from_settings(&registry, &settings.relationships)?;

        Ok(Self::new(
            registry,
            graph,
            cache,
            CacheConfig::from(&settings.cache),
        ))
    }

    /// Loader set for one request. Discard it when the request ends.
    pub fn request(&self, context: RequestContext) -> RequestLoaderSet {
        RequestLoaderSet::new(self.shared.clone(), context)
    }

    /// The shared purger, constructed on first use.
    pub fn purger(&self) -> Arc<CascadingCachePurger> {
        let purger = self.purger.get_or_init(|| {
            Arc::new(CascadingCachePurger::new(
                Arc::clone(&self.shared.registry),
                Arc::clone(&self.graph),
                Arc::clone(&self.shared.cache),
                self.shared.keys.clone(),
                self.shared.config.cascade_depth,
            ))
        });
        Arc::clone(purger)
    }

    pub fn list_cache(&self) -> ListCache {
        ListCache::new(
            Arc::clone(&self.shared.registry),
            Arc::clone(&self.shared.cache),
            self.shared.keys.clone(),
            self.shared.config.clone(),
        )
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.shared.registry
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.shared.cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }
}
