//! Cascading cache invalidation.
//!
//! After a write, the purger deletes the written entity's own cache entries
//! and walks the [`RelationshipGraph`] to delete the entries of dependent
//! entity types, up to a bounded number of hops. Each visited node loses its
//! point entry (for partitioned entities, the partition generation, which
//! retires every point entry of the partition) and, for dependents, the list
//! filtered by the derived keys. The walk is breadth-first
//! and never revisits the same `(entity type, keys)` pair, but termination
//! on cyclic graphs comes from the depth bound alone.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheKeyBuilder, CacheStore};
use crate::domain::{ConfigError, EntityType, KeyValues};
use crate::registry::{EntityDescriptor, EntityRegistry};
use crate::relations::RelationshipGraph;

const METRIC_PURGE_KEYS: &str = "loadcache_purge_keys_total";
const METRIC_PURGE_MS: &str = "loadcache_purge_ms";
const METRIC_CACHE_ERROR: &str = "loadcache_cache_error_total";

/// One `(entity type, keys)` pair reached by a purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeVisit {
    pub entity_type: EntityType,
    pub keys: KeyValues,
    /// Relationship hops from the written entity.
    pub hops: u32,
}

/// What a purge touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    /// Every cache key a delete was issued for, in issue order.
    pub touched: Vec<String>,
    /// Deletes that removed a live entry.
    pub deleted: usize,
    /// Deletes the cache backend rejected.
    pub failed: usize,
    pub visited: Vec<PurgeVisit>,
}

impl PurgeSummary {
    pub fn touched(&self, cache_key: &str) -> bool {
        self.touched.iter().any(|key| key == cache_key)
    }

    pub fn visited(&self, entity: EntityType) -> bool {
        self.visited.iter().any(|visit| visit.entity_type == entity)
    }

    pub fn max_hops(&self) -> u32 {
        self.visited.iter().map(|visit| visit.hops).max().unwrap_or(0)
    }
}

/// Shared, stateless purger; safe to call concurrently.
pub struct CascadingCachePurger {
    registry: Arc<EntityRegistry>,
    graph: Arc<RelationshipGraph>,
    cache: Arc<dyn CacheStore>,
    keys: CacheKeyBuilder,
    default_depth: u32,
}

impl CascadingCachePurger {
    pub fn new(
        registry: Arc<EntityRegistry>,
        graph: Arc<RelationshipGraph>,
        cache: Arc<dyn CacheStore>,
        keys: CacheKeyBuilder,
        default_depth: u32,
    ) -> Self {
        Self {
            registry,
            graph,
            cache,
            keys,
            default_depth,
        }
    }

    pub fn default_depth(&self) -> u32 {
        self.default_depth
    }

    /// Purge with the configured cascade depth.
    pub async fn purge(
        &self,
        entity: EntityType,
        context: &KeyValues,
        keys: &KeyValues,
    ) -> Result<PurgeSummary, ConfigError> {
        self.purge_with_depth(entity, context, keys, self.default_depth)
            .await
    }

    /// Delete `entity`'s entries for `keys` and cascade up to `depth` hops.
    ///
    /// The written entity's point key must resolve from `context ∪ keys`;
    /// dependents whose point key cannot be derived lose their list entry
    /// only. The written entity's own list entry is not
    /// touched: list resolvers filter by a dependency key, never by the full
    /// key set of a write. Cache failures are counted, never returned.
    #[instrument(skip_all, fields(entity_type = %entity, keys = %keys, depth = depth))]
    pub async fn purge_with_depth(
        &self,
        entity: EntityType,
        context: &KeyValues,
        keys: &KeyValues,
        depth: u32,
    ) -> Result<PurgeSummary, ConfigError> {
        let started_at = Instant::now();
        let mut summary = PurgeSummary::default();

        // Fail closed before deleting anything.
        let root = self.registry.descriptor(entity)?;
        root.named_args(context, keys)?;
        root.named_partition_args(context, keys)?;

        let mut seen: HashSet<(EntityType, KeyValues)> = HashSet::new();
        let mut queue: VecDeque<PurgeVisit> = VecDeque::new();
        seen.insert((entity, keys.clone()));
        queue.push_back(PurgeVisit {
            entity_type: entity,
            keys: keys.clone(),
            hops: 0,
        });

        while let Some(visit) = queue.pop_front() {
            let descriptor = self.registry.descriptor(visit.entity_type)?;
            for cache_key in self.cache_keys(descriptor, context, &visit) {
                self.delete(&cache_key, &mut summary).await;
                summary.touched.push(cache_key);
            }

            if visit.hops < depth {
                for edge in self.graph.edges(visit.entity_type) {
                    let Some(child_keys) = edge.child_keys(&visit.keys) else {
                        debug!(
                            parent = %visit.entity_type,
                            child = %edge.child,
                            source_field = edge.source_field(),
                            "parent keys lack the dependency source, edge skipped"
                        );
                        continue;
                    };
                    if seen.insert((edge.child, child_keys.clone())) {
                        queue.push_back(PurgeVisit {
                            entity_type: edge.child,
                            keys: child_keys,
                            hops: visit.hops + 1,
                        });
                    }
                }
            }
            summary.visited.push(visit);
        }

        counter!(METRIC_PURGE_KEYS, "entity_type" => entity.as_str())
            .increment(summary.deleted as u64);
        histogram!(METRIC_PURGE_MS, "entity_type" => entity.as_str())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        info!(
            depth,
            visited = summary.visited.len(),
            touched = summary.touched.len(),
            deleted = summary.deleted,
            failed = summary.failed,
            max_hops = summary.max_hops(),
            "Cache purge complete"
        );
        Ok(summary)
    }

    /// Point key or partition generation, plus the list key past the root,
    /// for one visit.
    fn cache_keys(
        &self,
        descriptor: &EntityDescriptor,
        context: &KeyValues,
        visit: &PurgeVisit,
    ) -> Vec<String> {
        let mut cache_keys = Vec::with_capacity(2);
        if descriptor.partition_field().is_some() {
            // Partitioned point entries are keyed by generation.
            match descriptor.named_partition_args(context, &visit.keys) {
                Ok(Some(args)) => cache_keys.push(
                    self.keys
                        .build_key(&descriptor.generation_identity(), &args),
                ),
                Ok(None) => debug!(
                    entity_type = %visit.entity_type,
                    keys = %visit.keys,
                    "partition value not derivable, purging list entry only"
                ),
                Err(err) => debug!(
                    entity_type = %visit.entity_type,
                    reason = %err,
                    "partition generation not derivable"
                ),
            }
        } else {
            match descriptor.named_args(context, &visit.keys) {
                Ok(args) => cache_keys.push(
                    self.keys
                        .build_key(descriptor.function_identity(), &args),
                ),
                Err(err) => debug!(
                    entity_type = %visit.entity_type,
                    keys = %visit.keys,
                    reason = %err,
                    "point key not derivable, purging list entry only"
                ),
            }
        }
        if visit.hops == 0 {
            return cache_keys;
        }
        match descriptor.list_args(context, &visit.keys) {
            Ok(args) => cache_keys.push(self.keys.build_key(descriptor.list_identity(), &args)),
            Err(err) => debug!(
                entity_type = %visit.entity_type,
                reason = %err,
                "list key not derivable"
            ),
        }
        cache_keys
    }

    async fn delete(&self, cache_key: &str, summary: &mut PurgeSummary) {
        match self.cache.delete(cache_key).await {
            Ok(true) => summary.deleted += 1,
            Ok(false) => {}
            Err(err) => {
                summary.failed += 1;
                counter!(METRIC_CACHE_ERROR, "entity_type" => "purge").increment(1);
                warn!(cache_key, error = %err, "cache delete failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::cache::{CacheConfig, MemoryCacheStore};
    use crate::domain::EntityKey;
    use crate::registry::StandardStorage;
    use crate::storage::{EntityStorage, Item, StorageError};

    const MINUTE: Duration = Duration::from_secs(60);

    struct NoStorage;

    #[async_trait]
    impl EntityStorage for NoStorage {
        async fn get(&self, _key: &EntityKey) -> Result<Option<Item>, StorageError> {
            Ok(None)
        }

        async fn batch_get(&self, _keys: &[EntityKey]) -> Result<Vec<Item>, StorageError> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        registry: Arc<EntityRegistry>,
        store: Arc<MemoryCacheStore>,
        keys: CacheKeyBuilder,
        purger: CascadingCachePurger,
    }

    fn fixture() -> Fixture {
        let storage: Arc<dyn EntityStorage> = Arc::new(NoStorage);
        let registry = Arc::new(
            EntityRegistry::standard(StandardStorage {
                corporation_profiles: Arc::clone(&storage),
                places: Arc::clone(&storage),
                contact_profiles: Arc::clone(&storage),
                corporation_attributes: Arc::clone(&storage),
                contact_attributes: storage,
            })
            .expect("registry"),
        );
        let graph = Arc::new(RelationshipGraph::standard(&registry).expect("graph"));
        let store = Arc::new(MemoryCacheStore::new(&CacheConfig::default()));
        let keys = CacheKeyBuilder::new("test");
        let purger = CascadingCachePurger::new(
            Arc::clone(&registry),
            graph,
            Arc::clone(&store) as Arc<dyn CacheStore>,
            keys.clone(),
            3,
        );
        Fixture {
            registry,
            store,
            keys,
            purger,
        }
    }

    fn tenant() -> KeyValues {
        KeyValues::new().with("endpoint_id", "tenantA")
    }

    impl Fixture {
        fn list_key(&self, entity: EntityType, filter: &KeyValues) -> String {
            let descriptor = self.registry.descriptor(entity).expect("descriptor");
            let args = descriptor.list_args(&tenant(), filter).expect("list args");
            self.keys.build_key(descriptor.list_identity(), &args)
        }

        fn point_key(&self, entity: EntityType, key: &EntityKey) -> String {
            let descriptor = self.registry.descriptor(entity).expect("descriptor");
            let args = descriptor.point_args(&tenant(), key).expect("point args");
            self.keys.build_key(descriptor.function_identity(), &args)
        }
    }

    #[tokio::test]
    async fn purge_deletes_own_point_entry() {
        let fx = fixture();
        let point = fx.point_key(EntityType::Place, &EntityKey::new(["p1"]));
        fx.store.set(&point, json!({"place_uuid": "p1"}), MINUTE).await.unwrap();

        let summary = fx
            .purger
            .purge_with_depth(
                EntityType::Place,
                &tenant(),
                &KeyValues::new().with("place_uuid", "p1"),
                0,
            )
            .await
            .expect("purge");

        assert!(!fx.store.contains_key(&point));
        assert_eq!(summary.deleted, 1);
        assert!(summary.touched(&point));
        assert_eq!(summary.visited.len(), 1);
    }

    #[tokio::test]
    async fn cascade_removes_only_matching_child_lists() {
        let fx = fixture();
        let p1 = fx.list_key(
            EntityType::ContactProfile,
            &KeyValues::new().with("place_uuid", "p1"),
        );
        let p2 = fx.list_key(
            EntityType::ContactProfile,
            &KeyValues::new().with("place_uuid", "p2"),
        );
        fx.store.set(&p1, json!(["c1"]), MINUTE).await.unwrap();
        fx.store.set(&p2, json!(["c2"]), MINUTE).await.unwrap();

        fx.purger
            .purge(
                EntityType::Place,
                &tenant(),
                &KeyValues::new().with("place_uuid", "p1"),
            )
            .await
            .expect("purge");

        assert!(!fx.store.contains_key(&p1));
        assert!(fx.store.contains_key(&p2));
    }

    #[tokio::test]
    async fn foreign_field_edge_reaches_parent_profile() {
        let fx = fixture();
        let profile = fx.point_key(
            EntityType::CorporationProfile,
            &EntityKey::new(["tenantA", "c1"]),
        );
        fx.store.set(&profile, json!({"corporation_uuid": "c1"}), MINUTE).await.unwrap();

        let summary = fx
            .purger
            .purge_with_depth(
                EntityType::CorporationAttributes,
                &tenant(),
                &KeyValues::new()
                    .with("corporation_type", "supplier")
                    .with("owner_uuid", "c1"),
                1,
            )
            .await
            .expect("purge");

        assert!(!fx.store.contains_key(&profile));
        assert!(summary.visited(EntityType::CorporationProfile));
    }

    #[tokio::test]
    async fn cycles_stop_at_the_depth_bound() {
        let fx = fixture();
        for depth in 0..6 {
            let summary = fx
                .purger
                .purge_with_depth(
                    EntityType::CorporationProfile,
                    &tenant(),
                    &KeyValues::new()
                        .with("endpoint_id", "tenantA")
                        .with("corporation_uuid", "c1"),
                    depth,
                )
                .await
                .expect("purge");
            assert!(summary.max_hops() <= depth);
        }
    }

    #[tokio::test]
    async fn unresolvable_root_fails_closed() {
        let fx = fixture();
        let err = fx
            .purger
            .purge(
                EntityType::Place,
                &KeyValues::new(),
                &KeyValues::new().with("place_uuid", "p1"),
            )
            .await
            .expect_err("endpoint_id missing");
        assert!(matches!(err, ConfigError::UnresolvedKeyField { .. }));
    }

    #[tokio::test]
    async fn root_list_entry_is_left_alone() {
        let fx = fixture();
        let filter = KeyValues::new().with("place_uuid", "p1");
        let own_list = fx.list_key(EntityType::Place, &filter);
        fx.store.set(&own_list, json!(["p1"]), MINUTE).await.unwrap();

        let summary = fx
            .purger
            .purge(EntityType::Place, &tenant(), &filter)
            .await
            .expect("purge");

        assert!(!summary.touched(&own_list));
        assert!(fx.store.contains_key(&own_list));
    }

    #[tokio::test]
    async fn owner_purge_retires_the_bag_generation() {
        let fx = fixture();
        let descriptor = fx
            .registry
            .descriptor(EntityType::CorporationAttributes)
            .expect("descriptor");
        let args = descriptor
            .partition_args(&tenant(), &EntityKey::new(["supplier", "c1"]))
            .expect("partition args")
            .expect("partitioned");
        let generation = fx.keys.build_key(&descriptor.generation_identity(), &args);
        fx.store.set(&generation, json!("g1"), MINUTE).await.unwrap();

        let summary = fx
            .purger
            .purge(
                EntityType::CorporationProfile,
                &tenant(),
                &KeyValues::new()
                    .with("endpoint_id", "tenantA")
                    .with("corporation_uuid", "c1"),
            )
            .await
            .expect("purge");

        assert!(summary.touched(&generation));
        assert!(!fx.store.contains_key(&generation));
    }
}
