use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::future::join_all;
use metrics::{counter, histogram};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

use crate::cache::{current_generation, lock};
use crate::domain::{ConfigError, EntityKey, EntityType, Record};
use crate::registry::EntityDescriptor;
use crate::storage::normalize;

use super::{RequestContext, SharedCache};

const METRIC_CACHE_HIT: &str = "loadcache_cache_hit_total";
const METRIC_CACHE_MISS: &str = "loadcache_cache_miss_total";
const METRIC_CACHE_ERROR: &str = "loadcache_cache_error_total";
const METRIC_STORAGE_BATCH: &str = "loadcache_storage_batch_total";
const METRIC_STORAGE_FAILURE: &str = "loadcache_storage_failure_total";
const METRIC_FLUSH_MS: &str = "loadcache_flush_ms";

type Waiter = (EntityKey, oneshot::Sender<Option<Record>>);

/// Point-lookup loader for one entity type within one request.
pub struct BatchLoader {
    entity_type: EntityType,
    shared: SharedCache,
    context: RequestContext,
    pending: Mutex<Vec<Waiter>>,
}

impl BatchLoader {
    pub fn new(entity_type: EntityType, shared: SharedCache, context: RequestContext) -> Self {
        Self {
            entity_type,
            shared,
            context,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Resolve `keys` in order, one output per input.
    ///
    /// Missing records and storage failures resolve to `None`; only an
    /// unsound registry (unknown entity, unresolvable cache key) is an error.
    #[instrument(
        skip_all,
        parent = self.context.span(),
        fields(entity_type = %self.entity_type, keys = keys.len())
    )]
    pub async fn load(&self, keys: &[EntityKey]) -> Result<Vec<Option<Record>>, ConfigError> {
        let started_at = Instant::now();
        let descriptor = self.shared.registry.descriptor(self.entity_type)?;

        // Dedup, remembering where each input lands.
        let mut unique: Vec<&EntityKey> = Vec::new();
        let mut slots: HashMap<&EntityKey, usize> = HashMap::new();
        let positions: Vec<usize> = keys
            .iter()
            .map(|key| {
                *slots.entry(key).or_insert_with(|| {
                    unique.push(key);
                    unique.len() - 1
                })
            })
            .collect();

        let ttl = self.shared.config.ttl_for(descriptor);
        let cache_keys = self.cache_keys(descriptor, &unique, ttl).await?;

        let mut results: Vec<Option<Record>> = vec![None; unique.len()];
        let mut misses: Vec<usize> = Vec::new();

        // Phase 1: cache lookups
        let lookups = join_all(
            cache_keys
                .iter()
                .map(|cache_key| self.lookup(cache_key.as_deref())),
        )
        .await;
        for (index, cached) in lookups.into_iter().enumerate() {
            match cached {
                Some(record) => results[index] = Some(record),
                None => misses.push(index),
            }
        }

        let entity = self.entity_type.as_str();
        counter!(METRIC_CACHE_HIT, "entity_type" => entity)
            .increment((unique.len() - misses.len()) as u64);
        counter!(METRIC_CACHE_MISS, "entity_type" => entity).increment(misses.len() as u64);

        // Phase 2: one multi-get for everything the cache could not answer
        if !misses.is_empty() {
            let wanted: Vec<EntityKey> = misses.iter().map(|&index| unique[index].clone()).collect();
            let by_key: HashMap<&EntityKey, usize> =
                misses.iter().map(|&index| (unique[index], index)).collect();

            counter!(METRIC_STORAGE_BATCH, "entity_type" => entity).increment(1);
            match descriptor.storage().batch_get(&wanted).await {
                Ok(items) => {
                    let mut fetched = Vec::new();
                    for item in items {
                        let record = normalize(item);
                        let Some(key) = descriptor.key_from_record(&record) else {
                            debug!(entity_type = entity, "storage returned a record without key fields");
                            continue;
                        };
                        let Some(&index) = by_key.get(&key) else {
                            debug!(entity_type = entity, key = %key, "storage returned an unrequested record");
                            continue;
                        };
                        fetched.push(index);
                        results[index] = Some(record);
                    }

                    // Phase 3: populate the cache
                    if let Some(ttl) = ttl {
                        join_all(fetched.iter().filter_map(|&index| {
                            let cache_key = cache_keys[index].as_deref()?;
                            results[index]
                                .as_ref()
                                .map(|record| self.store(cache_key, record, ttl))
                        }))
                        .await;
                    }
                }
                Err(err) => {
                    counter!(METRIC_STORAGE_FAILURE, "entity_type" => entity).increment(1);
                    warn!(
                        entity_type = entity,
                        keys = ?wanted,
                        error = %err,
                        "storage batch failed, resolving keys as not found"
                    );
                }
            }
        }

        histogram!(METRIC_FLUSH_MS, "entity_type" => entity)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        Ok(positions
            .into_iter()
            .map(|index| results[index].clone())
            .collect())
    }

    /// Read-through lookup of a single key using the storage point getter.
    #[instrument(
        skip_all,
        parent = self.context.span(),
        fields(entity_type = %self.entity_type, key = %key)
    )]
    pub async fn load_one(&self, key: &EntityKey) -> Result<Option<Record>, ConfigError> {
        let descriptor = self.shared.registry.descriptor(self.entity_type)?;
        let ttl = self.shared.config.ttl_for(descriptor);
        let cache_key = self
            .cache_keys(descriptor, &[key], ttl)
            .await?
            .pop()
            .flatten();
        let entity = self.entity_type.as_str();

        if let Some(record) = self.lookup(cache_key.as_deref()).await {
            counter!(METRIC_CACHE_HIT, "entity_type" => entity).increment(1);
            return Ok(Some(record));
        }
        counter!(METRIC_CACHE_MISS, "entity_type" => entity).increment(1);

        match descriptor.storage().get(key).await {
            Ok(Some(item)) => {
                let record = normalize(item);
                if let (Some(cache_key), Some(ttl)) = (cache_key.as_deref(), ttl) {
                    self.store(cache_key, &record, ttl).await;
                }
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                counter!(METRIC_STORAGE_FAILURE, "entity_type" => entity).increment(1);
                warn!(entity_type = entity, key = %key, error = %err, "storage get failed, resolving as not found");
                Ok(None)
            }
        }
    }

    /// Register interest in `key`; resolved by the next [`dispatch`](Self::dispatch).
    pub fn defer(&self, key: EntityKey) -> PendingLoad {
        let (sender, receiver) = oneshot::channel();
        lock::lock(&self.pending, "loader::batch.defer").push((key, sender));
        PendingLoad { receiver }
    }

    pub fn pending_len(&self) -> usize {
        lock::lock(&self.pending, "loader::batch.pending_len").len()
    }

    /// Flush every deferred key through one [`load`](Self::load).
    ///
    /// Returns the number of keys flushed. On a configuration error the
    /// pending futures resolve to `None` and the error is returned.
    pub async fn dispatch(&self) -> Result<usize, ConfigError> {
        let waiters = std::mem::take(&mut *lock::lock(&self.pending, "loader::batch.dispatch"));
        if waiters.is_empty() {
            return Ok(0);
        }

        let (keys, senders): (Vec<_>, Vec<_>) = waiters.into_iter().unzip();
        let values = self.load(&keys).await?;
        for (sender, value) in senders.into_iter().zip(values) {
            // Receiver gone means the caller abandoned the lookup.
            let _ = sender.send(value);
        }
        Ok(keys.len())
    }

    /// Cache key per input key, `None` where the cache is bypassed this round
    /// (caching off, or the partition generation could not be read).
    ///
    /// Arguments resolve before the cache switch is consulted so an unsound
    /// registry fails closed either way.
    async fn cache_keys(
        &self,
        descriptor: &EntityDescriptor,
        keys: &[&EntityKey],
        ttl: Option<Duration>,
    ) -> Result<Vec<Option<String>>, ConfigError> {
        let context = self.context.keys();
        let mut args = Vec::with_capacity(keys.len());
        let mut generation_keys = Vec::with_capacity(keys.len());
        for key in keys {
            args.push(descriptor.point_args(context, key)?);
            let partition = descriptor.partition_args(context, key)?;
            generation_keys.push(partition.map(|partition| {
                self.shared
                    .keys
                    .build_key(&descriptor.generation_identity(), &partition)
            }));
        }
        let Some(ttl) = ttl else {
            return Ok(vec![None; keys.len()]);
        };

        let distinct: HashSet<&str> = generation_keys.iter().flatten().map(String::as_str).collect();
        let generations: HashMap<&str, Option<String>> = join_all(
            distinct
                .into_iter()
                .map(|generation_key| async move {
                    (generation_key, self.generation(generation_key, ttl).await)
                }),
        )
        .await
        .into_iter()
        .collect();

        Ok(args
            .into_iter()
            .zip(&generation_keys)
            .map(|(mut args, generation_key)| {
                if let Some(generation_key) = generation_key {
                    args.push(generations.get(generation_key.as_str())?.clone()?);
                }
                Some(self.shared.keys.build_key(descriptor.function_identity(), &args))
            })
            .collect())
    }

    async fn generation(&self, generation_key: &str, ttl: Duration) -> Option<String> {
        match current_generation(self.shared.cache.as_ref(), generation_key, ttl).await {
            Ok(generation) => Some(generation),
            Err(err) => {
                counter!(METRIC_CACHE_ERROR, "entity_type" => self.entity_type.as_str()).increment(1);
                warn!(
                    cache_key = generation_key,
                    error = %err,
                    "partition generation unavailable, bypassing cache"
                );
                None
            }
        }
    }

    async fn lookup(&self, cache_key: Option<&str>) -> Option<Record> {
        self.cached(cache_key?).await
    }

    async fn cached(&self, cache_key: &str) -> Option<Record> {
        match self.shared.cache.get(cache_key).await {
            Ok(Some(Value::Object(record))) => Some(record),
            Ok(Some(_)) => {
                debug!(cache_key, "cached value is not a record, treating as miss");
                None
            }
            Ok(None) => None,
            Err(err) => {
                counter!(METRIC_CACHE_ERROR, "entity_type" => self.entity_type.as_str()).increment(1);
                warn!(cache_key, error = %err, "cache read failed, falling through to storage");
                None
            }
        }
    }

    async fn store(&self, cache_key: &str, record: &Record, ttl: Duration) {
        if let Err(err) = self
            .shared
            .cache
            .set(cache_key, Value::Object(record.clone()), ttl)
            .await
        {
            counter!(METRIC_CACHE_ERROR, "entity_type" => self.entity_type.as_str()).increment(1);
            warn!(cache_key, error = %err, "cache write failed, value not cached");
        }
    }
}

/// Result of a deferred lookup; resolves to `None` if the loader was dropped
/// before dispatching.
pub struct PendingLoad {
    receiver: oneshot::Receiver<Option<Record>>,
}

impl Future for PendingLoad {
    type Output = Option<Record>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|value| value.unwrap_or(None))
    }
}
