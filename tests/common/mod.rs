#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use loadcache::cache::{CacheConfig, CacheError, CacheStore, MemoryCacheStore};
use loadcache::config::Settings;
use loadcache::storage::{AttributeValue, EntityStorage, Item, StorageError};
use loadcache::{CacheRuntime, EntityKey, KeyValues, RequestContext, StandardStorage};
use serde_json::Value;

pub const TENANT: &str = "tenantA";

/// In-memory table keyed by the string values of its key fields.
pub struct MemoryTable {
    key_fields: Vec<&'static str>,
    rows: Mutex<HashMap<EntityKey, Item>>,
    batch_calls: AtomicUsize,
    get_calls: AtomicUsize,
    requested: Mutex<Vec<Vec<EntityKey>>>,
    failing: AtomicBool,
}

impl MemoryTable {
    pub fn new(key_fields: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            key_fields: key_fields.to_vec(),
            rows: Mutex::new(HashMap::new()),
            batch_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        })
    }

    pub fn insert(&self, fields: &[(&str, &str)]) {
        let item: Item = fields
            .iter()
            .map(|(name, value)| (name.to_string(), AttributeValue::s(*value)))
            .collect();
        self.put(item);
    }

    pub fn put(&self, item: Item) {
        let key = EntityKey::new(self.key_fields.iter().map(|field| match item.get(*field) {
            Some(AttributeValue::S(value) | AttributeValue::N(value)) => value.clone(),
            _ => panic!("row lacks key field `{field}`"),
        }));
        self.rows.lock().expect("rows").insert(key, item);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Keys of every multi-get, in call order.
    pub fn requested(&self) -> Vec<Vec<EntityKey>> {
        self.requested.lock().expect("requested").clone()
    }
}

#[async_trait]
impl EntityStorage for MemoryTable {
    async fn get(&self, key: &EntityKey) -> Result<Option<Item>, StorageError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::backend("injected get failure"));
        }
        Ok(self.rows.lock().expect("rows").get(key).cloned())
    }

    async fn batch_get(&self, keys: &[EntityKey]) -> Result<Vec<Item>, StorageError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .expect("requested")
            .push(keys.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::backend("injected batch failure"));
        }
        let rows = self.rows.lock().expect("rows");
        Ok(keys.iter().filter_map(|key| rows.get(key).cloned()).collect())
    }
}

/// Cache store wrapper whose operations can be made to fail.
pub struct FlakyCache {
    inner: MemoryCacheStore,
    failing: AtomicBool,
}

impl FlakyCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCacheStore::new(&CacheConfig::default()),
            failing: AtomicBool::new(false),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::unavailable("injected cache failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.check()?;
        self.inner.delete(key).await
    }
}

pub struct Tables {
    pub corporation_profiles: Arc<MemoryTable>,
    pub places: Arc<MemoryTable>,
    pub contact_profiles: Arc<MemoryTable>,
    pub corporation_attributes: Arc<MemoryTable>,
    pub contact_attributes: Arc<MemoryTable>,
}

impl Tables {
    pub fn new() -> Self {
        Self {
            corporation_profiles: MemoryTable::new(&["endpoint_id", "corporation_uuid"]),
            places: MemoryTable::new(&["place_uuid"]),
            contact_profiles: MemoryTable::new(&["contact_uuid"]),
            corporation_attributes: MemoryTable::new(&["corporation_type", "owner_uuid"]),
            contact_attributes: MemoryTable::new(&["contact_type", "owner_uuid"]),
        }
    }

    pub fn storage(&self) -> StandardStorage {
        StandardStorage {
            corporation_profiles: self.corporation_profiles.clone(),
            places: self.places.clone(),
            contact_profiles: self.contact_profiles.clone(),
            corporation_attributes: self.corporation_attributes.clone(),
            contact_attributes: self.contact_attributes.clone(),
        }
    }
}

pub fn runtime(tables: &Tables) -> CacheRuntime {
    CacheRuntime::from_settings(&Settings::default(), tables.storage())
        .expect("standard runtime should build")
}

pub fn runtime_with(
    tables: &Tables,
    settings: &Settings,
    cache: Arc<dyn CacheStore>,
) -> CacheRuntime {
    CacheRuntime::from_settings_with_store(settings, tables.storage(), cache)
        .expect("runtime should build")
}

pub fn tenant() -> KeyValues {
    KeyValues::new().with("endpoint_id", TENANT)
}

pub fn request() -> RequestContext {
    RequestContext::new(tenant())
}
