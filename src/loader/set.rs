use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::{ConfigError, EntityKey, EntityType, KeyPart, Record};

use super::{BatchLoader, PendingLoad, RequestContext, SharedCache};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LoaderSlot {
    Entity(EntityType),
    CorporationAttributes(String),
    ContactAttributes(String),
}

/// Loaders of one request, created lazily on first use.
///
/// Pending batches never outlive the set; the cache behind it is shared.
pub struct RequestLoaderSet {
    shared: SharedCache,
    context: RequestContext,
    loaders: DashMap<LoaderSlot, Arc<BatchLoader>>,
}

impl RequestLoaderSet {
    pub fn new(shared: SharedCache, context: RequestContext) -> Self {
        Self {
            shared,
            context,
            loaders: DashMap::new(),
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn loader(&self, entity: EntityType) -> Arc<BatchLoader> {
        self.slot(LoaderSlot::Entity(entity), entity)
    }

    /// Attribute bag loader for one corporation type, keyed by owner uuid.
    pub fn corporation_attributes(&self, corporation_type: &str) -> AttributeLoader {
        AttributeLoader {
            bag_type: corporation_type.to_string(),
            inner: self.slot(
                LoaderSlot::CorporationAttributes(corporation_type.to_string()),
                EntityType::CorporationAttributes,
            ),
        }
    }

    /// Attribute bag loader for one contact type, keyed by owner uuid.
    pub fn contact_attributes(&self, contact_type: &str) -> AttributeLoader {
        AttributeLoader {
            bag_type: contact_type.to_string(),
            inner: self.slot(
                LoaderSlot::ContactAttributes(contact_type.to_string()),
                EntityType::ContactAttributes,
            ),
        }
    }

    pub async fn load(
        &self,
        entity: EntityType,
        keys: &[EntityKey],
    ) -> Result<Vec<Option<Record>>, ConfigError> {
        self.loader(entity).load(keys).await
    }

    /// Flush the deferred keys of every loader; returns the total flushed.
    ///
    /// Every loader is flushed even if one fails; the first error is returned.
    pub async fn dispatch_all(&self) -> Result<usize, ConfigError> {
        let loaders: Vec<Arc<BatchLoader>> = self
            .loaders
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut flushed = 0;
        let mut first_error = None;
        for loader in loaders {
            match loader.dispatch().await {
                Ok(count) => flushed += count,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(flushed),
        }
    }

    pub fn loader_count(&self) -> usize {
        self.loaders.len()
    }

    fn slot(&self, slot: LoaderSlot, entity: EntityType) -> Arc<BatchLoader> {
        let entry = self.loaders.entry(slot).or_insert_with(|| {
            Arc::new(BatchLoader::new(
                entity,
                self.shared.clone(),
                self.context.clone(),
            ))
        });
        Arc::clone(entry.value())
    }
}

/// Attribute bag loader fixed to one bag type.
#[derive(Clone)]
pub struct AttributeLoader {
    bag_type: String,
    inner: Arc<BatchLoader>,
}

impl AttributeLoader {
    pub fn bag_type(&self) -> &str {
        &self.bag_type
    }

    fn key(&self, owner: &impl KeyPart) -> EntityKey {
        EntityKey::new([self.bag_type.clone(), owner.canonical()])
    }

    pub async fn load<P: KeyPart>(&self, owners: &[P]) -> Result<Vec<Option<Record>>, ConfigError> {
        let keys: Vec<EntityKey> = owners.iter().map(|owner| self.key(owner)).collect();
        self.inner.load(&keys).await
    }

    pub async fn load_one(&self, owner: impl KeyPart) -> Result<Option<Record>, ConfigError> {
        self.inner.load_one(&self.key(&owner)).await
    }

    pub fn defer(&self, owner: impl KeyPart) -> PendingLoad {
        self.inner.defer(self.key(&owner))
    }

    pub async fn dispatch(&self) -> Result<usize, ConfigError> {
        self.inner.dispatch().await
    }
}
