//! Entity registry.
//!
//! Static declaration of every entity type that takes part in batched,
//! cached reads: its storage accessor, the identity fields that make up its
//! entity key, and the ordered fields its cache keys are composed from.

mod standard;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EntitySettings;
use crate::domain::{ConfigError, EntityKey, EntityType, KeyPart, KeyValues, Record};
use crate::storage::EntityStorage;

pub use standard::StandardStorage;

/// Source of one cache key component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    /// Supplied by the request context, e.g. the tenant/endpoint id.
    Context(&'static str),
    /// A named component of the entity key.
    Key(&'static str),
}

impl KeyField {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Context(name) | Self::Key(name) => name,
        }
    }
}

/// Declaration of one entity type.
#[derive(Clone)]
pub struct EntityDescriptor {
    entity_type: EntityType,
    function_identity: String,
    list_identity: String,
    key_fields: Vec<&'static str>,
    cache_key_fields: Vec<KeyField>,
    partition_field: Option<&'static str>,
    ttl: Option<Duration>,
    caching: bool,
    storage: Arc<dyn EntityStorage>,
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("entity_type", &self.entity_type)
            .field("function_identity", &self.function_identity)
            .field("list_identity", &self.list_identity)
            .field("key_fields", &self.key_fields)
            .field("cache_key_fields", &self.cache_key_fields)
            .field("partition_field", &self.partition_field)
            .field("ttl", &self.ttl)
            .field("caching", &self.caching)
            .finish_non_exhaustive()
    }
}

impl EntityDescriptor {
    pub fn new(entity_type: EntityType, storage: Arc<dyn EntityStorage>) -> Self {
        Self {
            entity_type,
            function_identity: format!("{entity_type}.get"),
            list_identity: format!("{entity_type}.list"),
            key_fields: Vec::new(),
            cache_key_fields: Vec::new(),
            partition_field: None,
            ttl: None,
            caching: true,
            storage,
        }
    }

    /// Ordered names of the entity key components.
    pub fn with_key_fields(mut self, fields: impl IntoIterator<Item = &'static str>) -> Self {
        self.key_fields = fields.into_iter().collect();
        self
    }

    pub fn with_cache_key_fields(mut self, fields: impl IntoIterator<Item = KeyField>) -> Self {
        self.cache_key_fields = fields.into_iter().collect();
        self
    }

    /// Key field grouping records that are invalidated together.
    ///
    /// Point entries of a partitioned entity carry the partition's current
    /// generation in their cache key, so a purge that only knows the
    /// partition value (e.g. the owner of several attribute bags) still
    /// reaches every entry by retiring the generation.
    pub fn with_partition_field(mut self, field: &'static str) -> Self {
        self.partition_field = Some(field);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching = enabled;
        self
    }

    pub fn with_list_identity(mut self, identity: impl Into<String>) -> Self {
        self.list_identity = identity.into();
        self
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn function_identity(&self) -> &str {
        &self.function_identity
    }

    /// Identity of the list resolver; only used to address cached lists.
    pub fn list_identity(&self) -> &str {
        &self.list_identity
    }

    pub fn key_fields(&self) -> &[&'static str] {
        &self.key_fields
    }

    pub fn cache_key_fields(&self) -> &[KeyField] {
        &self.cache_key_fields
    }

    pub fn partition_field(&self) -> Option<&'static str> {
        self.partition_field
    }

    /// Identity of the per-partition generation entry.
    pub fn generation_identity(&self) -> String {
        format!("{}.generation", self.entity_type)
    }

    pub fn ttl_override(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn caching_enabled(&self) -> bool {
        self.caching
    }

    pub fn storage(&self) -> &Arc<dyn EntityStorage> {
        &self.storage
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let entity = self.entity_type;
        if self.key_fields.is_empty() {
            return Err(ConfigError::invalid_descriptor(entity, "no key fields declared"));
        }
        if self.cache_key_fields.is_empty() {
            return Err(ConfigError::invalid_descriptor(
                entity,
                "no cache key fields declared",
            ));
        }
        for (index, field) in self.key_fields.iter().enumerate() {
            if self.key_fields[..index].contains(field) {
                return Err(ConfigError::invalid_descriptor(
                    entity,
                    format!("key field `{field}` declared twice"),
                ));
            }
        }
        for (index, field) in self.cache_key_fields.iter().enumerate() {
            let name = field.name();
            if self.cache_key_fields[..index]
                .iter()
                .any(|earlier| earlier.name() == name)
            {
                return Err(ConfigError::invalid_descriptor(
                    entity,
                    format!("cache key field `{name}` declared twice"),
                ));
            }
            if let KeyField::Key(name) = field
                && !self.key_fields.contains(name)
            {
                return Err(ConfigError::invalid_descriptor(
                    entity,
                    format!("cache key field `{name}` is not a key field"),
                ));
            }
        }
        if let Some(field) = self.partition_field
            && !self.key_fields.contains(&field)
        {
            return Err(ConfigError::invalid_descriptor(
                entity,
                format!("partition field `{field}` is not a key field"),
            ));
        }
        // Every key field must appear in the cache key.
        for field in &self.key_fields {
            if !self.cache_key_fields.iter().any(|cf| cf.name() == *field) {
                return Err(ConfigError::invalid_descriptor(
                    entity,
                    format!("key field `{field}` is missing from the cache key fields"),
                ));
            }
        }
        Ok(())
    }

    fn check_arity(&self, key: &EntityKey) -> Result<(), ConfigError> {
        if key.len() == self.key_fields.len() {
            Ok(())
        } else {
            Err(ConfigError::KeyArity {
                entity: self.entity_type,
                key: key.to_string(),
                expected: self.key_fields.len(),
                actual: key.len(),
            })
        }
    }

    fn key_index(&self, name: &str) -> Result<usize, ConfigError> {
        self.key_fields
            .iter()
            .position(|field| *field == name)
            .ok_or_else(|| ConfigError::unresolved(self.entity_type, name, "not a key field"))
    }

    /// Ordered cache key arguments for a point lookup of `key`.
    pub fn point_args(
        &self,
        context: &KeyValues,
        key: &EntityKey,
    ) -> Result<Vec<String>, ConfigError> {
        self.check_arity(key)?;
        self.cache_key_fields
            .iter()
            .map(|field| match *field {
                KeyField::Context(name) => context.get(name).map(str::to_owned).ok_or_else(|| {
                    ConfigError::unresolved(self.entity_type, name, "missing from request context")
                }),
                KeyField::Key(name) => Ok(key.parts()[self.key_index(name)?].clone()),
            })
            .collect()
    }

    /// Ordered cache key arguments resolved from named values, as supplied
    /// to the purger (`context ∪ entity keys`).
    pub fn named_args(
        &self,
        context: &KeyValues,
        keys: &KeyValues,
    ) -> Result<Vec<String>, ConfigError> {
        self.cache_key_fields
            .iter()
            .map(|field| {
                let value = match *field {
                    KeyField::Context(name) => context.get(name).or_else(|| keys.get(name)),
                    KeyField::Key(name) => keys.get(name).or_else(|| context.get(name)),
                };
                value.map(str::to_owned).ok_or_else(|| {
                    ConfigError::unresolved(
                        self.entity_type,
                        field.name(),
                        "not supplied by context or entity keys",
                    )
                })
            })
            .collect()
    }

    /// Cache key arguments of a list result filtered by `filter`: the
    /// context components followed by the sorted `name=value` filter pairs.
    pub fn list_args(
        &self,
        context: &KeyValues,
        filter: &KeyValues,
    ) -> Result<Vec<String>, ConfigError> {
        let mut args = self.context_args(context)?;
        args.extend(filter.iter().map(|(name, value)| format!("{name}={value}")));
        Ok(args)
    }

    /// Generation entry arguments for the partition `key` belongs to, or
    /// `None` when the entity is not partitioned.
    pub fn partition_args(
        &self,
        context: &KeyValues,
        key: &EntityKey,
    ) -> Result<Option<Vec<String>>, ConfigError> {
        let Some(field) = self.partition_field else {
            return Ok(None);
        };
        self.check_arity(key)?;
        let mut args = self.context_args(context)?;
        args.push(key.parts()[self.key_index(field)?].clone());
        Ok(Some(args))
    }

    /// Generation entry arguments from named values; `None` when the entity
    /// is not partitioned or `keys` lack the partition field.
    pub fn named_partition_args(
        &self,
        context: &KeyValues,
        keys: &KeyValues,
    ) -> Result<Option<Vec<String>>, ConfigError> {
        let Some(value) = self.partition_field.and_then(|field| keys.get(field)) else {
            return Ok(None);
        };
        let mut args = self.context_args(context)?;
        args.push(value.to_owned());
        Ok(Some(args))
    }

    fn context_args(&self, context: &KeyValues) -> Result<Vec<String>, ConfigError> {
        self.cache_key_fields
            .iter()
            .filter_map(|field| match *field {
                KeyField::Context(name) => Some(name),
                KeyField::Key(_) => None,
            })
            .map(|name| {
                context.get(name).map(str::to_owned).ok_or_else(|| {
                    ConfigError::unresolved(self.entity_type, name, "missing from request context")
                })
            })
            .collect()
    }

    /// Rebuild the entity key from a normalized record's identity fields.
    pub fn key_from_record(&self, record: &Record) -> Option<EntityKey> {
        self.key_fields
            .iter()
            .map(|field| {
                record
                    .get(*field)
                    .filter(|value| !value.is_null())
                    .map(|value| value.canonical())
            })
            .collect::<Option<Vec<_>>>()
            .map(EntityKey::new)
    }

    /// Build an entity key from named values, if every key field is present.
    pub fn key_from_values(&self, values: &KeyValues) -> Option<EntityKey> {
        self.key_fields
            .iter()
            .map(|field| values.get(field))
            .collect::<Option<Vec<_>>>()
            .map(EntityKey::new)
    }
}

/// All declared entity types, keyed by their enumerated tag.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    descriptors: HashMap<EntityType, EntityDescriptor>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: EntityDescriptor) -> Result<(), ConfigError> {
        descriptor.validate()?;
        let entity = descriptor.entity_type();
        if self.descriptors.contains_key(&entity) {
            return Err(ConfigError::DuplicateEntity { entity });
        }
        self.descriptors.insert(entity, descriptor);
        Ok(())
    }

    pub fn descriptor(&self, entity: EntityType) -> Result<&EntityDescriptor, ConfigError> {
        self.descriptors
            .get(&entity)
            .ok_or_else(|| ConfigError::unknown_entity(entity.as_str()))
    }

    pub fn contains(&self, entity: EntityType) -> bool {
        self.descriptors.contains_key(&entity)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.descriptors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Apply per-entity TTL/enabled overrides from settings.
    pub fn apply_overrides(
        &mut self,
        overrides: &HashMap<EntityType, EntitySettings>,
    ) -> Result<(), ConfigError> {
        for (entity, settings) in overrides {
            let descriptor = self
                .descriptors
                .get_mut(entity)
                .ok_or_else(|| ConfigError::unknown_entity(entity.as_str()))?;
            if let Some(ttl) = settings.ttl {
                descriptor.ttl = Some(ttl);
            }
            if let Some(enabled) = settings.enabled {
                descriptor.caching = enabled;
            }
        }
        Ok(())
    }
}
