//! Declarations for the built-in entity catalogue.

use std::sync::Arc;

use crate::domain::{ConfigError, EntityType};
use crate::storage::EntityStorage;

use super::{EntityDescriptor, EntityRegistry, KeyField};

/// Storage accessors for every built-in entity type.
#[derive(Clone)]
pub struct StandardStorage {
    pub corporation_profiles: Arc<dyn EntityStorage>,
    pub places: Arc<dyn EntityStorage>,
    pub contact_profiles: Arc<dyn EntityStorage>,
    pub corporation_attributes: Arc<dyn EntityStorage>,
    pub contact_attributes: Arc<dyn EntityStorage>,
}

impl EntityRegistry {
    /// Registry with the built-in corporation/place/contact catalogue.
    pub fn standard(storage: StandardStorage) -> Result<Self, ConfigError> {
        let mut registry = Self::new();

        // Corporation profiles carry the endpoint in their own two-part key.
        registry.register(
            EntityDescriptor::new(EntityType::CorporationProfile, storage.corporation_profiles)
                .with_key_fields(["endpoint_id", "corporation_uuid"])
                .with_cache_key_fields([
                    KeyField::Key("endpoint_id"),
                    KeyField::Key("corporation_uuid"),
                ]),
        )?;

        registry.register(
            EntityDescriptor::new(EntityType::Place, storage.places)
                .with_key_fields(["place_uuid"])
                .with_cache_key_fields([
                    KeyField::Context("endpoint_id"),
                    KeyField::Key("place_uuid"),
                ]),
        )?;

        registry.register(
            EntityDescriptor::new(EntityType::ContactProfile, storage.contact_profiles)
                .with_key_fields(["contact_uuid"])
                .with_cache_key_fields([
                    KeyField::Context("endpoint_id"),
                    KeyField::Key("contact_uuid"),
                ]),
        )?;

        // Attribute bags of one owner are purged together.
        registry.register(
            EntityDescriptor::new(
                EntityType::CorporationAttributes,
                storage.corporation_attributes,
            )
            .with_key_fields(["corporation_type", "owner_uuid"])
            .with_cache_key_fields([
                KeyField::Context("endpoint_id"),
                KeyField::Key("corporation_type"),
                KeyField::Key("owner_uuid"),
            ])
            .with_partition_field("owner_uuid"),
        )?;

        registry.register(
            EntityDescriptor::new(EntityType::ContactAttributes, storage.contact_attributes)
                .with_key_fields(["contact_type", "owner_uuid"])
                .with_cache_key_fields([
                    KeyField::Context("endpoint_id"),
                    KeyField::Key("contact_type"),
                    KeyField::Key("owner_uuid"),
                ])
                .with_partition_field("owner_uuid"),
        )?;

        Ok(registry)
    }
}
