//! Relationship graph.
//!
//! For each parent entity type, the child entity types whose cached lookups
//! or lists embed the parent's data, and how the affected child records are
//! found from the parent's changed keys. The graph may contain cycles; the
//! purger bounds traversal by depth instead of detecting them.

use std::collections::HashMap;

use crate::config::RelationshipSettings;
use crate::domain::{ConfigError, EntityType, KeyValues};
use crate::registry::EntityRegistry;

/// How a child's lookup value is taken from the parent's changed keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyLookup {
    /// The parent's own value of `dependency_key`.
    ParentIdentity,
    /// The value of a differently named parent field.
    ForeignField { parent_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationshipEdge {
    pub child: EntityType,
    /// Field identifying the affected child records.
    pub dependency_key: String,
    pub lookup: DependencyLookup,
}

impl RelationshipEdge {
    pub fn by_identity(child: EntityType, dependency_key: impl Into<String>) -> Self {
        Self {
            child,
            dependency_key: dependency_key.into(),
            lookup: DependencyLookup::ParentIdentity,
        }
    }

    pub fn by_foreign_field(
        child: EntityType,
        dependency_key: impl Into<String>,
        parent_key: impl Into<String>,
    ) -> Self {
        Self {
            child,
            dependency_key: dependency_key.into(),
            lookup: DependencyLookup::ForeignField {
                parent_key: parent_key.into(),
            },
        }
    }

    /// Parent field the lookup value is read from.
    pub fn source_field(&self) -> &str {
        match &self.lookup {
            DependencyLookup::ParentIdentity => &self.dependency_key,
            DependencyLookup::ForeignField { parent_key } => parent_key,
        }
    }

    /// Keys identifying the affected child records, or `None` when the
    /// parent's changed keys do not carry the source field.
    pub fn child_keys(&self, parent_keys: &KeyValues) -> Option<KeyValues> {
        parent_keys
            .get(self.source_field())
            .map(|value| KeyValues::new().with(self.dependency_key.clone(), value))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    edges: HashMap<EntityType, Vec<RelationshipEdge>>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `parent -> edge.child`, validating both ends against `registry`.
    /// Re-adding an identical edge is a no-op.
    pub fn add_edge(
        &mut self,
        registry: &EntityRegistry,
        parent: EntityType,
        edge: RelationshipEdge,
    ) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            ConfigError::invalid_edge(parent.as_str(), edge.child.as_str(), &edge.dependency_key, reason)
        };
        if !registry.contains(parent) {
            return Err(invalid("parent entity type is not registered"));
        }
        if !registry.contains(edge.child) {
            return Err(invalid("child entity type is not registered"));
        }
        if edge.dependency_key.trim().is_empty() {
            return Err(invalid("dependency key is empty"));
        }
        if let DependencyLookup::ForeignField { parent_key } = &edge.lookup
            && parent_key.trim().is_empty()
        {
            return Err(invalid("foreign-field lookup names an empty parent key"));
        }

        let edges = self.edges.entry(parent).or_default();
        if !edges.contains(&edge) {
            edges.push(edge);
        }
        Ok(())
    }

    pub fn edges(&self, parent: EntityType) -> &[RelationshipEdge] {
        self.edges.get(&parent).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Merge configured edges into the graph.
    pub fn extend_from_settings(
        &mut self,
        registry: &EntityRegistry,
        relationships: &[RelationshipSettings],
    ) -> Result<(), ConfigError> {
        for relationship in relationships {
            let edge = RelationshipEdge {
                child: relationship.child,
                dependency_key: relationship.dependency_key.clone(),
                lookup: relationship.lookup.clone(),
            };
            self.add_edge(registry, relationship.parent, edge)?;
        }
        Ok(())
    }

    /// Dependencies among the built-in entity types.
    pub fn standard(registry: &EntityRegistry) -> Result<Self, ConfigError> {
        use EntityType::*;

        let mut graph = Self::new();
        graph.add_edge(
            registry,
            CorporationProfile,
            RelationshipEdge::by_identity(Place, "corporation_uuid"),
        )?;
        graph.add_edge(
            registry,
            CorporationProfile,
            RelationshipEdge::by_foreign_field(CorporationAttributes, "owner_uuid", "corporation_uuid"),
        )?;
        // Profile responses nest their attribute bag, so the reverse edge exists too.
        graph.add_edge(
            registry,
            CorporationAttributes,
            RelationshipEdge::by_foreign_field(CorporationProfile, "corporation_uuid", "owner_uuid"),
        )?;
        graph.add_edge(
            registry,
            Place,
            RelationshipEdge::by_identity(ContactProfile, "place_uuid"),
        )?;
        graph.add_edge(
            registry,
            ContactProfile,
            RelationshipEdge::by_foreign_field(ContactAttributes, "owner_uuid", "contact_uuid"),
        )?;
        graph.add_edge(
            registry,
            ContactAttributes,
            RelationshipEdge::by_foreign_field(ContactProfile, "contact_uuid", "owner_uuid"),
        )?;
        Ok(graph)
    }
}
