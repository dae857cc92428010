use thiserror::Error;

use super::entities::EntityType;

/// Programming errors in the entity registry or relationship graph.
///
/// These fail closed: they surface at startup or first use and are never
/// downgraded the way storage or cache failures are.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("entity type `{name}` is not registered")]
    UnknownEntity { name: String },
    #[error("entity type `{entity}` is registered twice")]
    DuplicateEntity { entity: EntityType },
    #[error("entity `{entity}` is misdeclared: {reason}")]
    InvalidDescriptor { entity: EntityType, reason: String },
    #[error("cache key field `{field}` of `{entity}` cannot be resolved: {reason}")]
    UnresolvedKeyField {
        entity: EntityType,
        field: String,
        reason: String,
    },
    #[error("entity key {key} for `{entity}` has {actual} parts, expected {expected}")]
    KeyArity {
        entity: EntityType,
        key: String,
        expected: usize,
        actual: usize,
    },
    #[error("relationship `{parent}` -> `{child}` on `{dependency_key}` is invalid: {reason}")]
    InvalidEdge {
        parent: String,
        child: String,
        dependency_key: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn unknown_entity(name: impl Into<String>) -> Self {
        Self::UnknownEntity { name: name.into() }
    }

    pub fn invalid_descriptor(entity: EntityType, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            entity,
            reason: reason.into(),
        }
    }

    pub fn unresolved(entity: EntityType, field: &str, reason: impl Into<String>) -> Self {
        Self::UnresolvedKeyField {
            entity,
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_edge(
        parent: impl Into<String>,
        child: impl Into<String>,
        dependency_key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidEdge {
            parent: parent.into(),
            child: child.into(),
            dependency_key: dependency_key.into(),
            reason: reason.into(),
        }
    }
}
