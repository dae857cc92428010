//! Request-scoped batched entity loading over a shared read-through cache,
//! with cascading invalidation along declared entity relationships.
//!
//! Read side: a [`RequestLoaderSet`] per request, one [`BatchLoader`] per
//! entity type. Write side: after a successful mutation, call
//! [`CascadingCachePurger::purge`] with the written entity's keys.

pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod loader;
pub mod purge;
pub mod registry;
pub mod relations;
pub mod runtime;
pub mod storage;

pub use domain::{ConfigError, EntityKey, EntityType, KeyPart, KeyValues, Record};
pub use loader::{AttributeLoader, BatchLoader, PendingLoad, RequestContext, RequestLoaderSet};
pub use purge::{CascadingCachePurger, PurgeSummary, PurgeVisit};
pub use registry::{EntityDescriptor, EntityRegistry, KeyField, StandardStorage};
pub use relations::{DependencyLookup, RelationshipEdge, RelationshipGraph};
pub use runtime::CacheRuntime;
