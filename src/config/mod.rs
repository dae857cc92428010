//! Configuration layer: typed settings with layered precedence (files → env).

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    path::Path,
    str::FromStr,
    time::Duration,
};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{
    DEFAULT_CAPACITY, DEFAULT_CASCADE_DEPTH, DEFAULT_NAMESPACE, DEFAULT_TTL_SECONDS,
    MAX_TTL_SECONDS,
};
use crate::domain::EntityType;
use crate::relations::DependencyLookup;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "loadcache";
const ENV_PREFIX: &str = "LOADCACHE";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    /// Per-entity overrides of the cache defaults.
    pub entities: HashMap<EntityType, EntitySettings>,
    /// Relationship edges merged into the built-in graph.
    pub relationships: Vec<RelationshipSettings>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub namespace: String,
    pub default_ttl: Duration,
    pub capacity: NonZeroUsize,
    pub cascade_depth: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySettings {
    pub ttl: Option<Duration>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipSettings {
    pub parent: EntityType,
    pub child: EntityType,
    pub dependency_key: String,
    pub lookup: DependencyLookup,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (files → environment).
///
/// `config/default` and `loadcache` are optional; an explicit `path` must
/// exist. Environment variables use `LOADCACHE__SECTION__KEY`.
pub fn load(path: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    entities: HashMap<String, RawEntitySettings>,
    relationships: Vec<RawRelationshipSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        // The defaults are valid by construction.
        Self {
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            cache: CacheSettings {
                enabled: true,
                namespace: DEFAULT_NAMESPACE.to_string(),
                default_ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
                capacity: NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
                cascade_depth: DEFAULT_CASCADE_DEPTH,
            },
            entities: HashMap::new(),
            relationships: Vec::new(),
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            entities,
            relationships,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let entities = build_entity_settings(entities)?;
        let relationships = relationships
            .into_iter()
            .map(build_relationship_settings)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            logging,
            cache,
            entities,
            relationships,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let namespace = cache
        .namespace
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    if namespace.is_empty() {
        return Err(LoadError::invalid("cache.namespace", "must not be empty"));
    }
    if namespace.contains(':') {
        return Err(LoadError::invalid(
            "cache.namespace",
            "must not contain `:` (cache key separator)",
        ));
    }

    let ttl_seconds = cache.default_ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS);
    check_ttl_seconds(ttl_seconds)
        .map_err(|reason| LoadError::invalid("cache.default_ttl_seconds", reason))?;

    let capacity = NonZeroUsize::new(cache.capacity.unwrap_or(DEFAULT_CAPACITY))
        .ok_or_else(|| LoadError::invalid("cache.capacity", "must be greater than zero"))?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        namespace,
        default_ttl: Duration::from_secs(ttl_seconds),
        capacity,
        cascade_depth: cache.cascade_depth.unwrap_or(DEFAULT_CASCADE_DEPTH),
    })
}

fn build_entity_settings(
    entities: HashMap<String, RawEntitySettings>,
) -> Result<HashMap<EntityType, EntitySettings>, LoadError> {
    entities
        .into_iter()
        .map(|(name, raw)| {
            let entity = parse_entity(&name, "entities")?;
            let ttl = match raw.ttl_seconds {
                Some(seconds) => {
                    check_ttl_seconds(seconds).map_err(|reason| {
                        LoadError::invalid("entities.ttl_seconds", format!("`{name}`: {reason}"))
                    })?;
                    Some(Duration::from_secs(seconds))
                }
                None => None,
            };
            Ok((
                entity,
                EntitySettings {
                    ttl,
                    enabled: raw.enabled,
                },
            ))
        })
        .collect()
}

fn build_relationship_settings(
    raw: RawRelationshipSettings,
) -> Result<RelationshipSettings, LoadError> {
    let parent = parse_entity(&raw.parent, "relationships.parent")?;
    let child = parse_entity(&raw.child, "relationships.child")?;
    let edge = format!("{parent} -> {child}");

    let dependency_key = raw.dependency_key.trim().to_string();
    if dependency_key.is_empty() {
        return Err(LoadError::invalid(
            "relationships.dependency_key",
            format!("{edge}: must not be empty"),
        ));
    }

    let parent_key = raw
        .parent_key
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let lookup = match (raw.lookup, parent_key) {
        (None, _) => {
            return Err(LoadError::invalid(
                "relationships.lookup",
                format!("{edge}: must be `parent_identity` or `foreign_field`"),
            ));
        }
        (Some(RawLookup::ParentIdentity), None) => DependencyLookup::ParentIdentity,
        (Some(RawLookup::ParentIdentity), Some(_)) => {
            return Err(LoadError::invalid(
                "relationships.parent_key",
                format!("{edge}: only allowed with `lookup = \"foreign_field\"`"),
            ));
        }
        (Some(RawLookup::ForeignField), Some(parent_key)) => {
            DependencyLookup::ForeignField { parent_key }
        }
        (Some(RawLookup::ForeignField), None) => {
            return Err(LoadError::invalid(
                "relationships.parent_key",
                format!("{edge}: required with `lookup = \"foreign_field\"`"),
            ));
        }
    };

    Ok(RelationshipSettings {
        parent,
        child,
        dependency_key,
        lookup,
    })
}

fn check_ttl_seconds(seconds: u64) -> Result<(), String> {
    if seconds == 0 {
        return Err("must be greater than zero".to_string());
    }
    if seconds > MAX_TTL_SECONDS {
        return Err(format!("must not exceed {MAX_TTL_SECONDS} seconds"));
    }
    Ok(())
}

fn parse_entity(name: &str, key: &'static str) -> Result<EntityType, LoadError> {
    EntityType::parse(name.trim())
        .ok_or_else(|| LoadError::invalid(key, format!("unknown entity type `{name}`")))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    namespace: Option<String>,
    default_ttl_seconds: Option<u64>,
    capacity: Option<usize>,
    cascade_depth: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEntitySettings {
    ttl_seconds: Option<u64>,
    enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRelationshipSettings {
    parent: String,
    child: String,
    dependency_key: String,
    #[serde(default)]
    lookup: Option<RawLookup>,
    #[serde(default)]
    parent_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawLookup {
    ParentIdentity,
    ForeignField,
}

#[cfg(test)]
mod tests;
