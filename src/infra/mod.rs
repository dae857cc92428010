//! Process bootstrap: telemetry and runtime assembly.

pub mod error;
pub mod telemetry;

use std::path::Path;

use tracing::info;

use crate::config;
use crate::registry::StandardStorage;
use crate::runtime::CacheRuntime;

use self::error::InfraError;

/// Load settings, install telemetry and build the shared cache runtime.
pub fn bootstrap(
    config_path: Option<&Path>,
    storage: StandardStorage,
) -> Result<CacheRuntime, InfraError> {
    let settings = config::load(config_path)?;
    telemetry::init(&settings.logging)?;
    let runtime = CacheRuntime::from_settings(&settings, storage)?;
    info!(
        namespace = %settings.cache.namespace,
        enabled = settings.cache.enabled,
        cascade_depth = settings.cache.cascade_depth,
        edges = runtime.graph().edge_count(),
        "Cache runtime ready"
    );
    Ok(runtime)
}
