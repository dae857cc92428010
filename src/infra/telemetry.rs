use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register metric descriptions with the installed recorder. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "loadcache_cache_hit_total",
            Unit::Count,
            "Point lookups answered from the shared cache."
        );
        describe_counter!(
            "loadcache_cache_miss_total",
            Unit::Count,
            "Point lookups that fell through to storage."
        );
        describe_counter!(
            "loadcache_cache_evict_total",
            Unit::Count,
            "Entries evicted from the in-memory store due to capacity."
        );
        describe_counter!(
            "loadcache_cache_error_total",
            Unit::Count,
            "Cache backend failures, treated as misses or dropped writes."
        );
        describe_counter!(
            "loadcache_storage_batch_total",
            Unit::Count,
            "Storage multi-get calls issued by batch loaders."
        );
        describe_counter!(
            "loadcache_storage_failure_total",
            Unit::Count,
            "Storage calls that failed and resolved as not found."
        );
        describe_counter!(
            "loadcache_purge_keys_total",
            Unit::Count,
            "Live cache entries removed by purges."
        );
        describe_histogram!(
            "loadcache_flush_ms",
            Unit::Milliseconds,
            "Batch loader flush latency in milliseconds."
        );
        describe_histogram!(
            "loadcache_purge_ms",
            Unit::Milliseconds,
            "Cascading purge latency in milliseconds."
        );
    });
}
