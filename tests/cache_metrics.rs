mod common;

use std::collections::HashSet;

use common::{TENANT, Tables, request, runtime, tenant};
use loadcache::infra::telemetry;
use loadcache::{EntityKey, EntityType, KeyValues};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let tables = Tables::new();
    tables.corporation_profiles.insert(&[
        ("endpoint_id", TENANT),
        ("corporation_uuid", "corp-1"),
        ("name", "Acme"),
    ]);
    let runtime = runtime(&tables);
    let key = [EntityKey::new([TENANT, "corp-1"])];

    // Miss, then hit.
    for _ in 0..2 {
        runtime
            .request(request())
            .load(EntityType::CorporationProfile, &key)
            .await
            .expect("load");
    }

    // Purge and latency.
    runtime
        .purger()
        .purge(
            EntityType::CorporationProfile,
            &tenant(),
            &KeyValues::new()
                .with("endpoint_id", TENANT)
                .with("corporation_uuid", "corp-1"),
        )
        .await
        .expect("purge");

    // Storage failure.
    tables.places.set_failing(true);
    runtime
        .request(request())
        .load(EntityType::Place, &[EntityKey::new(["p1"])])
        .await
        .expect("failed loads resolve to not found");

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "loadcache_cache_hit_total",
        "loadcache_cache_miss_total",
        "loadcache_storage_batch_total",
        "loadcache_storage_failure_total",
        "loadcache_purge_keys_total",
        "loadcache_flush_ms",
        "loadcache_purge_ms",
    ];
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let counter = |name: &str, entity: &str| {
        snapshot
            .iter()
            .filter(|(composite_key, _, _, _)| {
                let key = composite_key.key();
                key.name() == name
                    && key
                        .labels()
                        .any(|label| label.key() == "entity_type" && label.value() == entity)
            })
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(count) => *count,
                _ => 0,
            })
            .sum::<u64>()
    };

    assert_eq!(counter("loadcache_cache_hit_total", "corporation_profile"), 1);
    assert_eq!(counter("loadcache_cache_miss_total", "corporation_profile"), 1);
    assert_eq!(counter("loadcache_storage_batch_total", "corporation_profile"), 1);
    assert_eq!(counter("loadcache_storage_failure_total", "place"), 1);
    assert_eq!(counter("loadcache_purge_keys_total", "corporation_profile"), 1);
}
