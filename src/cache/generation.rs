//! Partition generations.
//!
//! Point entries of a partitioned entity embed the current generation of
//! their partition in the cache key. Retiring a partition is a single delete
//! of its generation entry: the next reader mints a fresh generation and
//! every entry written under the old one becomes unreachable.

use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use super::store::{CacheError, CacheStore};

/// Current generation stored at `key`, minting one when absent.
///
/// Racing mints resolve last-write-wins; entries written under the losing
/// generation only cost a later miss.
pub(crate) async fn current_generation(
    cache: &dyn CacheStore,
    key: &str,
    ttl: Duration,
) -> Result<String, CacheError> {
    if let Some(Value::String(generation)) = cache.get(key).await? {
        return Ok(generation);
    }
    let generation = Uuid::new_v4().simple().to_string();
    cache
        .set(key, Value::String(generation.clone()), ttl)
        .await?;
    Ok(generation)
}
