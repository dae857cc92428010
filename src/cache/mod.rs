//! Shared read-through cache.
//!
//! - **Keys**: [`CacheKeyBuilder`] derives a deterministic key from a
//!   function identity and an ordered argument tuple.
//! - **Store**: [`CacheStore`] is the process-wide (or cache-server backed)
//!   key/value seam; [`MemoryCacheStore`] is the in-process LRU.
//! - **Generations**: partitioned entities (attribute bags per owner) key
//!   their point entries by a per-partition generation the purger retires.
//! - **Lists**: [`ListCache`] lets list resolvers cache their results under
//!   keys the purger knows how to find.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! namespace = "loadcache"
//! default_ttl_seconds = 300
//! capacity = 10000
//! cascade_depth = 3
//! ```

mod config;
mod generation;
mod keys;
mod list;
pub(crate) mod lock;
mod store;

pub use config::CacheConfig;
pub use keys::CacheKeyBuilder;
pub use list::ListCache;
pub use store::{CacheEntry, CacheError, CacheStore, MemoryCacheStore};

pub(crate) use config::{
    DEFAULT_CAPACITY, DEFAULT_CASCADE_DEPTH, DEFAULT_NAMESPACE, DEFAULT_TTL_SECONDS,
    MAX_TTL_SECONDS,
};
pub(crate) use generation::current_generation;
