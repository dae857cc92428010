//! Cache key construction.
//!
//! A cache key is `"{namespace}:{function_identity}:{digest}"` where the
//! digest is SHA-256 over the length-prefixed identity and canonical
//! argument parts. Length prefixes keep `("ab", "c")` and `("a", "bc")`
//! apart without any delimiter escaping.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::domain::KeyPart;

/// Turns `(function identity, ordered arguments)` into a cache key string.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    namespace: Arc<str>,
}

impl CacheKeyBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Arc::from(namespace.into()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn build_key<P: KeyPart>(&self, function_identity: &str, args: &[P]) -> String {
        let mut hasher = Sha256::new();
        write_part(&mut hasher, function_identity);
        for arg in args {
            write_part(&mut hasher, &arg.canonical());
        }
        format!(
            "{}:{}:{}",
            self.namespace,
            function_identity,
            hex::encode(hasher.finalize())
        )
    }
}

fn write_part(hasher: &mut Sha256, part: &str) {
    hasher.update((part.len() as u64).to_le_bytes());
    hasher.update(part.as_bytes());
}
