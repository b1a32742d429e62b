//! Content deduplication.
//!
//! Pages are keyed by a SHA-256 signature of their trimmed visible text.
//! The store is external (Redis in production); lookups fail open so an
//! unreachable store degrades to duplicate indexing rather than an outage.

mod redis;

pub use redis::RedisDeduper;

use async_trait::async_trait;
use dashmap::DashSet;
use sha2::{Digest, Sha256};

/// Capability set for duplicate tracking.
#[async_trait]
pub trait Deduper: Send + Sync {
    /// True iff the signature has been stored before. Transport failures
    /// answer false so indexing never blocks on the dedup store.
    async fn is_duplicate(&self, signature: &str) -> bool;

    /// Record the signature. Transport errors are logged, not surfaced.
    async fn store_signature(&self, signature: &str);
}

/// SHA-256 of the whitespace-trimmed text, lowercase hex.
pub fn generate_signature(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Process-local deduper for tests and single-node runs.
#[derive(Default)]
pub struct MemoryDeduper {
    seen: DashSet<String>,
}

impl MemoryDeduper {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Deduper for MemoryDeduper {
    async fn is_duplicate(&self, signature: &str) -> bool {
        self.seen.contains(signature)
    }

    async fn store_signature(&self, signature: &str) {
        self.seen.insert(signature.to_string());
    }
}
