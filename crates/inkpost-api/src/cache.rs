//! Short-lived cache of rendered blog listing pages.
//!
//! Entries are never invalidated on writes; they expire after the configured
//! lifetime, so a listing can trail recent changes by at most that long.

use std::time::Duration;

use bytes::Bytes;
use moka::future::Cache;
use sha2::{Digest, Sha256};

const MAX_ENTRIES: u64 = 1000;

pub struct BlogListCache {
    pages: Cache<String, Bytes>,
}

impl BlogListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pages: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.pages.get(key).await
    }

    pub async fn insert(&self, key: String, body: Bytes) {
        self.pages.insert(key, body).await;
    }

    /// SHA-256 over the normalized query pairs. Callers pass pairs in a fixed
    /// order with repeatable values already sorted.
    pub fn key(params: &[(&str, String)]) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in params {
            hasher.update(name.as_bytes());
            hasher.update([0x1f]);
            hasher.update(value.as_bytes());
            hasher.update([0x1e]);
        }
        format!("blogs_all_{}", hex::encode(hasher.finalize()))
    }
}
