//! Route-response cache
//!
//! The catalog's list routes (trending, top rated, top new) answer the same
//! payload for every caller, so their responses are held for a fixed TTL
//! keyed by route name. Entries are immutable once written and expire only
//! by time; there is no explicit invalidation. Expired entries are dropped
//! lazily on the next read.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::Mutex;

struct CacheEntry {
    body: Bytes,
    expires_at: Instant,
}

/// TTL cache for route response bodies.
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached body for a route, dropping it if expired.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.body.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a response body for a route, expiring one TTL from now.
    pub async fn insert(&self, key: impl Into<String>, body: Bytes) {
        let entry = CacheEntry {
            body,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.lock().await.insert(key.into(), entry);
    }
}
