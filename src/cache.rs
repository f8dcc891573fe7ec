use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Short-lived in-memory cache of per-provider results.
pub struct ResultCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Fresh entry for the pair, if any. Expired entries are purged on the way.
    pub fn get(&self, query: &str, provider: &str) -> Option<V> {
        let key = cache_key(query, provider);
        let mut entries = self.entries.lock();
        let ttl = self.ttl;
        entries.retain(|_, (at, _)| at.elapsed() < ttl);
        entries.get(&key).map(|(_, v)| v.clone())
    }

    pub fn put(&self, query: &str, provider: &str, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.lock().insert(cache_key(query, provider), (Instant::now(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Queries differing only in case or surrounding whitespace share an entry.
pub fn cache_key(query: &str, provider: &str) -> String {
    let mut h = Sha256::new();
    h.update(provider.as_bytes());
    h.update(b"\x1f");
    h.update(query.trim().to_lowercase().as_bytes());
    format!("{:x}", h.finalize())
}
