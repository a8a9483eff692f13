//! Token-scoped TTL cache for fetched secrets and env mappings.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A cached value. Secret fetches store plain strings; env fetches store the
/// whole variable mapping as one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Secret(String),
    Env(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    expires_at: Instant,
}

/// In-memory cache with per-entry TTL.
///
/// One instance lives inside each client; separate clients never share
/// cache state. Expiry is lazy: an entry past its deadline is removed on
/// the read that discovers it. All operations take the lock briefly and
/// never across a suspension point.
#[derive(Debug, Default)]
pub struct SecretCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SecretCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached value iff an entry exists and has not expired.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<CachedValue> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value` for `ttl`, replacing any prior entry.
    ///
    /// Caching is opt-in per call: a missing or zero TTL leaves the cache
    /// untouched and the value is only returned to the caller.
    pub fn put(&self, key: &str, value: CachedValue, ttl: Option<Duration>) {
        self.put_at(key, value, ttl, Instant::now());
    }

    fn put_at(&self, key: &str, value: CachedValue, ttl: Option<Duration>, now: Instant) {
        let Some(ttl) = ttl else { return };
        if ttl.is_zero() {
            return;
        }
        self.lock().insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Removes a single entry if present.
    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }
}
