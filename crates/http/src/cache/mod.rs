//! TTL response cache
//!
//! Entries live in a [`KeyValueStore`] under `<namespace>:<key>` as
//! [`CacheEntry`] JSON. An entry is served only while its age is below its own
//! expiration; stale and unreadable entries are deleted when touched.

pub mod key;

use crate::client::ClientError;
use portal_core::{CacheEntry, CacheEntryStatus, CacheStatus, Clock, KeyValueStore};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outcome of a cache read
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(Value),
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn into_hit(self) -> Option<Value> {
        match self {
            Self::Hit(value) => Some(value),
            Self::Miss => None,
        }
    }
}

/// What a storage slot held when it was read
enum Slot {
    Absent,
    /// Undecodable; it has been deleted
    Corrupt,
    Entry(CacheEntry),
}

pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        namespace: &str,
        default_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            prefix: format!("{namespace}:"),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Read `key`, evicting it if it has expired or cannot be decoded
    pub async fn get(&self, key: &str) -> Result<Lookup, ClientError> {
        let storage_key = self.storage_key(key);
        let Slot::Entry(entry) = self.read_slot(&storage_key).await? else {
            return Ok(Lookup::Miss);
        };

        if entry.is_fresh(self.clock.now_millis()) {
            debug!(key, "cache hit");
            Ok(Lookup::Hit(entry.data))
        } else {
            debug!(key, ttl_ms = entry.expiration_time, "cache entry expired");
            self.store.remove(&storage_key).await?;
            Ok(Lookup::Miss)
        }
    }

    /// Store `payload` under `key` with a fresh timestamp.
    ///
    /// A payload that cannot be serialized is skipped; the cache is left as it was.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        payload: &T,
        ttl: Duration,
    ) -> Result<(), ClientError> {
        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(err) => {
                warn!(key, error = %err, "not caching unserializable payload");
                return Ok(());
            }
        };

        let entry = CacheEntry::new(data, self.clock.now_millis(), ttl);
        let raw = serde_json::to_string(&entry)?;
        self.store.set(&self.storage_key(key), &raw).await?;
        debug!(key, ttl_ms = entry.expiration_time, "cached response");
        Ok(())
    }

    /// Delete every entry whose key contains `pattern`, or all entries when
    /// no pattern is given. Returns how many were removed.
    pub async fn invalidate(&self, pattern: Option<&str>) -> Result<usize, ClientError> {
        let mut removed = 0;
        for storage_key in self.store.keys_with_prefix(&self.prefix).await? {
            let key = &storage_key[self.prefix.len()..];
            if pattern.is_none_or(|pattern| key.contains(pattern)) {
                self.store.remove(&storage_key).await?;
                removed += 1;
            }
        }
        debug!(pattern, removed, "invalidated cache entries");
        Ok(removed)
    }

    /// Delete every expired or unreadable entry. Returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<usize, ClientError> {
        let now = self.clock.now_millis();
        let mut removed = 0;
        for storage_key in self.store.keys_with_prefix(&self.prefix).await? {
            match self.read_slot(&storage_key).await? {
                Slot::Entry(entry) if entry.is_fresh(now) => {}
                Slot::Entry(_) => {
                    self.store.remove(&storage_key).await?;
                    removed += 1;
                }
                Slot::Corrupt => removed += 1,
                // Deleted by someone else since the listing
                Slot::Absent => {}
            }
        }
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        Ok(removed)
    }

    /// Change the expiration of an existing entry, keeping its payload and
    /// write time. Returns `false` if there is no readable entry.
    pub async fn set_expiration(&self, key: &str, ttl: Duration) -> Result<bool, ClientError> {
        let storage_key = self.storage_key(key);
        let Slot::Entry(entry) = self.read_slot(&storage_key).await? else {
            return Ok(false);
        };

        let updated = CacheEntry::new(entry.data, entry.timestamp, ttl);
        self.store
            .set(&storage_key, &serde_json::to_string(&updated)?)
            .await?;
        Ok(true)
    }

    /// Whether anything is stored under `key`, fresh or not
    pub async fn contains(&self, key: &str) -> Result<bool, ClientError> {
        Ok(self.store.get(&self.storage_key(key)).await?.is_some())
    }

    /// Entry count and sizes of everything in this namespace
    pub async fn status(&self) -> Result<CacheStatus, ClientError> {
        let mut entries = Vec::new();
        for storage_key in self.store.keys_with_prefix(&self.prefix).await? {
            let Some(raw) = self.store.get(&storage_key).await? else {
                continue;
            };
            let Ok(entry) = serde_json::from_str::<CacheEntry>(&raw) else {
                continue;
            };
            entries.push(CacheEntryStatus {
                key: storage_key[self.prefix.len()..].to_string(),
                timestamp: entry.timestamp,
                expiration_time: entry.expiration_time,
                size: raw.len(),
            });
        }
        Ok(entries.into_iter().collect())
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `period` until the
    /// cache is dropped or the handle is aborted
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                if let Err(err) = cache.sweep_expired().await {
                    warn!(error = %err, "cache sweep failed");
                }
            }
        })
    }

    /// Decode the entry at `storage_key`, deleting it if it is corrupt
    async fn read_slot(&self, storage_key: &str) -> Result<Slot, ClientError> {
        let Some(raw) = self.store.get(storage_key).await? else {
            return Ok(Slot::Absent);
        };
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Ok(Slot::Entry(entry)),
            Err(err) => {
                warn!(key = storage_key, error = %err, "evicting corrupt cache entry");
                self.store.remove(storage_key).await?;
                Ok(Slot::Corrupt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_core::{ManualClock, MemoryStore};
    use serde_json::json;
    use std::collections::HashMap;

    struct Fixture {
        cache: ResponseCache,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = ResponseCache::new(
            store.clone(),
            clock.clone(),
            "api_cache",
            Duration::from_secs(300),
        );
        Fixture {
            cache,
            store,
            clock,
        }
    }

    #[tokio::test]
    async fn entry_expires_after_its_ttl() {
        let Fixture {
            cache,
            store,
            clock,
        } = fixture();

        cache
            .put("posts?page=1", &json!([{"id": 1}]), Duration::from_millis(5_000))
            .await
            .unwrap();
        assert_eq!(
            cache.get("posts?page=1").await.unwrap(),
            Lookup::Hit(json!([{"id": 1}]))
        );

        clock.advance(Duration::from_millis(6_000));
        assert_eq!(cache.get("posts?page=1").await.unwrap(), Lookup::Miss);
        assert!(store.get("api_cache:posts?page=1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn entry_is_stale_exactly_at_its_ttl() {
        let Fixture { cache, clock, .. } = fixture();
        cache
            .put("k", &json!(1), Duration::from_millis(100))
            .await
            .unwrap();

        clock.advance(Duration::from_millis(99));
        assert!(cache.get("k").await.unwrap().is_hit());
        clock.advance(Duration::from_millis(1));
        assert!(!cache.get("k").await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn repeated_reads_return_the_same_payload() {
        let Fixture { cache, .. } = fixture();
        cache
            .put("post:5", &json!({"id": 5, "title": "hello"}), Duration::from_secs(60))
            .await
            .unwrap();

        let first = cache.get("post:5").await.unwrap();
        let second = cache.get("post:5").await.unwrap();
        assert!(first.is_hit());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn put_overwrites_and_resets_timestamp() {
        let Fixture { cache, clock, .. } = fixture();
        cache.put("k", &json!("old"), Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(8));
        cache.put("k", &json!("new"), Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(8));

        assert_eq!(cache.get("k").await.unwrap(), Lookup::Hit(json!("new")));
    }

    #[tokio::test]
    async fn corrupt_entries_are_misses_and_removed() {
        let Fixture { cache, store, .. } = fixture();
        store.set("api_cache:broken", "{\"data\":").await.unwrap();

        assert_eq!(cache.get("broken").await.unwrap(), Lookup::Miss);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn unserializable_payload_is_not_cached() {
        let Fixture { cache, store, .. } = fixture();
        let mut payload = HashMap::new();
        payload.insert((1, 2), "tuple keys cannot become JSON object keys");

        cache.put("bad", &payload, Duration::from_secs(60)).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn invalidate_by_substring_or_everything() {
        let Fixture { cache, store, .. } = fixture();
        let ttl = Duration::from_secs(60);
        cache.put("GET /posts?page=1", &json!(1), ttl).await.unwrap();
        cache.put("GET /posts?page=2", &json!(2), ttl).await.unwrap();
        cache.put("GET /comments?post=1", &json!(3), ttl).await.unwrap();
        store.set("portal:token", "keep-me").await.unwrap();

        assert_eq!(cache.invalidate(Some("/posts")).await.unwrap(), 2);
        assert!(cache.contains("GET /comments?post=1").await.unwrap());

        // The namespace itself is not part of the matched key
        assert_eq!(cache.invalidate(Some("api_cache")).await.unwrap(), 0);

        assert_eq!(cache.invalidate(None).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("portal:token").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let Fixture {
            cache,
            store,
            clock,
        } = fixture();
        cache.put("short", &json!(1), Duration::from_secs(1)).await.unwrap();
        cache.put("long", &json!(2), Duration::from_secs(60)).await.unwrap();
        store.set("api_cache:corrupt", "nope").await.unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.sweep_expired().await.unwrap(), 2);
        assert!(!cache.contains("short").await.unwrap());
        assert!(cache.contains("long").await.unwrap());
        assert!(!cache.contains("corrupt").await.unwrap());
    }

    /// Lists one key that is already gone by the time it is read
    struct VanishingKey {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl KeyValueStore for VanishingKey {
        async fn get(&self, key: &str) -> portal_core::Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> portal_core::Result<()> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> portal_core::Result<()> {
            self.inner.remove(key).await
        }

        async fn keys_with_prefix(&self, prefix: &str) -> portal_core::Result<Vec<String>> {
            let mut keys = self.inner.keys_with_prefix(prefix).await?;
            keys.push(format!("{prefix}gone"));
            Ok(keys)
        }
    }

    #[tokio::test]
    async fn sweep_does_not_count_keys_removed_concurrently() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = ResponseCache::new(
            Arc::new(VanishingKey {
                inner: MemoryStore::new(),
            }),
            clock.clone(),
            "api_cache",
            Duration::from_secs(300),
        );
        cache.put("short", &json!(1), Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.sweep_expired().await.unwrap(), 1);
        assert_eq!(cache.sweep_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_expiration_keeps_payload_and_timestamp() {
        let Fixture { cache, clock, .. } = fixture();
        cache.put("k", &json!("v"), Duration::from_secs(1)).await.unwrap();
        assert!(cache.set_expiration("k", Duration::from_secs(30)).await.unwrap());
        assert!(!cache.set_expiration("missing", Duration::from_secs(30)).await.unwrap());

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("k").await.unwrap(), Lookup::Hit(json!("v")));
        clock.advance(Duration::from_secs(25));
        assert_eq!(cache.get("k").await.unwrap(), Lookup::Miss);
    }

    #[tokio::test]
    async fn status_lists_entries_in_namespace() {
        let Fixture { cache, store, .. } = fixture();
        cache.put("a", &json!([1, 2, 3]), Duration::from_secs(5)).await.unwrap();
        cache.put("b", &json!({"x": true}), Duration::from_secs(9)).await.unwrap();
        store.set("elsewhere", "ignored").await.unwrap();

        let status = cache.status().await.unwrap();
        assert_eq!(status.total_entries, 2);
        assert_eq!(status.entries[0].key, "a");
        assert_eq!(status.entries[0].expiration_time, 5_000);
        assert_eq!(status.entries[1].timestamp, 1_000_000);
        assert_eq!(
            status.total_size,
            status.entries.iter().map(|e| e.size).sum::<usize>()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_in_background() {
        let Fixture { cache, clock, .. } = fixture();
        let cache = Arc::new(cache);
        cache.put("short", &json!(1), Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_secs(2));

        let handle = cache.spawn_sweeper(Duration::from_secs(30));
        for _ in 0..10 {
            if !cache.contains("short").await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert!(!cache.contains("short").await.unwrap());
        handle.abort();
    }
}
