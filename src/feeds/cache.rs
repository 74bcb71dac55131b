// Staleness-checked cache for external signal data.
//
// Entries live in the key-value store as `{fetched_at, data}` JSON. A failed
// refresh falls back to whatever copy exists, however old.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::KeyValueStore;
use crate::feeds::FeedError;

/// Default maximum age before an entry is refreshed.
pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fetched_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Cache key for one kind of signal in a season/week bucket.
pub fn signal_key(kind: &str, season: &str, bucket: &str) -> String {
    format!("signals/{kind}/{season}/{bucket}")
}

pub struct SignalCache {
    store: Arc<dyn KeyValueStore>,
    max_age: Duration,
}

impl SignalCache {
    pub fn new(store: Arc<dyn KeyValueStore>, max_age_hours: i64) -> Self {
        Self {
            store,
            max_age: Duration::hours(max_age_hours),
        }
    }

    /// Read an entry regardless of age. Store and decode failures read as
    /// a miss.
    pub fn read(&self, key: &str) -> Option<CacheEntry> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("signal cache read failed for {}: {:#}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("discarding corrupt signal cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub fn write<T: Serialize>(&self, key: &str, data: &T) {
        let entry = match serde_json::to_value(data) {
            Ok(data) => CacheEntry {
                fetched_at: Utc::now(),
                data,
            },
            Err(e) => {
                warn!("cannot cache {}: {}", key, e);
                return;
            }
        };
        let result = serde_json::to_string(&entry)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.set(key, &json));
        if let Err(e) = result {
            warn!("signal cache write failed for {}: {:#}", key, e);
        }
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        Utc::now().signed_duration_since(entry.fetched_at) < self.max_age
    }

    /// Return the cached value when fresh, otherwise call `fetch` and store
    /// its result. If `fetch` fails and any cached copy exists, that copy is
    /// returned instead of the error.
    pub async fn get_or_refresh<T, F, Fut>(&self, key: &str, fetch: F) -> Result<T, FeedError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FeedError>>,
    {
        let cached = self.read(key);
        if let Some(entry) = &cached {
            if self.is_fresh(entry) {
                match serde_json::from_value(entry.data.clone()) {
                    Ok(value) => {
                        debug!("signal cache hit for {}", key);
                        return Ok(value);
                    }
                    Err(e) => warn!("cached {} no longer decodes: {}", key, e),
                }
            }
        }

        match fetch().await {
            Ok(value) => {
                self.write(key, &value);
                Ok(value)
            }
            Err(err) => {
                let stale = cached.and_then(|entry| {
                    serde_json::from_value::<T>(entry.data)
                        .ok()
                        .map(|v| (v, entry.fetched_at))
                });
                match stale {
                    Some((value, fetched_at)) => {
                        warn!(
                            "refresh of {} failed ({}); using cached copy from {}",
                            key, err, fetched_at
                        );
                        Ok(value)
                    }
                    None => Err(err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> (Arc<Database>, SignalCache) {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let cache = SignalCache::new(db.clone(), DEFAULT_MAX_AGE_HOURS);
        (db, cache)
    }

    fn fail() -> FeedError {
        FeedError::Status {
            url: "https://feed.test/stats".into(),
            status: 503,
        }
    }

    fn put_aged(db: &Database, key: &str, data: serde_json::Value, hours_old: i64) {
        let entry = CacheEntry {
            fetched_at: Utc::now() - Duration::hours(hours_old),
            data,
        };
        db.set(key, &serde_json::to_string(&entry).unwrap()).unwrap();
    }

    #[test]
    fn key_layout() {
        assert_eq!(signal_key("projections", "2025", "w07"), "signals/projections/2025/w07");
    }

    #[tokio::test]
    async fn miss_fetches_and_stores() {
        let (db, cache) = cache();
        let calls = AtomicUsize::new(0);
        let key = signal_key("stats", "2025", "w01");
        let v: Vec<u32> = cache
            .get_or_refresh(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3])
            })
            .await
            .unwrap();
        assert_eq!(v, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(db.get(&key).unwrap().is_some());

        // Second read is served from the fresh entry.
        let again: Vec<u32> = cache
            .get_or_refresh(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![9])
            })
            .await
            .unwrap();
        assert_eq!(again, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_entry_is_refreshed() {
        let (db, cache) = cache();
        put_aged(&db, "k", serde_json::json!([1]), 30);
        let v: Vec<u32> = cache.get_or_refresh("k", || async { Ok(vec![2]) }).await.unwrap();
        assert_eq!(v, vec![2]);
        assert!(cache.is_fresh(&cache.read("k").unwrap()));
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_stale_copy() {
        let (db, cache) = cache();
        put_aged(&db, "k", serde_json::json!([7]), 72);
        let v: Vec<u32> = cache
            .get_or_refresh("k", || async { Err(fail()) })
            .await
            .unwrap();
        assert_eq!(v, vec![7]);
    }

    #[tokio::test]
    async fn failed_refresh_without_copy_propagates() {
        let (_db, cache) = cache();
        let err = cache
            .get_or_refresh::<Vec<u32>, _, _>("k", || async { Err(fail()) })
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn corrupt_entry_treated_as_miss() {
        let (db, cache) = cache();
        db.set("k", "garbage").unwrap();
        let v: Vec<u32> = cache.get_or_refresh("k", || async { Ok(vec![4]) }).await.unwrap();
        assert_eq!(v, vec![4]);
    }
}
