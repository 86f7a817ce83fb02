//! Single-flight request cache for idempotent lookups.
//!
//! [`RequestCache`] memoizes the result of an async fetch per key. While a
//! fetch for a key is running, every other caller for that key waits for it
//! instead of starting its own; callers for other keys are not blocked.
//!
//! Resolved entries can be persisted between runs with
//! [`RequestCache::save_to`] and [`RequestCache::load_from`]. The CLI keeps
//! its cache files in the platform cache directory:
//! - Linux: `~/.cache/invscan/`
//! - macOS: `~/Library/Caches/invscan/`
//! - Windows: `%LOCALAPPDATA%\invscan\`
//!
//! # Example
//!
//! ```
//! use invscan::RequestCache;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let cache: RequestCache<String, u32> = RequestCache::new();
//! let v = rt.block_on(cache.get("lodash".to_string(), || async { Ok::<_, std::io::Error>(42) }));
//! assert_eq!(v.unwrap(), 42);
//! ```

use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::hash::Hash;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tokio::sync::OnceCell;

/// A concurrent per-key memoization cache.
///
/// A failed fetch is not cached: the error goes to the caller whose fetch
/// failed, and the next caller for that key (one already waiting, or a later
/// one) runs its own fetch.
pub struct RequestCache<K, V> {
    entries: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

#[derive(Serialize, Deserialize)]
struct CacheEntry<K, V> {
    key: K,
    value: V,
}

impl<K, V> RequestCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Arc<OnceCell<V>>>> {
        // The map is only touched by short non-panicking sections, so a
        // poisoned lock still holds consistent data.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the cached value for `key`, running `fetch` to produce it if
    /// no value is cached yet.
    ///
    /// At most one `fetch` per key runs at a time.
    pub async fn get<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.lock().entry(key.clone()).or_default().clone();
        let result = cell.get_or_try_init(fetch).await.cloned();
        if result.is_err() {
            self.forget_unresolved(&key, &cell);
        }
        result
    }

    /// Drops the empty cell of a failed fetch unless another caller is
    /// still waiting on it.
    fn forget_unresolved(&self, key: &K, cell: &Arc<OnceCell<V>>) {
        let mut entries = self.lock();
        let unused = entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && Arc::strong_count(cell) == 2);
        if unused && !cell.initialized() {
            entries.remove(key);
        }
    }

    /// Seeds the cache. Later [`get`](Self::get) calls for these keys return
    /// the seeded value without fetching.
    pub fn set_map(&self, initial: HashMap<K, V>) {
        let mut entries = self.lock();
        for (key, value) in initial {
            entries.insert(key, Arc::new(OnceCell::from(value)));
        }
    }

    /// Snapshot of every resolved entry. In-flight fetches are not included.
    pub fn get_map(&self) -> HashMap<K, V> {
        self.lock()
            .iter()
            .filter_map(|(key, cell)| cell.get().map(|value| (key.clone(), value.clone())))
            .collect()
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> RequestCache<K, V>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Writes every resolved entry to `path` as JSON.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let entries: Vec<CacheEntry<K, V>> = self
            .get_map()
            .into_iter()
            .map(|(key, value)| CacheEntry { key, value })
            .collect();
        fs::write(path, serde_json::to_string(&entries)?)?;
        Ok(())
    }

    /// Seeds the cache from a file written by [`save_to`](Self::save_to).
    ///
    /// Returns `false` without touching the cache if the file doesn't exist
    /// or was written longer than `ttl` ago.
    pub fn load_from(&self, path: &Path, ttl: Duration) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }

        let modified = fs::metadata(path)?.modified()?;
        let age = SystemTime::now().duration_since(modified).unwrap_or_default();
        if age > ttl {
            return Ok(false);
        }

        let content = fs::read_to_string(path)?;
        let entries: Vec<CacheEntry<K, V>> = serde_json::from_str(&content)?;
        self.set_map(entries.into_iter().map(|e| (e.key, e.value)).collect());
        Ok(true)
    }
}

impl<K, V> Default for RequestCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
