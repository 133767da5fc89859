//! Incremental output cache.
//!
//! One current entry per asset identity, keyed by [`CacheKey`]. A changed key
//! replaces the entry; assets that leave the graph are evicted with
//! [`IncrementalCache::retain`].
//!
//! [`IncrementalCache::get_or_compute`] is single-flight: concurrent callers
//! with the same key block on one computation and share its result.

mod key;
mod store;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use rustc_hash::FxHashSet;

use crate::freshness::ContentHash;
use crate::transform::TransformError;

pub use key::CacheKey;

/// Transformed output of one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub content: Arc<[u8]>,
    /// `/`-separated path relative to the output directory.
    pub output: String,
    pub url: String,
    /// blake3 of `content`.
    pub digest: ContentHash,
    /// Output extension without the dot.
    pub extension: String,
}

/// How [`IncrementalCache::get_or_compute`] obtained an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Stored entry with an equal key.
    Hit,
    /// Computed by this call.
    Computed,
    /// Computed by a concurrent call with the same key.
    Shared,
}

type Flight = Arc<OnceLock<Result<Arc<CacheEntry>, TransformError>>>;

/// Counters since creation (or the last [`IncrementalCache::reset_stats`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub computes: usize,
}

#[derive(Default)]
pub struct IncrementalCache {
    entries: DashMap<PathBuf, (CacheKey, Arc<CacheEntry>)>,
    inflight: DashMap<CacheKey, Flight>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    computes: AtomicUsize,
}

impl IncrementalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `key`, if the stored key for that asset is equal.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.entries
            .get(&key.asset)
            .filter(|stored| stored.0 == *key)
            .map(|stored| Arc::clone(&stored.1))
    }

    /// Store `entry` as the current output of `key.asset`.
    pub fn put(&self, key: CacheKey, entry: Arc<CacheEntry>) {
        self.entries.insert(key.asset.clone(), (key, entry));
    }

    /// Return the cached entry or compute it, at most once per key at a time.
    ///
    /// Errors are returned to every waiter of the flight but never stored,
    /// so the next generation retries.
    pub fn get_or_compute<F>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> Result<(Arc<CacheEntry>, Lookup), TransformError>
    where
        F: FnOnce() -> Result<CacheEntry, TransformError>,
    {
        if let Some(entry) = self.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((entry, Lookup::Hit));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // The shard guard is dropped at the end of this statement
        let flight: Flight = Arc::clone(
            &self
                .inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceLock::new())),
        );

        let mut lookup = Lookup::Shared;
        let result = flight
            .get_or_init(|| {
                // A previous flight may have finished after our first check
                if let Some(entry) = self.get(key) {
                    return Ok(entry);
                }
                lookup = Lookup::Computed;
                self.computes.fetch_add(1, Ordering::Relaxed);
                let entry = compute().map(Arc::new)?;
                self.put(key.clone(), Arc::clone(&entry));
                Ok(entry)
            })
            .clone();

        self.inflight
            .remove_if(key, |_, current| Arc::ptr_eq(current, &flight));

        result.map(|entry| (entry, lookup))
    }

    /// Evict entries whose asset is not in `live`. Returns how many were removed.
    pub fn retain(&self, live: &FxHashSet<PathBuf>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| live.contains(path));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computes: self.computes.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.computes.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::time::Duration;

    fn key(path: &str, content: &[u8]) -> CacheKey {
        CacheKey::new(
            PathBuf::from(path),
            ContentHash::of(content),
            ContentHash::empty(),
            ContentHash::empty(),
        )
    }

    fn entry(text: &str) -> CacheEntry {
        CacheEntry {
            content: Arc::from(text.as_bytes()),
            output: "out.js".into(),
            url: "/out.js".into(),
            digest: ContentHash::of(text.as_bytes()),
            extension: "js".into(),
        }
    }

    #[test]
    fn test_get_put_replace() {
        let cache = IncrementalCache::new();
        let k1 = key("/p/a.js", b"1");
        let k2 = key("/p/a.js", b"2");

        assert!(cache.get(&k1).is_none());
        cache.put(k1.clone(), Arc::new(entry("one")));
        assert_eq!(&*cache.get(&k1).unwrap().content, b"one");

        // New key for the same asset replaces the entry
        assert!(cache.get(&k2).is_none());
        cache.put(k2.clone(), Arc::new(entry("two")));
        assert!(cache.get(&k1).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_or_compute_hits_after_first() {
        let cache = IncrementalCache::new();
        let k = key("/p/a.js", b"x");

        let (_, first) = cache.get_or_compute(&k, || Ok(entry("x"))).unwrap();
        let (_, second) = cache
            .get_or_compute(&k, || panic!("must not recompute"))
            .unwrap();

        assert_eq!(first, Lookup::Computed);
        assert_eq!(second, Lookup::Hit);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, computes: 1 });
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = IncrementalCache::new();
        let k = key("/p/a.js", b"x");

        let err = cache
            .get_or_compute(&k, || Err(TransformError::new("script", anyhow::anyhow!("boom"))))
            .unwrap_err();
        assert_eq!(err.step, "script");
        assert!(cache.is_empty());

        let (_, lookup) = cache.get_or_compute(&k, || Ok(entry("ok"))).unwrap();
        assert_eq!(lookup, Lookup::Computed);
    }

    #[test]
    fn test_concurrent_single_flight() {
        const THREADS: usize = 16;
        let cache = IncrementalCache::new();
        let k = key("/p/shared.js", b"x");
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    let (entry, _) = cache
                        .get_or_compute(&k, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(50));
                            Ok(entry("shared"))
                        })
                        .unwrap();
                    assert_eq!(&*entry.content, b"shared");
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().computes, 1);
        assert!(cache.inflight.is_empty());
    }

    #[test]
    fn test_retain_evicts_removed_assets() {
        let cache = IncrementalCache::new();
        cache.put(key("/p/a.js", b"a"), Arc::new(entry("a")));
        cache.put(key("/p/b.js", b"b"), Arc::new(entry("b")));

        let live: FxHashSet<PathBuf> = [PathBuf::from("/p/a.js")].into_iter().collect();
        assert_eq!(cache.retain(&live), 1);
        assert!(cache.get(&key("/p/a.js", b"a")).is_some());
        assert!(cache.get(&key("/p/b.js", b"b")).is_none());
    }
}
