use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use lru::LruCache;

/// Thread-safe bounded cache of directory listings.
///
/// Listings are the one piece of derived state a rename silently invalidates:
/// after a move, every cached listing at or under the old location is stale.
/// The cache is bounded by entry count with LRU eviction.
#[derive(Debug)]
pub struct ListingCache {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    listings: LruCache<PathBuf, Arc<[PathBuf]>>,
    /// Bumped by [`ListingCache::invalidate`]. A miss records the generation
    /// before its unlocked disk read and only caches the result if no
    /// invalidation ran in between, so a concurrent rename can never be
    /// overwritten by a stale listing.
    generation: u64,
}

impl ListingCache {
    /// Default number of cached directory listings.
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(Self::DEFAULT_CAPACITY).expect("nonzero default"));
        Self {
            inner: Mutex::new(Inner {
                listings: LruCache::new(capacity),
                generation: 0,
            }),
        }
    }

    /// Returns the cached listing for `dir`, reading and caching it on a miss.
    ///
    /// Entries are sorted so repeated reads observe a stable order regardless
    /// of the platform's directory iteration order. The lock is not held
    /// across the disk read; an invalidation landing in that window discards
    /// the freshly read listing instead of caching it.
    pub fn read_dir(&self, dir: &Path) -> io::Result<Arc<[PathBuf]>> {
        let generation = {
            let mut inner = self.lock();
            if let Some(listing) = inner.listings.get(dir) {
                return Ok(listing.clone());
            }
            inner.generation
        };

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            entries.push(entry?.path());
        }
        entries.sort_unstable();
        let listing: Arc<[PathBuf]> = entries.into();

        self.put_if_unchanged(dir, listing.clone(), generation);
        Ok(listing)
    }

    /// Returns the cached listing for `dir` without touching the disk.
    pub fn get(&self, dir: &Path) -> Option<Arc<[PathBuf]>> {
        let mut inner = self.lock();
        inner.listings.get(dir).cloned()
    }

    /// Drops the cached listing for `path` and for everything under it.
    ///
    /// Called on rename with the old location and its parent directory.
    pub fn invalidate(&self, path: &Path) {
        let mut inner = self.lock();
        inner.generation += 1;
        let stale: Vec<PathBuf> = inner
            .listings
            .iter()
            .filter(|(dir, _)| dir.starts_with(path))
            .map(|(dir, _)| dir.clone())
            .collect();
        for dir in stale {
            inner.listings.pop(&dir);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().listings.is_empty()
    }

    /// Caches `listing` unless an invalidation ran since `generation` was
    /// observed. Returns whether the listing was cached.
    fn put_if_unchanged(&self, dir: &Path, listing: Arc<[PathBuf]>, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.listings.put(dir.to_path_buf(), listing);
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }
}
