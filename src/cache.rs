//! Best-effort cache for entities the pipeline reads repeatedly.
//!
//! Callers go through typed accessors on [`Cache`]; a miss is always
//! answered by reloading from the store, so an implementation may evict or
//! expire anything at any time.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::storage::{Category, CategorySnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The full category snapshot.
    Categories,
    /// One category by id.
    Category(i64),
}

#[derive(Debug, Clone)]
pub enum CacheEntry {
    Categories(CategorySnapshot),
    Category(Arc<Category>),
}

pub trait Cache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    fn set(&self, key: CacheKey, entry: CacheEntry);

    fn invalidate(&self, key: &CacheKey);

    fn categories(&self) -> Option<CategorySnapshot> {
        match self.get(&CacheKey::Categories)? {
            CacheEntry::Categories(snapshot) => Some(snapshot),
            CacheEntry::Category(_) => None,
        }
    }

    fn set_categories(&self, snapshot: CategorySnapshot) {
        self.set(CacheKey::Categories, CacheEntry::Categories(snapshot));
    }

    fn category(&self, id: i64) -> Option<Arc<Category>> {
        match self.get(&CacheKey::Category(id))? {
            CacheEntry::Category(category) => Some(category),
            CacheEntry::Categories(_) => None,
        }
    }

    fn set_category(&self, category: Arc<Category>) {
        self.set(CacheKey::Category(category.id), CacheEntry::Category(category));
    }
}

/// In-process LRU cache whose entries expire after a fixed time to live.
pub struct MemoryCache {
    entries: Mutex<LruCache<CacheKey, (Instant, CacheEntry)>>,
    ttl: Duration,
}

impl MemoryCache {
    const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(Self::DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self::new(capacity, ttl)
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, (Instant, CacheEntry)>> {
        // A panic while holding the lock leaves the map itself intact
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some((stored_at, entry)) if stored_at.elapsed() < self.ttl => {
                return Some(entry.clone())
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    fn set(&self, key: CacheKey, entry: CacheEntry) {
        self.lock().put(key, (Instant::now(), entry));
    }

    fn invalidate(&self, key: &CacheKey) {
        self.lock().pop(key);
    }
}
