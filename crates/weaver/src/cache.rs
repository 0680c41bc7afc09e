//! Generated type cache
//!
//! Maps a [`GenerationKey`] to its generated type. Entries hold the type
//! weakly; the loader owns it, so an entry only goes stale once the type
//! itself is gone, and the next request then generates again.
//!
//! Concurrent requests for one key generate once. The first caller runs the
//! generator while the others wait on the entry's cell; callers with other
//! keys are not blocked. A failed pass caches nothing: a waiter retries on
//! the same cell, and the entry is dropped once no requester holds it.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::trace;

use crate::error::WeaverResult;
use crate::generated::GeneratedType;
use crate::key::GenerationKey;

struct CacheEntry {
    cell: OnceCell<Weak<GeneratedType>>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Whether the type is alive, or a requester other than the map still
    /// holds an empty entry
    fn is_live(entry: &Arc<Self>) -> bool {
        match entry.cell.get() {
            Some(weak) => weak.strong_count() > 0,
            None => Arc::strong_count(entry) > 1,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries, stale ones included
    pub entries: usize,
    /// Requests served from the cache
    pub hits: usize,
    /// Requests that had to generate
    pub misses: usize,
    /// Successful generations
    pub generations: usize,
}

/// Per-loader cache of generated types
pub struct ProxyCache {
    entries: DashMap<GenerationKey, Arc<CacheEntry>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    generations: AtomicUsize,
}

impl ProxyCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            generations: AtomicUsize::new(0),
        }
    }

    /// Cached type for `key`, generating it with `generate` when absent or
    /// stale
    pub fn get_or_generate<F>(&self, key: &GenerationKey, generate: F) -> WeaverResult<Arc<GeneratedType>>
    where
        F: FnOnce() -> WeaverResult<Arc<GeneratedType>>,
    {
        let mut generate = Some(generate);
        loop {
            // Clone the entry so no shard lock is held while generating
            let entry = self
                .entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(CacheEntry::new()))
                .clone();

            let mut generated_here = None;
            let result = entry.cell.get_or_try_init(|| {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let generate = generate.take().ok_or_else(|| {
                    crate::error::WeaverError::Emit("generator already consumed".to_string())
                })?;
                let generated = generate()?;
                let weak = Arc::downgrade(&generated);
                generated_here = Some(generated);
                Ok(weak)
            });

            let weak = match result {
                Ok(weak) => weak,
                Err(err) => {
                    // Requesters still holding the entry retry on its cell
                    self.entries.remove_if(key, |_, current| {
                        Arc::ptr_eq(current, &entry)
                            && current.cell.get().is_none()
                            && Arc::strong_count(current) <= 2
                    });
                    return Err(err);
                }
            };

            if let Some(generated) = generated_here {
                self.generations.fetch_add(1, Ordering::Relaxed);
                trace!(class = generated.name(), "cached generated type");
                return Ok(generated);
            }
            if let Some(generated) = weak.upgrade() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(generated);
            }

            trace!(superclass = key.superclass(), "stale cache entry, regenerating");
            self.entries.remove_if(key, |_, current| Arc::ptr_eq(current, &entry));
        }
    }

    /// Cached type for `key`, if present and alive
    pub fn get(&self, key: &GenerationKey) -> Option<Arc<GeneratedType>> {
        let entry = self.entries.get(key)?.clone();
        entry.cell.get()?.upgrade()
    }

    /// Drop stale entries and empty entries no requester is waiting on
    pub fn purge(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| CacheEntry::is_live(entry));
        before.saturating_sub(self.entries.len())
    }

    /// Statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            generations: self.generations.load(Ordering::Relaxed),
        }
    }

    /// Number of entries, stale ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ProxyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProxyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCache").field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use crate::callback::no_op;
    use crate::enhancer::Enhancer;
    use crate::error::WeaverError;
    use crate::runtime::{ClassDefinition, MethodDefinition, TypeLoader, Value};

    fn worker_loader() -> TypeLoader {
        let loader = TypeLoader::new();
        loader
            .define(
                ClassDefinition::new("pkg.Worker")
                    .add_method(MethodDefinition::new("int work(int)", |ctx| Ok(Value::int(ctx.int_arg(0)?)))),
            )
            .unwrap();
        loader
    }

    #[test]
    fn test_failure_leaves_no_entry() {
        let loader = worker_loader();
        let key = Enhancer::new(&loader).set_superclass("pkg.Worker").set_callback(no_op()).key().unwrap();
        let cache = ProxyCache::new();

        let err = cache.get_or_generate(&key, || Err(WeaverError::MissingCallbacks));
        assert!(matches!(err, Err(WeaverError::MissingCallbacks)));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().generations, 0);
    }

    #[test]
    fn test_waiter_retries_after_failed_generation() {
        let loader = worker_loader();
        let enhancer = Enhancer::new(&loader).set_superclass("pkg.Worker").set_callback(no_op());
        let key = enhancer.key().unwrap();
        let existing = enhancer.create_class().unwrap();
        let cache = ProxyCache::new();

        thread::scope(|scope| {
            let (started_tx, started_rx) = mpsc::channel();
            let (cache, key, existing) = (&cache, &key, &existing);
            let waiter = scope.spawn(move || {
                started_rx.recv().unwrap();
                cache.get_or_generate(key, || Ok(existing.clone()))
            });

            let failed = cache.get_or_generate(key, || {
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(100));
                Err(WeaverError::MissingCallbacks)
            });
            assert!(failed.is_err());

            let generated = waiter.join().unwrap().unwrap();
            assert!(Arc::ptr_eq(&generated, existing));
        });

        // The retry ran on the entry the failed pass left in place
        assert!(Arc::ptr_eq(&cache.get(&key).unwrap(), &existing));
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.generations, 1);
    }

    #[test]
    fn test_empty_entries_are_live_while_held() {
        let entry = Arc::new(CacheEntry::new());
        assert!(!CacheEntry::is_live(&entry));

        let held = entry.clone();
        assert!(CacheEntry::is_live(&entry));
        drop(held);
        assert!(!CacheEntry::is_live(&entry));
    }

    #[test]
    fn test_purge_keeps_live_types() {
        let loader = worker_loader();
        let enhancer = Enhancer::new(&loader).set_superclass("pkg.Worker").set_callback(no_op());
        let first = enhancer.create_class().unwrap();
        drop(first);

        assert_eq!(loader.cache().purge(), 0);
        assert_eq!(loader.cache().len(), 1);
        assert!(loader.cache().get(&enhancer.key().unwrap()).is_some());
    }
}
