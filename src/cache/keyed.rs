//! Keyed in-memory cache
//!
//! [`KeyedCache`] is the contract the rest of the crate programs against;
//! [`MokaCache`] bounds it with moka's size-aware eviction.

use std::hash::Hash;

use moka::ops::compute::Op;
use moka::sync::Cache;

/// Concurrency-safe map with opaque eviction
pub trait KeyedCache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn set(&self, key: K, value: V);
    fn remove(&self, key: &K);
    fn remove_all(&self);

    /// Snapshot of the keys currently present
    fn keys(&self) -> Vec<K>;

    /// Snapshot of every entry
    fn entries(&self) -> Vec<(K, V)>;

    /// Replace the value for `key` with `f(current)` as one step
    fn upsert(&self, key: K, f: &mut dyn FnMut(Option<V>) -> V);

    /// Like [`KeyedCache::upsert`], but `None` removes the entry in the same step
    fn compute(&self, key: K, f: &mut dyn FnMut(Option<V>) -> Option<V>);
}

/// moka-backed [`KeyedCache`]
pub struct MokaCache<K, V> {
    inner: Cache<K, V>,
}

impl<K, V> MokaCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Cache holding at most `max_entries` values
    pub fn with_capacity(name: &str, max_entries: u64) -> Self {
        Self {
            inner: Cache::builder().max_capacity(max_entries).name(name).build(),
        }
    }

    /// Cache bounded by the summed weight of its values
    pub fn weighted(name: &str, max_weight: u64, weigher: fn(&K, &V) -> u32) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_weight)
                .weigher(weigher)
                .name(name)
                .build(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl<K, V> KeyedCache<K, V> for MokaCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    fn set(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    fn remove(&self, key: &K) {
        self.inner.invalidate(key);
    }

    fn remove_all(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    fn keys(&self) -> Vec<K> {
        self.inner.iter().map(|(key, _)| (*key).clone()).collect()
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.inner
            .iter()
            .map(|(key, value)| ((*key).clone(), value))
            .collect()
    }

    fn upsert(&self, key: K, f: &mut dyn FnMut(Option<V>) -> V) {
        self.inner
            .entry(key)
            .and_upsert_with(|existing| f(existing.map(|entry| entry.into_value())));
    }

    fn compute(&self, key: K, f: &mut dyn FnMut(Option<V>) -> Option<V>) {
        self.inner.entry(key).and_compute_with(|existing| {
            match f(existing.map(|entry| entry.into_value())) {
                Some(value) => Op::Put(value),
                None => Op::Remove,
            }
        });
    }
}
