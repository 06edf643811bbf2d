// src/core/storage/dict.rs

//! A shard-striped concurrent map from `Bytes` keys to arbitrary values.
//!
//! The keyspace is partitioned by hashing the key into a power-of-two number
//! of shards, each a plain `HashMap` behind its own `parking_lot::RwLock`.
//! Shard locks are only ever held for the duration of a single map operation
//! and never across an await point; cross-key atomicity is the job of the
//! striped key locker, not of this structure.

use bytes::Bytes;
use parking_lot::RwLock;
use rand::rngs::SmallRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

/// A fixed shard count suffices: the inner maps grow with their standard
/// policy, so no rehashing across shards is ever required.
#[derive(Debug)]
pub struct ShardedDict<V> {
    shards: Vec<RwLock<HashMap<Bytes, V>>>,
    mask: usize,
}

impl<V: Clone> ShardedDict<V> {
    /// Creates a dict with `count` shards, rounded up to a power of two.
    pub fn with_shard_count(count: usize) -> Self {
        let count = count.max(1).next_power_of_two();
        let shards = (0..count).map(|_| RwLock::new(HashMap::new())).collect();
        Self {
            shards,
            mask: count - 1,
        }
    }

    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & self.mask
    }

    fn shard(&self, key: &[u8]) -> &RwLock<HashMap<Bytes, V>> {
        &self.shards[self.shard_index(key)]
    }

    pub fn get(&self, key: &Bytes) -> Option<V> {
        self.shard(key).read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &Bytes) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Insert-or-replace. Returns 1 if the key was inserted, 0 if replaced.
    pub fn put(&self, key: Bytes, value: V) -> usize {
        match self.shard(&key).write().insert(key, value) {
            Some(_) => 0,
            None => 1,
        }
    }

    /// Inserts only when the key is absent. Returns 1 on insert, 0 otherwise.
    pub fn put_if_absent(&self, key: Bytes, value: V) -> usize {
        let mut guard = self.shard(&key).write();
        if guard.contains_key(&key) {
            0
        } else {
            guard.insert(key, value);
            1
        }
    }

    /// Replaces only when the key is present. Returns 1 on replace, 0 otherwise.
    pub fn put_if_exists(&self, key: Bytes, value: V) -> usize {
        let mut guard = self.shard(&key).write();
        if let Some(slot) = guard.get_mut(&key) {
            *slot = value;
            1
        } else {
            0
        }
    }

    pub fn remove(&self, key: &Bytes) -> Option<V> {
        self.shard(key).write().remove(key)
    }

    /// Runs `f` against the value under the shard's read lock, without cloning.
    pub fn with_value<R>(&self, key: &Bytes, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.shard(key).read().get(key).map(f)
    }

    /// Runs `f` against the value under the shard's write lock.
    pub fn with_value_mut<R>(&self, key: &Bytes, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.shard(key).write().get_mut(key).map(f)
    }

    /// Runs `f` against the value, inserting `default()` first if the key is
    /// absent. Returns `f`'s result together with whether an insert happened.
    pub fn with_value_or_insert_mut<R>(
        &self,
        key: Bytes,
        default: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> (R, bool) {
        let mut guard = self.shard(&key).write();
        let mut inserted = false;
        let slot = guard.entry(key).or_insert_with(|| {
            inserted = true;
            default()
        });
        (f(slot), inserted)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Iterates all entries, shard by shard. Iteration is not globally atomic:
    /// each shard is visited under its own read lock (snapshot-per-shard). The
    /// visitor returning `false` stops the iteration.
    pub fn for_each(&self, mut visitor: impl FnMut(&Bytes, &V) -> bool) {
        for shard in &self.shards {
            let guard = shard.read();
            for (key, value) in guard.iter() {
                if !visitor(key, value) {
                    return;
                }
            }
        }
    }

    /// Returns up to `n` keys sampled at random, possibly with duplicates.
    pub fn random_keys(&self, n: usize) -> Vec<Bytes> {
        let mut rng = SmallRng::from_entropy();
        let mut keys = Vec::with_capacity(n);
        for _ in 0..n {
            let shard = &self.shards[rng.gen_range(0..self.shards.len())];
            let guard = shard.read();
            if let Some(key) = guard.keys().choose(&mut rng) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Returns up to `n` distinct keys sampled at random. May return fewer
    /// when the dict holds fewer than `n` keys.
    pub fn random_distinct_keys(&self, n: usize) -> Vec<Bytes> {
        let total = self.len();
        if total <= n {
            let mut keys = Vec::with_capacity(total);
            self.for_each(|key, _| {
                keys.push(key.clone());
                true
            });
            return keys;
        }

        let mut rng = SmallRng::from_entropy();
        let mut seen = std::collections::HashSet::with_capacity(n);
        // Bounded number of attempts so a pathological distribution cannot spin.
        let mut attempts = n * 16;
        while seen.len() < n && attempts > 0 {
            attempts -= 1;
            let shard = &self.shards[rng.gen_range(0..self.shards.len())];
            let guard = shard.read();
            if let Some(key) = guard.keys().choose(&mut rng) {
                seen.insert(key.clone());
            }
        }
        seen.into_iter().collect()
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
    }
}
