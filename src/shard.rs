use crate::message::CorrelationId;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_SHARDS: usize = 16;

type Shard<V> = Mutex<HashMap<CorrelationId, V>>;

/// A map keyed by correlation id, split into independently locked shards.
///
/// All work for one key happens under that key's shard lock, so operations on
/// the same id are serialized while ids in other shards proceed in parallel.
/// Callers must not `.await` or touch the broker while holding a shard.
pub struct ShardedMap<V> {
    shards: Box<[Shard<V>]>,
    hasher: RandomState,
}

impl<V> ShardedMap<V> {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_index(&self, key: &CorrelationId) -> usize {
        (self.hasher.hash_one(key) as usize) % self.shards.len()
    }

    // A panic while holding a shard leaves the map itself intact, so a
    // poisoned lock is still usable.
    fn lock(shard: &Shard<V>) -> MutexGuard<'_, HashMap<CorrelationId, V>> {
        shard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the shard that owns `key`
    pub fn with_shard<R>(
        &self,
        key: &CorrelationId,
        f: impl FnOnce(&mut HashMap<CorrelationId, V>) -> R,
    ) -> R {
        let mut guard = Self::lock(&self.shards[self.shard_index(key)]);
        f(&mut guard)
    }

    /// Insert only if `key` is vacant. Returns false if it was occupied.
    pub fn insert_new(&self, key: CorrelationId, value: V) -> bool {
        let mut map = Self::lock(&self.shards[self.shard_index(&key)]);
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    pub fn remove(&self, key: &CorrelationId) -> Option<V> {
        self.with_shard(key, |map| map.remove(key))
    }

    pub fn contains_key(&self, key: &CorrelationId) -> bool {
        self.with_shard(key, |map| map.contains_key(key))
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| Self::lock(s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_where(&self, mut predicate: impl FnMut(&V) -> bool) -> usize {
        self.shards
            .iter()
            .map(|s| Self::lock(s).values().filter(|v| predicate(v)).count())
            .sum()
    }

    /// Remove and return every entry matching `predicate`, one shard at a time
    pub fn extract_if(
        &self,
        mut predicate: impl FnMut(&CorrelationId, &V) -> bool,
    ) -> Vec<(CorrelationId, V)> {
        let mut extracted = Vec::new();

        for shard in self.shards.iter() {
            let mut map = Self::lock(shard);
            let keys: Vec<CorrelationId> = map
                .iter()
                .filter(|(k, v)| predicate(k, v))
                .map(|(k, _)| k.clone())
                .collect();

            for key in keys {
                if let Some(value) = map.remove(&key) {
                    extracted.push((key, value));
                }
            }
        }

        extracted
    }
}

impl<V> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}
