//! Persistent LRU cache.
//!
//! Every operation that changes contents or recency returns a new cache and
//! leaves `self` untouched. Two persistent maps are kept in step: one from
//! key to its slot (value and recency stamp), one from stamp to key. The
//! smallest stamp is always the least recently used entry.

use crate::error::{CacheError, CacheErrorKind};
use crate::persistent_map::PersistentMap;

#[derive(Debug, Clone, PartialEq)]
struct Slot<V> {
    value: V,
    stamp: u64,
}

#[derive(Debug, Clone)]
pub struct PersistentLru<K, V> {
    capacity: usize,
    entries: PersistentMap<K, Slot<V>>,
    usage: PersistentMap<u64, K>,
    next_stamp: u64,
}

impl<K, V> PersistentLru<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: PersistentMap::new(),
            usage: PersistentMap::new(),
            next_stamp: 0,
        }
    }

    /// Builds an empty cache from a signed capacity, rejecting negatives.
    pub fn try_with_capacity(capacity: i64) -> Result<Self, CacheError> {
        let capacity = usize::try_from(capacity).map_err(|_| {
            CacheError::new(
                CacheErrorKind::InvalidCapacity,
                format!("capacity must be >= 0, got {}", capacity),
            )
        })?;
        Ok(Self::new(capacity))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stamp the next insert or access will receive.
    pub fn next_stamp(&self) -> u64 {
        self.next_stamp
    }

    /// Entries from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_
    where
        K: Ord,
    {
        self.usage.iter().filter_map(move |(_, key)| {
            self.entries.get(key).map(|slot| (key, &slot.value))
        })
    }
}

impl<K: Ord + Clone, V: Clone> PersistentLru<K, V> {
    /// Looks up `key` and returns the refreshed cache with the value.
    /// Absent keys leave the cache as it was.
    pub fn get(&self, key: &K) -> Option<(Self, V)> {
        let slot = self.entries.get(key)?;
        let value = slot.value.clone();
        let stamp = self.next_stamp;
        let (usage, _) = self.usage.remove(&slot.stamp);
        let (usage, _) = usage.insert(stamp, key.clone());
        let (entries, _) = self.entries.insert(
            key.clone(),
            Slot {
                value: value.clone(),
                stamp,
            },
        );
        let next = Self {
            capacity: self.capacity,
            entries,
            usage,
            next_stamp: stamp + 1,
        };
        Some((next, value))
    }

    /// Reads a value without touching its recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Recency stamp currently held by `key`.
    pub fn stamp_of(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|slot| slot.stamp)
    }

    /// The entry that the next eviction would remove.
    pub fn lru(&self) -> Option<(&K, &V)> {
        let (_, key) = self.usage.first()?;
        self.entries.get(key).map(|slot| (key, &slot.value))
    }

    pub fn remove(&self, key: &K) -> (Self, Option<V>) {
        let (entries, removed) = self.entries.remove(key);
        let Some(slot) = removed else {
            return (self.clone(), None);
        };
        let (usage, _) = self.usage.remove(&slot.stamp);
        let next = Self {
            capacity: self.capacity,
            entries,
            usage,
            next_stamp: self.next_stamp,
        };
        (next, Some(slot.value))
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq> PersistentLru<K, V> {
    /// Stores `value` under `key` and returns the new cache together with
    /// whatever pair fell out of it.
    ///
    /// A zero-capacity cache keeps nothing and hands the offered pair
    /// straight back. Replacing a key with a different value reports the old
    /// pair; replacing it with an equal value reports nothing.
    pub fn put(&self, key: K, value: V) -> (Self, Option<(K, V)>) {
        if self.capacity == 0 {
            return (self.clone(), Some((key, value)));
        }

        let stamp = self.next_stamp;

        if let Some(old) = self.entries.get(&key) {
            let (usage, _) = self.usage.remove(&old.stamp);
            let (usage, _) = usage.insert(stamp, key.clone());
            let evicted = if old.value != value {
                Some((key.clone(), old.value.clone()))
            } else {
                None
            };
            let (entries, _) = self.entries.insert(key, Slot { value, stamp });
            let next = Self {
                capacity: self.capacity,
                entries,
                usage,
                next_stamp: stamp + 1,
            };
            return (next, evicted);
        }

        let mut entries = self.entries.clone();
        let mut usage = self.usage.clone();
        let mut evicted = None;

        if entries.len() >= self.capacity {
            if let Some((&lru_stamp, lru_key)) = usage.first() {
                let lru_key = lru_key.clone();
                let (without, slot) = entries.remove(&lru_key);
                entries = without;
                usage = usage.remove(&lru_stamp).0;
                if let Some(slot) = slot {
                    log::debug!("evicting lru entry with stamp {}", lru_stamp);
                    evicted = Some((lru_key, slot.value));
                }
            }
        }

        let usage = usage.insert(stamp, key.clone()).0;
        let entries = entries.insert(key, Slot { value, stamp }).0;
        let next = Self {
            capacity: self.capacity,
            entries,
            usage,
            next_stamp: stamp + 1,
        };
        (next, evicted)
    }
}

#[cfg(test)]
impl<K: Ord + Clone + std::fmt::Debug, V: Clone> PersistentLru<K, V> {
    fn assert_invariants(&self) {
        assert_eq!(self.entries.len(), self.usage.len());
        assert!(self.capacity == 0 || self.entries.len() <= self.capacity);
        for (stamp, key) in self.usage.iter() {
            let slot = self
                .entries
                .get(key)
                .unwrap_or_else(|| panic!("usage key {:?} missing from entries", key));
            assert_eq!(slot.stamp, *stamp);
            assert!(*stamp < self.next_stamp);
        }
    }
}
