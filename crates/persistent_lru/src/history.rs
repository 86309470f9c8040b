//! Record of cache versions with a movable head.
//!
//! Cache values share structure, so keeping every version costs only the
//! nodes each operation copied. An optional retention limit bounds how many
//! versions are kept.

use std::collections::VecDeque;

use crate::cache::PersistentLru;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryError {
    pub requested: usize,
    /// Oldest version still retained.
    pub oldest: usize,
    /// Number of versions recorded so far, including dropped ones.
    pub available: usize,
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "version {} does not exist (retained versions {}..{})",
            self.requested, self.oldest, self.available
        )
    }
}

impl std::error::Error for HistoryError {}

/// Version numbers are absolute: dropping old versions never renumbers the
/// retained ones.
#[derive(Debug, Clone)]
pub struct CacheHistory<K, V> {
    versions: VecDeque<PersistentLru<K, V>>,
    oldest: usize,
    head: usize,
    max_versions: Option<usize>,
}

impl<K: Clone, V: Clone> CacheHistory<K, V> {
    pub fn new(initial: PersistentLru<K, V>) -> Self {
        Self {
            versions: VecDeque::from([initial]),
            oldest: 0,
            head: 0,
            max_versions: None,
        }
    }

    /// Keeps at most `max_versions` versions (at least one), dropping the
    /// oldest on commit.
    pub fn with_retention(initial: PersistentLru<K, V>, max_versions: usize) -> Self {
        Self {
            max_versions: Some(max_versions.max(1)),
            ..Self::new(initial)
        }
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn oldest(&self) -> usize {
        self.oldest
    }

    pub fn max_versions(&self) -> Option<usize> {
        self.max_versions
    }

    /// Number of retained versions.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn current(&self) -> &PersistentLru<K, V> {
        &self.versions[self.head - self.oldest]
    }

    pub fn version(&self, version: usize) -> Option<&PersistentLru<K, V>> {
        self.versions.get(version.checked_sub(self.oldest)?)
    }

    pub fn versions(&self) -> impl Iterator<Item = (usize, &PersistentLru<K, V>)> + '_ {
        self.versions
            .iter()
            .enumerate()
            .map(|(offset, cache)| (self.oldest + offset, cache))
    }

    /// Publishes `cache` as the newest version and makes it the head.
    pub fn commit(&mut self, cache: PersistentLru<K, V>) -> usize {
        self.versions.push_back(cache);
        if let Some(max) = self.max_versions {
            while self.versions.len() > max {
                self.versions.pop_front();
                self.oldest += 1;
            }
        }
        self.head = self.oldest + self.versions.len() - 1;
        self.head
    }

    /// Re-publishes an earlier version as a new head. Later versions are kept.
    pub fn checkout(&mut self, version: usize) -> Result<usize, HistoryError> {
        let cache = self.version(version).cloned().ok_or(HistoryError {
            requested: version,
            oldest: self.oldest,
            available: self.oldest + self.versions.len(),
        })?;
        Ok(self.commit(cache))
    }
}
