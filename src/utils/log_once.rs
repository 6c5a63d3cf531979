//! Suppression of repeated warnings from per-tick and per-send paths

use std::collections::HashSet;
use std::hash::Hash;

/// Remembers which keys have already been logged
#[derive(Debug)]
pub struct LogOnce<K> {
    seen: HashSet<K>,
}

impl<K: Eq + Hash> Default for LogOnce<K> {
    fn default() -> Self {
        Self { seen: HashSet::new() }
    }
}

impl<K: Eq + Hash> LogOnce<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time `key` is seen
    pub fn first(&mut self, key: K) -> bool {
        self.seen.insert(key)
    }

    /// Allow `key` to be logged again
    pub fn reset(&mut self, key: &K) {
        self.seen.remove(key);
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
