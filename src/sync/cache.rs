//! In-memory config cache shared by the simulation loop and workers
//!
//! Entries are whole `Arc<SkinConfig>` values; insert, replace and remove
//! are atomic per entry and nothing spans entries.

use crate::model::SkinConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ConfigCache {
    inner: Arc<RwLock<HashMap<Uuid, Arc<SkinConfig>>>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, subject: Uuid) -> Option<Arc<SkinConfig>> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&subject).cloned()
    }

    /// Insert or replace the subject's config, returning the previous one
    pub fn replace(&self, config: SkinConfig) -> Option<Arc<SkinConfig>> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(config.subject(), Arc::new(config))
    }

    pub fn remove(&self, subject: Uuid) -> Option<Arc<SkinConfig>> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(&subject)
    }

    pub fn contains(&self, subject: Uuid) -> bool {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.contains_key(&subject)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
