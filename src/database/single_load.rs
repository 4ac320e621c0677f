//! Weak-reference identity map for store entities.
//!
//! Guarantees `select_by_id(x)` returns the same `Arc` as long as any
//! caller keeps one alive: a load that finds a live entry returns it,
//! otherwise the freshly constructed entity is registered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::types::models::DbId;

pub struct SingleLoad<T> {
    loaded: Mutex<HashMap<DbId, Weak<T>>>,
}

impl<T> SingleLoad<T> {
    pub fn new() -> Self {
        Self {
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the live entry for `id` or registers the one built by
    /// `make`.
    pub fn resolve(&self, id: DbId, make: impl FnOnce() -> Arc<T>) -> Arc<T> {
        let mut loaded = self.loaded.lock().unwrap();
        if let Some(existing) = loaded.get(&id).and_then(Weak::upgrade) {
            return existing;
        }
        let fresh = make();
        loaded.insert(id, Arc::downgrade(&fresh));
        fresh
    }

    pub fn get_if_loaded(&self, id: DbId) -> Option<Arc<T>> {
        self.loaded.lock().unwrap().get(&id).and_then(Weak::upgrade)
    }

    /// Drops expired entries.
    pub fn purge(&self) {
        self.loaded
            .lock()
            .unwrap()
            .retain(|_, weak| weak.strong_count() > 0);
    }

    /// Removes an entry. Use when permanently deleting a row.
    pub fn remove(&self, id: DbId) {
        self.loaded.lock().unwrap().remove(&id);
    }

    pub fn live_count(&self) -> usize {
        self.loaded
            .lock()
            .unwrap()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl<T> Default for SingleLoad<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/single_load_tests.rs"]
mod tests;
