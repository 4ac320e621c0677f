//! Semantic change events fired by the resource store.
//!
//! Object-level changes are observed on the entities themselves; events
//! here are global "something was created" notifications the UI layer
//! subscribes to. Dispatch is synchronous on the caller's thread and
//! observers are weak so a dropped subscriber just stops receiving.

use std::sync::{Mutex, Weak};

/// Event kinds with stable storage ordering. New values are appended at
/// the end, never inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChangeEvent {
    DownloadGalleryCreated = 0,
    CollectionCreated = 1,
    NetGalleryCreated = 2,
    FolderCreated = 3,
}

const EVENT_COUNT: usize = 4;

pub trait ChangeObserver: Send + Sync {
    fn on_notified(&self, event: ChangeEvent);
}

/// Table of event kind → weak observer list.
pub struct ChangeBus {
    slots: [Mutex<Vec<Weak<dyn ChangeObserver>>>; EVENT_COUNT],
}

impl ChangeBus {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new(Vec::new())),
        }
    }

    /// Registers an observer for an event. Duplicate registrations are
    /// skipped.
    pub fn register(&self, event: ChangeEvent, observer: Weak<dyn ChangeObserver>) {
        let mut slot = self.slots[event as usize].lock().unwrap();
        let already = slot.iter().any(|existing| existing.ptr_eq(&observer));
        if !already {
            slot.push(observer);
        }
    }

    /// Invokes `on_notified` on every live observer of the event. Expired
    /// observers are compacted away. Firing the same event recursively
    /// from a handler is not supported.
    pub fn fire(&self, event: ChangeEvent) {
        let live: Vec<_> = {
            let mut slot = self.slots[event as usize].lock().unwrap();
            slot.retain(|observer| observer.strong_count() > 0);
            slot.iter().filter_map(|observer| observer.upgrade()).collect()
        };

        for observer in live {
            observer.on_notified(event);
        }
    }

    pub fn observer_count(&self, event: ChangeEvent) -> usize {
        self.slots[event as usize]
            .lock()
            .unwrap()
            .iter()
            .filter(|observer| observer.strong_count() > 0)
            .count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/events_tests.rs"]
mod tests;
