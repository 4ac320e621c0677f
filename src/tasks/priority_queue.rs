//! Priority task list shared by the image cache, the downloader and the
//! generic background workers.
//!
//! Priorities can change while a task is queued (a viewer scrolling to an
//! image bumps its pending load), so a strict heap would need reheaping on
//! every bump. Instead `pop` does a bounded bubble pass from the tail and a
//! full sweep every `FULL_SORT_INTERVAL` calls. Exact global ordering is
//! not guaranteed; a bumped task surfaces within `PARTIAL_SORT_WINDOW + 1`
//! pops.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Number of priority-difference steps a single `pop` scans from the tail.
const PARTIAL_SORT_WINDOW: i32 = 15;

/// Every this many pops the scan covers the whole queue.
const FULL_SORT_INTERVAL: u32 = 25;

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Handle to a queued task. Retained by the caller to re-prioritise the
/// task while it waits.
#[derive(Debug)]
pub struct TaskHandle {
    priority: AtomicI64,
    done: AtomicBool,
}

impl TaskHandle {
    fn new(priority: i64) -> Arc<Self> {
        Arc::new(Self {
            priority: AtomicI64::new(priority),
            done: AtomicBool::new(false),
        })
    }

    /// Moves this task to the front of the queue by giving it the current
    /// timestamp as priority.
    pub fn bump(&self) {
        self.set_priority(unix_now());
    }

    pub fn set_priority(&self, priority: i64) {
        self.priority.store(priority, Ordering::Release);
    }

    pub fn priority(&self) -> i64 {
        self.priority.load(Ordering::Acquire)
    }

    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

struct QueueInner<T> {
    queue: Vec<(T, Arc<TaskHandle>)>,
    since_full_sort: u32,
}

/// Mutable FIFO with live re-prioritisation. Same-priority tasks come out
/// in insertion order.
pub struct TaskQueue<T> {
    inner: Mutex<QueueInner<T>>,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                queue: Vec::with_capacity(100),
                since_full_sort: 0,
            }),
        }
    }

    /// Inserts at the tail with the current timestamp as priority.
    pub fn push(&self, payload: T) -> Arc<TaskHandle> {
        self.push_with_priority(payload, unix_now())
    }

    pub fn push_with_priority(&self, payload: T, priority: i64) -> Arc<TaskHandle> {
        let handle = TaskHandle::new(priority);
        let mut inner = self.inner.lock().unwrap();
        inner.queue.push((payload, handle.clone()));
        handle
    }

    /// Removes and returns (approximately) the highest-priority payload.
    pub fn pop(&self) -> Option<(T, Arc<TaskHandle>)> {
        let mut inner = self.inner.lock().unwrap();
        if inner.queue.is_empty() {
            return None;
        }

        inner.since_full_sort += 1;
        let full_look = inner.since_full_sort >= FULL_SORT_INTERVAL;
        if full_look {
            inner.since_full_sort = 0;
        }

        let queue = &mut inner.queue;
        let mut best_idx = queue.len() - 1;
        let mut best_priority = queue[best_idx].1.priority();
        let mut time_looking = PARTIAL_SORT_WINDOW;

        // Bubble higher priorities toward the tail while looking for the
        // best task. `>=` keeps the most headward (oldest) item on ties.
        let mut i = queue.len() - 1;
        while i >= 1 {
            let current = queue[i].1.priority();
            let next = queue[i - 1].1.priority();

            if current < next {
                queue.swap(i, i - 1);
                if next >= best_priority {
                    best_idx = i;
                    best_priority = next;
                }
            } else if current >= best_priority {
                best_idx = i;
                best_priority = current;
            }

            if current != next {
                time_looking -= 1;
            }
            if time_looking < 0 && !full_look {
                break;
            }
            i -= 1;
        }

        let (payload, handle) = queue.remove(best_idx);
        Some((payload, handle))
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.clear();
        inner.since_full_sort = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/priority_queue_tests.rs"]
mod tests;
