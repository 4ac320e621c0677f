//! Long-lived background workers.
//!
//! `WorkerQueue` drains a priority queue of jobs strictly one at a time;
//! the database uses one instance so posted closures serialise, and a
//! second instance handles generic non-database work. `ConditionalWorker`
//! re-polls registered predicates and runs the attached job once its
//! predicate turns true, for deferred work waiting on async completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::tasks::{TaskHandle, TaskQueue};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

const IDLE_WAIT: Duration = Duration::from_millis(500);
const CONDITION_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sequential job runner over a priority queue. Jobs run one at a time
/// in priority order and may block for their whole duration.
pub struct WorkerQueue {
    queue: TaskQueue<Job>,
    notify: Notify,
    quitting: AtomicBool,
}

impl WorkerQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: TaskQueue::new(),
            notify: Notify::new(),
            quitting: AtomicBool::new(false),
        })
    }

    /// Spawns the drain loop.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            while !worker.quitting.load(Ordering::Acquire) {
                if worker.queue.is_empty() {
                    let _ = tokio::time::timeout(IDLE_WAIT, worker.notify.notified()).await;
                    continue;
                }

                while let Some((job, handle)) = worker.queue.pop() {
                    if worker.quitting.load(Ordering::Acquire) {
                        return;
                    }
                    // Jobs may block; hop to the blocking pool but await
                    // completion so execution stays sequential.
                    let _ = tokio::task::spawn_blocking(job).await;
                    handle.mark_done();
                }
            }
        })
    }

    /// Posts a job with the current timestamp as priority. The returned
    /// handle can bump the job while it waits.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> Arc<TaskHandle> {
        let handle = self.queue.push(Box::new(job));
        self.notify.notify_waiters();
        handle
    }

    pub fn post_with_priority(
        &self,
        job: impl FnOnce() + Send + 'static,
        priority: i64,
    ) -> Arc<TaskHandle> {
        let handle = self.queue.push_with_priority(Box::new(job), priority);
        self.notify.notify_waiters();
        handle
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn quit(&self) {
        self.quitting.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

type Conditional = (Box<dyn Fn() -> bool + Send>, Job);

/// Runs jobs once their predicate turns true. Predicates are re-polled
/// on an interval; a job runs at most once and is then forgotten.
pub struct ConditionalWorker {
    conditionals: Mutex<Vec<Conditional>>,
    quitting: AtomicBool,
}

impl ConditionalWorker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            conditionals: Mutex::new(Vec::new()),
            quitting: AtomicBool::new(false),
        })
    }

    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            while !worker.quitting.load(Ordering::Acquire) {
                worker.run_ready();
                tokio::time::sleep(CONDITION_POLL_INTERVAL).await;
            }
        })
    }

    pub fn post(
        &self,
        condition: impl Fn() -> bool + Send + 'static,
        job: impl FnOnce() + Send + 'static,
    ) {
        self.conditionals
            .lock()
            .unwrap()
            .push((Box::new(condition), Box::new(job)));
    }

    /// Polls every predicate once and runs the jobs that became ready.
    pub fn run_ready(&self) {
        let ready: Vec<Job> = {
            let mut conditionals = self.conditionals.lock().unwrap();
            let mut still_waiting = Vec::with_capacity(conditionals.len());
            let mut ready = Vec::new();
            for (condition, job) in conditionals.drain(..) {
                if condition() {
                    ready.push(job);
                } else {
                    still_waiting.push((condition, job));
                }
            }
            *conditionals = still_waiting;
            ready
        };

        for job in ready {
            job();
        }
    }

    pub fn waiting(&self) -> usize {
        self.conditionals.lock().unwrap().len()
    }

    pub fn quit(&self) {
        self.quitting.store(true, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "tests/workers_tests.rs"]
mod tests;
