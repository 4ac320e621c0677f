pub mod priority_queue;
pub mod workers;

pub use priority_queue::{TaskHandle, TaskQueue};
pub use workers::{ConditionalWorker, WorkerQueue};
