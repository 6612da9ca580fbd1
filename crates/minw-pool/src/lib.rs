//! Fixed-size worker pool
//!
//! All engine concurrency goes through this pool: graph-edge insertion
//! batches, per-SCC rollback selection, and re-execution tasks. Submission
//! is bounded; a saturated queue is surfaced to the caller instead of
//! silently dropping work.

#![warn(missing_docs)]
#![warn(clippy::all)]

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::debug;

/// Default bound on queued-but-unstarted tasks
const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Worker-pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// The submission queue is full; retry or fail the block
    #[error("task queue saturated at {capacity} pending tasks")]
    Saturated {
        /// Queue bound that was hit
        capacity: usize,
    },

    /// The task panicked while executing
    #[error("task panicked")]
    TaskPanicked,

    /// The pool is shutting down and no longer accepts work
    #[error("pool is shut down")]
    ShutDown,
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    available: Condvar,
    shutdown: AtomicBool,
    capacity: usize,
}

struct HandleState<T> {
    slot: Mutex<Option<PoolResult<T>>>,
    done: Condvar,
}

/// Completion handle for one submitted task
pub struct TaskHandle<T> {
    state: Arc<HandleState<T>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes and take its result
    pub fn wait(self) -> PoolResult<T> {
        let mut slot = self.state.slot.lock();
        while slot.is_none() {
            self.state.done.wait(&mut slot);
        }
        slot.take().expect("slot filled")
    }
}

/// A fixed-size pool of worker threads with a bounded task queue
pub struct TaskPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Spawn a pool with `workers` threads and the default queue bound
    pub fn new(workers: usize) -> Self {
        Self::with_capacity(workers, DEFAULT_QUEUE_CAPACITY)
    }

    /// Spawn a pool with an explicit queue bound
    pub fn with_capacity(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            capacity,
        });
        let handles = (0..workers)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("minw-worker-{i}"))
                    .spawn(move || worker_loop(shared))
                    .expect("spawn worker thread")
            })
            .collect();
        debug!(workers, capacity, "task pool started");
        Self {
            shared,
            workers: handles,
        }
    }

    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Submit a task; returns a handle the caller can wait on.
    ///
    /// Fails with `PoolError::Saturated` when the queue bound is hit; the
    /// caller must retry or fail its block explicitly.
    pub fn submit<T, F>(&self, task: F) -> PoolResult<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }
        let state = Arc::new(HandleState {
            slot: Mutex::new(None),
            done: Condvar::new(),
        });
        let task_state = Arc::clone(&state);
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(task))
                .map_err(|_| PoolError::TaskPanicked);
            *task_state.slot.lock() = Some(outcome);
            task_state.done.notify_all();
        });

        {
            let mut queue = self.shared.queue.lock();
            if queue.len() >= self.shared.capacity {
                return Err(PoolError::Saturated {
                    capacity: self.shared.capacity,
                });
            }
            queue.push_back(job);
        }
        self.shared.available.notify_one();
        Ok(TaskHandle { state })
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    break job;
                }
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                shared.available.wait(&mut queue);
            }
        };
        job();
    }
}

/// Wait on a batch of handles, collecting results in submission order
pub fn wait_all<T>(handles: Vec<TaskHandle<T>>) -> PoolResult<Vec<T>> {
    handles.into_iter().map(TaskHandle::wait).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_submit_and_wait() {
        let pool = TaskPool::new(2);
        let handle = pool.submit(|| 40 + 2).unwrap();
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    fn test_wait_all_preserves_order() {
        let pool = TaskPool::new(4);
        let handles: Vec<_> = (0..16u32)
            .map(|i| pool.submit(move || i * 2).unwrap())
            .collect();
        let results = wait_all(handles).unwrap();
        assert_eq!(results, (0..16u32).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_tasks_run_concurrently() {
        let pool = TaskPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                })
                .unwrap()
            })
            .collect();
        wait_all(handles).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_saturation_is_surfaced() {
        let pool = TaskPool::with_capacity(1, 1);
        let gate = Arc::new(AtomicBool::new(false));

        // occupy the single worker
        let g = Arc::clone(&gate);
        let busy = pool
            .submit(move || {
                while !g.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
            .unwrap();

        // fill the queue, then overflow it
        let mut queued = None;
        let mut saturated = false;
        for _ in 0..50 {
            match pool.submit(|| ()) {
                Ok(h) => queued = Some(h),
                Err(PoolError::Saturated { capacity }) => {
                    assert_eq!(capacity, 1);
                    saturated = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(saturated);

        gate.store(true, Ordering::Release);
        busy.wait().unwrap();
        if let Some(h) = queued {
            h.wait().unwrap();
        }
    }

    #[test]
    fn test_panic_is_reported() {
        let pool = TaskPool::new(1);
        let handle = pool.submit(|| panic!("boom")).unwrap();
        assert!(matches!(handle.wait(), Err(PoolError::TaskPanicked)));

        // the worker survives the panic
        let handle = pool.submit(|| 7).unwrap();
        assert_eq!(handle.wait().unwrap(), 7);
    }
}
