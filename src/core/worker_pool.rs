//! Fixed-size pool of OS worker threads
//!
//! Each worker loops `pop -> run` on a shared [`TaskQueue`] until the queue
//! is stopped. Panics inside tasks are caught per task so a failing task
//! never takes a worker down.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::task_queue::{Job, TaskPriority, TaskQueue};

/// Why a task's result never arrived
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task panicked: {0}")]
    Panicked(String),
    #[error("Task was dropped before it ran")]
    Cancelled,
    #[error("Thread system is shut down")]
    Shutdown,
    #[error("Timed out waiting for task result")]
    Timeout,
}

/// Counters shared between the pool and its owner; they outlive the pool
#[derive(Debug, Default)]
pub struct PoolStats {
    pub active: AtomicUsize,
    pub processed: AtomicU64,
    pub panicked: AtomicU64,
}

/// Handle to the eventual result of a task submitted with a result channel
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    fn new(rx: Receiver<Result<T, TaskError>>) -> Self {
        Self { rx }
    }

    /// A handle that already holds `error`
    pub(crate) fn failed(error: TaskError) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(Err(error));
        Self { rx }
    }

    /// Block until the task finishes
    pub fn wait(self) -> Result<T, TaskError> {
        self.rx.recv().unwrap_or(Err(TaskError::Cancelled))
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<T, TaskError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TaskError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TaskError::Cancelled),
        }
    }

    /// Non-blocking poll; `None` while the task is still pending
    pub fn try_wait(&self) -> Option<Result<T, TaskError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TaskError::Cancelled)),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Worker pool owning N threads
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    workers: Vec<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Spawn `threads` workers (at least one) draining `queue`
    pub fn new(
        threads: usize,
        queue: Arc<TaskQueue>,
        stats: Arc<PoolStats>,
        slow_task_threshold: Duration,
    ) -> std::io::Result<Self> {
        let threads = threads.max(1);
        let running = Arc::new(AtomicBool::new(true));
        let mut pool = Self {
            queue,
            workers: Vec::with_capacity(threads),
            running,
            stats,
        };

        for index in 0..threads {
            let queue = pool.queue.clone();
            let stats = pool.stats.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("worker-{}", index))
                .spawn(move || worker_loop(index, queue, stats, slow_task_threshold));
            match spawned {
                Ok(handle) => pool.workers.push(handle),
                // Dropping `pool` stops and joins the workers spawned so far
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(threads, "Worker pool started");
        Ok(pool)
    }

    /// Fire-and-forget submission; returns false if the queue is stopped
    pub fn enqueue<F>(&self, task: F, priority: TaskPriority, description: Option<String>) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.push(Job::new(Box::new(task), priority, description))
    }

    /// Submit `f` and get a handle that resolves to its return value, or to
    /// [`TaskError::Panicked`] if it panics
    pub fn enqueue_with_result<F, R>(
        &self,
        f: F,
        priority: TaskPriority,
        description: Option<String>,
    ) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let task = move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| TaskError::Panicked(panic_message(payload.as_ref())));
            // Receiver may have been dropped; nothing to report to
            let _ = tx.send(result);
        };
        if self.enqueue(task, priority, description) {
            TaskHandle::new(rx)
        } else {
            TaskHandle::failed(TaskError::Shutdown)
        }
    }

    /// True while tasks are waiting in the queue
    pub fn busy(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.queue.stop();
        for (index, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() {
                tracing::warn!(worker = index, "Worker thread panicked while joining");
            }
        }
        tracing::debug!("Worker pool stopped");
    }
}

fn worker_loop(index: usize, queue: Arc<TaskQueue>, stats: Arc<PoolStats>, slow: Duration) {
    tracing::trace!(worker = index, "Worker started");

    while let Some(job) = queue.pop() {
        stats.active.fetch_add(1, Ordering::Relaxed);
        let Job {
            task,
            description,
            ..
        } = job;

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(task));
        let elapsed = started.elapsed();

        if let Err(payload) = outcome {
            stats.panicked.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                worker = index,
                task = description.as_deref().unwrap_or("<unnamed>"),
                "Task panicked: {}",
                panic_message(payload.as_ref())
            );
        }
        if elapsed > slow {
            tracing::warn!(
                worker = index,
                task = description.as_deref().unwrap_or("<unnamed>"),
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow task"
            );
        }

        stats.processed.fetch_add(1, Ordering::Relaxed);
        stats.active.fetch_sub(1, Ordering::Relaxed);
    }

    tracing::trace!(worker = index, "Worker exiting");
}
