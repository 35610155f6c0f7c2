//! Thread system: owns the worker pool and enforces its lifecycle
//!
//! `Uninitialized -> init() -> Running -> clean() -> Shutdown`. Nothing
//! leaves `Shutdown`; submissions after it are no-ops (fire-and-forget) or
//! fail their handle (result-returning).

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::task_queue::{TaskPriority, TaskQueue};
use super::worker_pool::{PoolStats, TaskError, TaskHandle, WorkerPool};
use crate::config::ThreadConfig;
use crate::constants::thread::SHUTDOWN_POLL_INTERVAL_MS;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ThreadSystemError {
    #[error("Thread system already shut down")]
    AlreadyShutdown,
    #[error("Failed to spawn worker threads: {0}")]
    SpawnFailed(String),
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadSystemState {
    Uninitialized = 0,
    Running = 1,
    Shutdown = 2,
}

impl ThreadSystemState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Shutdown,
            _ => Self::Uninitialized,
        }
    }
}

/// Default worker count: one less than the hardware threads, at least one
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

pub struct ThreadSystem {
    state: AtomicU8,
    pool: RwLock<Option<WorkerPool>>,
    queue: RwLock<Option<Arc<TaskQueue>>>,
    stats: Arc<PoolStats>,
    enqueued: AtomicU64,
    config: ThreadConfig,
}

impl ThreadSystem {
    pub fn new(config: ThreadConfig) -> Self {
        Self {
            state: AtomicU8::new(ThreadSystemState::Uninitialized as u8),
            pool: RwLock::new(None),
            queue: RwLock::new(None),
            stats: Arc::new(PoolStats::default()),
            enqueued: AtomicU64::new(0),
            config,
        }
    }

    /// Thread system with `threads` workers and default settings otherwise
    pub fn with_threads(threads: usize) -> Self {
        Self::new(ThreadConfig {
            worker_threads: Some(threads),
            ..ThreadConfig::default()
        })
    }

    /// Start the worker pool with `queue_capacity` reserved slots.
    ///
    /// Calling this on a running system does nothing; after `clean()` it fails.
    pub fn init(&self, queue_capacity: usize) -> Result<(), ThreadSystemError> {
        let mut pool_slot = self.pool.write();
        match self.state() {
            ThreadSystemState::Shutdown => {
                tracing::error!("ThreadSystem::init called after shutdown");
                return Err(ThreadSystemError::AlreadyShutdown);
            }
            ThreadSystemState::Running => {
                tracing::debug!("ThreadSystem already initialized");
                return Ok(());
            }
            ThreadSystemState::Uninitialized => {}
        }

        let threads = self
            .config
            .worker_threads
            .unwrap_or_else(default_thread_count)
            .max(1);
        let queue = Arc::new(TaskQueue::new(queue_capacity.max(1)));
        let pool = WorkerPool::new(
            threads,
            queue.clone(),
            self.stats.clone(),
            Duration::from_millis(self.config.slow_task_threshold_ms),
        )
        .map_err(|e| ThreadSystemError::SpawnFailed(e.to_string()))?;

        *self.queue.write() = Some(queue);
        *pool_slot = Some(pool);
        self.state
            .store(ThreadSystemState::Running as u8, Ordering::Relaxed);

        tracing::info!(
            threads,
            queue_capacity = queue_capacity.max(1),
            "Thread system initialized"
        );
        Ok(())
    }

    /// Init with the configured queue capacity
    pub fn init_default(&self) -> Result<(), ThreadSystemError> {
        self.init(self.config.queue_capacity)
    }

    /// Drain the queue (bounded by the configured timeout), then stop and
    /// join every worker. Idempotent.
    pub fn clean(&self) {
        if self.state() != ThreadSystemState::Running {
            self.state
                .store(ThreadSystemState::Shutdown as u8, Ordering::Relaxed);
            return;
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.shutdown_timeout_ms);
        while !self.queue_is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(SHUTDOWN_POLL_INTERVAL_MS));
        }
        if !self.queue_is_empty() {
            tracing::warn!(
                pending = self.queue_size(),
                "Thread system drain timed out, dropping queued tasks"
            );
        }

        self.state
            .store(ThreadSystemState::Shutdown as u8, Ordering::Relaxed);
        // Dropping the pool stops the queue and joins the workers
        let pool = self.pool.write().take();
        drop(pool);

        tracing::info!(
            processed = self.total_tasks_processed(),
            "Thread system shut down"
        );
    }

    pub fn state(&self) -> ThreadSystemState {
        ThreadSystemState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ThreadSystemState::Running
    }

    pub fn is_shutdown(&self) -> bool {
        self.state() == ThreadSystemState::Shutdown
    }

    /// Fire-and-forget submission at normal priority; a no-op when not running
    pub fn enqueue_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue_task_with(task, TaskPriority::Normal, None);
    }

    /// Fire-and-forget submission with priority and description.
    ///
    /// Returns whether the task was accepted.
    pub fn enqueue_task_with<F>(
        &self,
        task: F,
        priority: TaskPriority,
        description: Option<String>,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let pool = self.pool.read();
        let Some(pool) = pool.as_ref().filter(|_| self.is_running()) else {
            tracing::debug!("enqueue_task ignored: thread system not running");
            return false;
        };
        let accepted = pool.enqueue(task, priority, description);
        if accepted {
            self.enqueued.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    /// Submit `f` at normal priority and get a handle to its result
    pub fn enqueue_task_with_result<F, R>(&self, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.enqueue_task_with_result_and(f, TaskPriority::Normal, None)
    }

    /// Result-returning submission; the handle fails with
    /// [`TaskError::Shutdown`] when the system is not running
    pub fn enqueue_task_with_result_and<F, R>(
        &self,
        f: F,
        priority: TaskPriority,
        description: Option<String>,
    ) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let pool = self.pool.read();
        let Some(pool) = pool.as_ref().filter(|_| self.is_running()) else {
            tracing::debug!("enqueue_task_with_result rejected: thread system not running");
            return TaskHandle::failed(TaskError::Shutdown);
        };
        let handle = pool.enqueue_with_result(f, priority, description);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        handle
    }

    /// Grow the queue's reserved capacity; false once shut down
    pub fn reserve_queue_capacity(&self, capacity: usize) -> bool {
        if self.is_shutdown() {
            return false;
        }
        match self.queue.read().as_ref() {
            Some(queue) => {
                queue.reserve(capacity);
                true
            }
            None => false,
        }
    }

    /// Worker count, 0 unless running
    pub fn thread_count(&self) -> usize {
        if !self.is_running() {
            return 0;
        }
        self.pool.read().as_ref().map_or(0, WorkerPool::thread_count)
    }

    pub fn queue_size(&self) -> usize {
        self.queue.read().as_ref().map_or(0, |q| q.size())
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.read().as_ref().map_or(0, |q| q.capacity())
    }

    fn queue_is_empty(&self) -> bool {
        self.queue_size() == 0
    }

    /// Queued tasks over reserved capacity; 0 when there is no queue
    pub fn queue_pressure(&self) -> f64 {
        let capacity = self.queue_capacity();
        if capacity == 0 {
            return 0.0;
        }
        self.queue_size() as f64 / capacity as f64
    }

    /// Queue non-empty or tasks still running
    pub fn is_busy(&self) -> bool {
        !self.queue_is_empty() || self.active_tasks() > 0
    }

    pub fn active_tasks(&self) -> usize {
        self.stats.active.load(Ordering::Relaxed)
    }

    pub fn total_tasks_enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn total_tasks_processed(&self) -> u64 {
        self.stats.processed.load(Ordering::Relaxed)
    }

    /// Fire-and-forget tasks that panicked
    pub fn total_tasks_panicked(&self) -> u64 {
        self.stats.panicked.load(Ordering::Relaxed)
    }
}

impl Default for ThreadSystem {
    fn default() -> Self {
        Self::new(ThreadConfig::default())
    }
}

impl Drop for ThreadSystem {
    fn drop(&mut self) {
        if self.is_running() {
            self.clean();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_state_machine() {
        let ts = ThreadSystem::with_threads(2);
        assert_eq!(ts.state(), ThreadSystemState::Uninitialized);
        assert_eq!(ts.thread_count(), 0);

        ts.init(64).unwrap();
        assert!(ts.is_running());
        assert_eq!(ts.thread_count(), 2);
        assert_eq!(ts.queue_capacity(), 64);

        // Second init is a no-op
        assert!(ts.init(128).is_ok());
        assert_eq!(ts.queue_capacity(), 64);

        ts.clean();
        assert!(ts.is_shutdown());
        assert_eq!(ts.thread_count(), 0);
        assert!(matches!(ts.init(64), Err(ThreadSystemError::AlreadyShutdown)));
        assert!(ts.is_shutdown());
    }

    #[test]
    fn test_enqueue_after_clean_is_noop() {
        let ts = ThreadSystem::with_threads(2);
        ts.init(32).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let counter = counter.clone();
            ts.enqueue_task(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        ts.clean();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        let enqueued = ts.total_tasks_enqueued();

        let after = counter.clone();
        ts.enqueue_task(move || {
            after.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(ts.total_tasks_enqueued(), enqueued);
        assert_eq!(
            ts.enqueue_task_with_result(|| 1).wait(),
            Err(TaskError::Shutdown)
        );
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert!(!ts.reserve_queue_capacity(1024));
    }

    #[test]
    fn test_clean_drains_queue() {
        let ts = ThreadSystem::with_threads(2);
        ts.init(128).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            ts.enqueue_task(move || {
                std::thread::sleep(Duration::from_micros(50));
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        ts.clean();
        assert_eq!(counter.load(Ordering::Relaxed), 100);
        assert_eq!(ts.total_tasks_processed(), 100);
    }

    #[test]
    fn test_enqueue_before_init_rejected() {
        let ts = ThreadSystem::with_threads(1);
        assert!(!ts.enqueue_task_with(|| {}, TaskPriority::High, None));
        assert_eq!(
            ts.enqueue_task_with_result(|| ()).wait(),
            Err(TaskError::Shutdown)
        );
        assert_eq!(ts.queue_pressure(), 0.0);
    }

    #[test]
    fn test_results_and_counters() {
        let ts = ThreadSystem::with_threads(4);
        ts.init(64).unwrap();
        let handles: Vec<_> = (0..32u64)
            .map(|i| ts.enqueue_task_with_result(move || i * i))
            .collect();
        let sum: u64 = handles.into_iter().map(|h| h.wait().unwrap()).sum();
        assert_eq!(sum, (0..32u64).map(|i| i * i).sum::<u64>());
        assert_eq!(ts.total_tasks_enqueued(), 32);
        assert!(ts.reserve_queue_capacity(256));
        assert_eq!(ts.queue_capacity(), 256);
        ts.clean();
    }

    #[test]
    fn test_busy_while_task_running() {
        let ts = ThreadSystem::with_threads(1);
        ts.init(8).unwrap();
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        ts.enqueue_task(move || {
            let _ = rx.recv();
        });
        std::thread::sleep(Duration::from_millis(20));
        assert!(ts.is_busy());
        drop(tx);
        ts.clean();
        assert!(!ts.is_busy());
    }

    #[test]
    fn test_default_thread_count_positive() {
        assert!(default_thread_count() >= 1);
    }
}
