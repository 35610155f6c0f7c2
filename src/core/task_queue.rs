//! Blocking multi-producer task queue
//!
//! Tasks are held in one FIFO lane per [`TaskPriority`]; `pop` always drains
//! the highest non-empty lane first. Workers park on a condition variable
//! while the queue is empty.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

/// Boxed unit of work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Scheduling priority, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum TaskPriority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
    Idle = 4,
}

impl TaskPriority {
    pub const COUNT: usize = 5;

    #[inline]
    fn lane(self) -> usize {
        self as usize
    }
}

/// A queued task plus the bookkeeping workers log with it
pub struct Job {
    pub task: Task,
    pub priority: TaskPriority,
    pub description: Option<String>,
    pub enqueued_at: Instant,
}

impl Job {
    pub fn new(task: Task, priority: TaskPriority, description: Option<String>) -> Self {
        Self {
            task,
            priority,
            description,
            enqueued_at: Instant::now(),
        }
    }

    pub fn label(&self) -> &str {
        self.description.as_deref().unwrap_or("<unnamed>")
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("priority", &self.priority)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

struct Lanes {
    lanes: [VecDeque<Job>; TaskPriority::COUNT],
}

impl Lanes {
    fn pop_front(&mut self) -> Option<Job> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }

    fn clear(&mut self) -> usize {
        self.lanes
            .iter_mut()
            .map(|lane| {
                let n = lane.len();
                lane.clear();
                n
            })
            .sum()
    }
}

/// Thread-safe task queue with a stopping flag
pub struct TaskQueue {
    inner: Mutex<Lanes>,
    available: Condvar,
    stopping: AtomicBool,
    /// Mirrors the total lane length so `size()` never takes the lock
    len: AtomicUsize,
    capacity: AtomicUsize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let queue = Self {
            inner: Mutex::new(Lanes {
                lanes: Default::default(),
            }),
            available: Condvar::new(),
            stopping: AtomicBool::new(false),
            len: AtomicUsize::new(0),
            capacity: AtomicUsize::new(0),
        };
        queue.reserve(capacity);
        queue
    }

    /// Enqueue a job and wake one waiting worker.
    ///
    /// Returns false (dropping the job) once the queue is stopping.
    pub fn push(&self, job: Job) -> bool {
        {
            let mut inner = self.inner.lock();
            if self.stopping.load(Ordering::Relaxed) {
                return false;
            }
            inner.lanes[job.priority.lane()].push_back(job);
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        self.available.notify_one();
        true
    }

    /// Block until a job is available.
    ///
    /// Returns `None` once the queue is stopping and empty.
    pub fn pop(&self) -> Option<Job> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(job) = inner.pop_front() {
                self.len.fetch_sub(1, Ordering::Relaxed);
                return Some(job);
            }
            if self.stopping.load(Ordering::Relaxed) {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Set the stopping flag, drop every queued job and wake all waiters.
    ///
    /// Returns the number of jobs dropped; only the first call does anything.
    pub fn stop(&self) -> usize {
        let dropped = {
            let mut inner = self.inner.lock();
            if self.stopping.swap(true, Ordering::Relaxed) {
                return 0;
            }
            let dropped = inner.clear();
            self.len.store(0, Ordering::Relaxed);
            dropped
        };
        self.available.notify_all();
        if dropped > 0 {
            tracing::debug!(dropped, "Task queue stopped with pending tasks");
        }
        dropped
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Relaxed)
    }

    /// Pre-allocate room for `n` tasks so steady-state pushes don't reallocate
    pub fn reserve(&self, n: usize) {
        let mut inner = self.inner.lock();
        let normal = &mut inner.lanes[TaskPriority::Normal.lane()];
        normal.reserve(n.saturating_sub(normal.len()));
        self.capacity.fetch_max(n, Ordering::Relaxed);
    }

    /// Reserved capacity; the queue grows past it rather than rejecting work
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
