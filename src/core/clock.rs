//! Time and frame sources consumed by the AI manager

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic millisecond clock plus a frame counter
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock was created
    fn now_ms(&self) -> u64;
    /// Frames completed so far
    fn frame_number(&self) -> u64;
    /// Mark the start of a new frame
    fn advance_frame(&self);
}

/// Wall clock backed by [`Instant`]
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
    frame: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frame: AtomicU64::new(0),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn frame_number(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    fn advance_frame(&self) {
        self.frame.fetch_add(1, Ordering::Relaxed);
    }
}

/// Deterministic clock for tests and replays; time moves only when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
    frame: AtomicU64,
    /// Milliseconds added on every `advance_frame`
    step_ms: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock that advances `step_ms` per frame
    pub fn with_frame_step(step_ms: u64) -> Self {
        Self {
            step_ms,
            ..Self::default()
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }

    fn frame_number(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    fn advance_frame(&self) {
        self.frame.fetch_add(1, Ordering::Relaxed);
        self.advance(self.step_ms);
    }
}
