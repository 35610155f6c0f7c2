//! Adaptive per-subsystem worker budget
//!
//! Each subsystem asks once per frame whether to thread its workload, how
//! many workers to use and how to batch it, then reports the measured
//! outcome. Tuning state is all atomics (relaxed); the only lock guards the
//! cached budget recomputation.
//!
//! Decisions:
//! - Threading: single-threaded below [`MIN_WORKLOAD`]. Until a threshold is
//!   learned, a static per-system cutoff applies (with periodic single-thread
//!   probes so timing can be sampled). Once single-threaded time crosses
//!   [`LEARNING_TIME_THRESHOLD_MS`] the workload at that point becomes the
//!   threshold, and a +/-5% hysteresis band keeps the mode from flapping.
//! - Workers: every worker, unless queue pressure is critical (then one).
//! - Batches: `workers * multiplier`, where the multiplier hill-climbs on
//!   observed multi-threaded throughput.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use super::thread_system::ThreadSystem;
use crate::constants::budget::*;
use crate::util::atomic::{AtomicF32, AtomicF64};

// ============================================================================
// System tags
// ============================================================================

/// Subsystems that share the worker pool, one frame window each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum SystemType {
    Ai = 0,
    Particle = 1,
    Pathfinding = 2,
    Event = 3,
    Collision = 4,
}

impl SystemType {
    pub const COUNT: usize = 5;
    pub const ALL: [SystemType; Self::COUNT] = [
        SystemType::Ai,
        SystemType::Particle,
        SystemType::Pathfinding,
        SystemType::Event,
        SystemType::Collision,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            SystemType::Ai => "AI",
            SystemType::Particle => "Particle",
            SystemType::Pathfinding => "Pathfinding",
            SystemType::Event => "Event",
            SystemType::Collision => "Collision",
        }
    }

    /// Workload at which an untuned system starts threading
    pub fn static_threading_cutoff(self) -> usize {
        match self {
            SystemType::Ai => 200,
            SystemType::Particle => 500,
            SystemType::Pathfinding => 200,
            SystemType::Event => 200,
            SystemType::Collision => 150,
        }
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Budget and decisions
// ============================================================================

/// Result of a threading query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadingDecision {
    pub should_thread: bool,
    /// 1 when this decision is a single-threaded timing probe
    pub probe_phase: u8,
}

impl ThreadingDecision {
    const SINGLE: Self = Self {
        should_thread: false,
        probe_phase: 0,
    };
    const MULTI: Self = Self {
        should_thread: true,
        probe_phase: 0,
    };
    const PROBE: Self = Self {
        should_thread: false,
        probe_phase: 1,
    };
}

/// Worker totals plus the static fallback split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerBudget {
    pub total_workers: usize,
    /// Workers kept for the engine's own frame work
    pub engine_reserved: usize,
    pub ai_allocated: usize,
    pub event_allocated: usize,
    /// Burst buffer left after the fixed allocations
    pub remaining: usize,
}

impl WorkerBudget {
    /// Static split: engine reserve first, then 60% AI / 30% events of the rest
    pub fn from_total(total_workers: usize) -> Self {
        if total_workers <= 1 {
            return Self {
                total_workers,
                engine_reserved: 1,
                ai_allocated: 0,
                event_allocated: 0,
                remaining: 0,
            };
        }

        let engine_reserved = if total_workers <= 4 {
            ENGINE_MIN_WORKERS
        } else {
            ENGINE_OPTIMAL_WORKERS
        };
        let rest = total_workers - engine_reserved;

        let (ai_allocated, event_allocated) = if rest <= 1 {
            (rest, 0)
        } else {
            (
                (rest * AI_WORKER_PERCENTAGE / 100).max(1),
                (rest * EVENT_WORKER_PERCENTAGE / 100).max(1),
            )
        };

        Self {
            total_workers,
            engine_reserved,
            ai_allocated,
            event_allocated,
            remaining: rest.saturating_sub(ai_allocated + event_allocated),
        }
    }

    pub fn has_buffer_capacity(&self) -> bool {
        self.remaining > 0
    }
}

// ============================================================================
// Per-system tuning state
// ============================================================================

#[derive(Debug)]
struct SystemTuningState {
    /// Items per ms, EMA
    single_throughput: AtomicF64,
    multi_throughput: AtomicF64,
    /// Smoothed multi-threaded throughput at the previous hill-climb step
    prev_multi_throughput: AtomicF64,
    batch_multiplier: AtomicF32,
    direction: AtomicI8,
    last_was_threaded: AtomicBool,
    /// 0 until learned
    learned_threshold: AtomicUsize,
    /// Current mode once a threshold exists (true = multi-threaded)
    threshold_active: AtomicBool,
    smoothed_single_time_ms: AtomicF64,
    probe_counter: AtomicU32,
}

impl Default for SystemTuningState {
    fn default() -> Self {
        Self {
            single_throughput: AtomicF64::new(0.0),
            multi_throughput: AtomicF64::new(0.0),
            prev_multi_throughput: AtomicF64::new(0.0),
            batch_multiplier: AtomicF32::new(DEFAULT_MULTIPLIER),
            direction: AtomicI8::new(1),
            last_was_threaded: AtomicBool::new(false),
            learned_threshold: AtomicUsize::new(0),
            threshold_active: AtomicBool::new(false),
            smoothed_single_time_ms: AtomicF64::new(0.0),
            probe_counter: AtomicU32::new(0),
        }
    }
}

impl SystemTuningState {
    fn reset(&self) {
        self.single_throughput.store(0.0);
        self.multi_throughput.store(0.0);
        self.prev_multi_throughput.store(0.0);
        self.batch_multiplier.store(DEFAULT_MULTIPLIER);
        self.direction.store(1, Ordering::Relaxed);
        self.last_was_threaded.store(false, Ordering::Relaxed);
        self.learned_threshold.store(0, Ordering::Relaxed);
        self.threshold_active.store(false, Ordering::Relaxed);
        self.smoothed_single_time_ms.store(0.0);
        self.probe_counter.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of one system's tuning state
#[derive(Debug, Clone, Serialize)]
pub struct TuningSnapshot {
    pub system: SystemType,
    pub single_throughput: f64,
    pub multi_throughput: f64,
    pub batch_multiplier: f32,
    pub learned_threshold: usize,
    pub threshold_active: bool,
    pub last_was_threaded: bool,
    pub smoothed_single_time_ms: f64,
}

/// First sample is taken as-is
#[inline]
fn ema(previous: f64, sample: f64, weight: f64) -> f64 {
    if previous <= 0.0 {
        sample
    } else {
        previous + weight * (sample - previous)
    }
}

/// One hill-climb step; returns the new (multiplier, direction)
fn hill_climb(t_now: f64, t_prev: f64, multiplier: f32, direction: i8) -> (f32, i8) {
    let rel = (t_now - t_prev) / t_prev;
    let direction = if rel < -THROUGHPUT_TOLERANCE {
        -direction
    } else {
        direction
    };
    let multiplier = if rel.abs() > THROUGHPUT_TOLERANCE {
        multiplier + direction as f32 * ADJUST_RATE
    } else {
        multiplier
    };
    (multiplier.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER), direction)
}

// ============================================================================
// Manager
// ============================================================================

pub struct WorkerBudgetManager {
    thread_system: Option<Arc<ThreadSystem>>,
    tuning: [SystemTuningState; SystemType::COUNT],
    cache_valid: AtomicBool,
    cached_total_workers: AtomicUsize,
    cache_lock: Mutex<()>,
}

impl WorkerBudgetManager {
    /// `None` runs without a thread system: budgets assume
    /// [`FALLBACK_WORKERS`] and nothing is ever threaded
    pub fn new(thread_system: Option<Arc<ThreadSystem>>) -> Self {
        Self {
            thread_system,
            tuning: Default::default(),
            cache_valid: AtomicBool::new(false),
            cached_total_workers: AtomicUsize::new(0),
            cache_lock: Mutex::new(()),
        }
    }

    #[inline]
    fn state(&self, system: SystemType) -> &SystemTuningState {
        &self.tuning[system.index()]
    }

    fn running_thread_system(&self) -> Option<&ThreadSystem> {
        self.thread_system
            .as_deref()
            .filter(|ts| ts.is_running())
    }

    /// Cached worker budget, recomputed after [`invalidate_cache`](Self::invalidate_cache)
    pub fn get_budget(&self) -> WorkerBudget {
        if self.cache_valid.load(Ordering::Acquire) {
            return WorkerBudget::from_total(self.cached_total_workers.load(Ordering::Relaxed));
        }

        let _guard = self.cache_lock.lock();
        if !self.cache_valid.load(Ordering::Acquire) {
            let total = match self.running_thread_system() {
                Some(ts) => ts.thread_count().max(1),
                None => FALLBACK_WORKERS,
            };
            self.cached_total_workers.store(total, Ordering::Relaxed);
            self.cache_valid.store(true, Ordering::Release);
            tracing::debug!(total_workers = total, "Worker budget computed");
        }
        WorkerBudget::from_total(self.cached_total_workers.load(Ordering::Relaxed))
    }

    pub fn invalidate_cache(&self) {
        let _guard = self.cache_lock.lock();
        self.cache_valid.store(false, Ordering::Release);
    }

    /// Queued tasks over queue capacity; 0 without a running thread system
    pub fn queue_pressure(&self) -> f64 {
        self.running_thread_system()
            .map_or(0.0, ThreadSystem::queue_pressure)
    }

    /// 0 for no work, 1 under critical queue pressure, otherwise all workers
    pub fn get_optimal_workers(&self, system: SystemType, workload: usize) -> usize {
        if workload == 0 {
            return 0;
        }
        let pressure = self.queue_pressure();
        if pressure > QUEUE_PRESSURE_CRITICAL {
            tracing::debug!(
                system = %system,
                pressure,
                "Queue pressure critical, limiting to one worker"
            );
            return 1;
        }
        self.get_budget().total_workers.max(1)
    }

    /// `(batch_count, batch_size)` covering all `workload` items
    pub fn get_batch_strategy(
        &self,
        system: SystemType,
        workload: usize,
        optimal_workers: usize,
    ) -> (usize, usize) {
        if workload == 0 || optimal_workers == 0 {
            return (1, workload);
        }

        let multiplier = self.state(system).batch_multiplier.load();
        let max_batches = (workload / MIN_ITEMS_PER_BATCH).max(1);
        let mut batch_count =
            ((optimal_workers as f32 * multiplier).round() as usize).clamp(1, max_batches);

        if optimal_workers >= 2 && workload >= MIN_ITEMS_PER_BATCH * 2 {
            batch_count = batch_count.max(2);
        }

        (batch_count, workload.div_ceil(batch_count))
    }

    /// Whether `system` should thread `workload` items this frame
    pub fn should_use_threading(&self, system: SystemType, workload: usize) -> ThreadingDecision {
        let Some(ts) = self.running_thread_system() else {
            return ThreadingDecision::SINGLE;
        };
        if ts.thread_count() <= 1 || workload < MIN_WORKLOAD {
            return ThreadingDecision::SINGLE;
        }

        let state = self.state(system);
        let threshold = state.learned_threshold.load(Ordering::Relaxed);

        if threshold == 0 {
            if workload < system.static_threading_cutoff() {
                return ThreadingDecision::SINGLE;
            }
            let probe = state.probe_counter.fetch_add(1, Ordering::Relaxed) % PROBE_INTERVAL == 0;
            return if probe {
                ThreadingDecision::PROBE
            } else {
                ThreadingDecision::MULTI
            };
        }

        let t = threshold as f64;
        let w = workload as f64;
        let active = state.threshold_active.load(Ordering::Relaxed);
        let next = if active {
            w >= t * (1.0 - HYSTERESIS_BAND)
        } else {
            w >= t * (1.0 + HYSTERESIS_BAND)
        };
        if next != active {
            state.threshold_active.store(next, Ordering::Relaxed);
            tracing::debug!(
                system = %system,
                workload,
                threshold,
                threaded = next,
                "Threading mode switched"
            );
        }

        if next {
            ThreadingDecision::MULTI
        } else {
            ThreadingDecision::SINGLE
        }
    }

    /// Feed back one frame's measured execution
    pub fn report_execution(
        &self,
        system: SystemType,
        workload: usize,
        was_threaded: bool,
        batch_count: usize,
        total_time_ms: f64,
    ) {
        if workload == 0 || !(total_time_ms > 0.0) {
            return;
        }

        let state = self.state(system);
        let throughput = workload as f64 / total_time_ms;

        if was_threaded {
            let smoothed = ema(state.multi_throughput.load(), throughput, THROUGHPUT_SMOOTHING);
            state.multi_throughput.store(smoothed);
            self.climb_batch_multiplier(system, smoothed);
        } else {
            let smoothed = ema(state.single_throughput.load(), throughput, THROUGHPUT_SMOOTHING);
            state.single_throughput.store(smoothed);

            if workload >= MIN_WORKLOAD {
                let time = ema(state.smoothed_single_time_ms.load(), total_time_ms, TIME_SMOOTHING);
                state.smoothed_single_time_ms.store(time);

                if time >= LEARNING_TIME_THRESHOLD_MS
                    && state.learned_threshold.load(Ordering::Relaxed) == 0
                {
                    state.learned_threshold.store(workload, Ordering::Relaxed);
                    state.threshold_active.store(true, Ordering::Relaxed);
                    tracing::info!(
                        system = %system,
                        threshold = workload,
                        smoothed_ms = time,
                        "Learned threading threshold"
                    );
                }
            }
        }

        state.last_was_threaded.store(was_threaded, Ordering::Relaxed);
        tracing::trace!(
            system = %system,
            workload,
            was_threaded,
            batch_count,
            total_time_ms,
            "Execution reported"
        );
    }

    fn climb_batch_multiplier(&self, system: SystemType, t_now: f64) {
        let state = self.state(system);
        let t_prev = state.prev_multi_throughput.load();
        state.prev_multi_throughput.store(t_now);
        if t_prev <= 0.0 {
            return;
        }

        let (multiplier, direction) = hill_climb(
            t_now,
            t_prev,
            state.batch_multiplier.load(),
            state.direction.load(Ordering::Relaxed),
        );
        state.batch_multiplier.store(multiplier);
        state.direction.store(direction, Ordering::Relaxed);
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Smoothed items/ms for the given mode
    pub fn expected_throughput(&self, system: SystemType, threaded: bool) -> f64 {
        let state = self.state(system);
        if threaded {
            state.multi_throughput.load()
        } else {
            state.single_throughput.load()
        }
    }

    pub fn batch_multiplier(&self, system: SystemType) -> f32 {
        self.state(system).batch_multiplier.load()
    }

    /// 0 until a threshold has been learned
    pub fn learned_threshold(&self, system: SystemType) -> usize {
        self.state(system).learned_threshold.load(Ordering::Relaxed)
    }

    pub fn is_threshold_active(&self, system: SystemType) -> bool {
        self.state(system).threshold_active.load(Ordering::Relaxed)
    }

    pub fn last_was_threaded(&self, system: SystemType) -> bool {
        self.state(system).last_was_threaded.load(Ordering::Relaxed)
    }

    pub fn smoothed_single_time_ms(&self, system: SystemType) -> f64 {
        self.state(system).smoothed_single_time_ms.load()
    }

    /// Forget everything learned for `system`
    pub fn reset_tuning(&self, system: SystemType) {
        self.state(system).reset();
        tracing::debug!(system = %system, "Tuning state reset");
    }

    pub fn snapshot(&self, system: SystemType) -> TuningSnapshot {
        let state = self.state(system);
        TuningSnapshot {
            system,
            single_throughput: state.single_throughput.load(),
            multi_throughput: state.multi_throughput.load(),
            batch_multiplier: state.batch_multiplier.load(),
            learned_threshold: state.learned_threshold.load(Ordering::Relaxed),
            threshold_active: state.threshold_active.load(Ordering::Relaxed),
            last_was_threaded: state.last_was_threaded.load(Ordering::Relaxed),
            smoothed_single_time_ms: state.smoothed_single_time_ms.load(),
        }
    }
}

impl Default for WorkerBudgetManager {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::time::Duration;

    fn running(threads: usize, capacity: usize) -> Arc<ThreadSystem> {
        let ts = Arc::new(ThreadSystem::with_threads(threads));
        ts.init(capacity).unwrap();
        ts
    }

    /// Teach `system` a threshold of `workload` via one slow single-threaded frame
    fn learn(manager: &WorkerBudgetManager, system: SystemType, workload: usize) {
        manager.report_execution(system, workload, false, 1, 2.0);
        assert_eq!(manager.learned_threshold(system), workload);
    }

    #[test]
    fn test_optimal_workers_zero_iff_no_work() {
        let manager = WorkerBudgetManager::default();
        for system in SystemType::ALL {
            assert_eq!(manager.get_optimal_workers(system, 0), 0);
            for n in [1, 50, 100, 10_000] {
                assert!(manager.get_optimal_workers(system, n) >= 1);
            }
        }
    }

    #[test]
    fn test_budget_without_thread_system() {
        let manager = WorkerBudgetManager::new(None);
        let budget = manager.get_budget();
        assert_eq!(budget.total_workers, 4);
        assert_eq!(manager.get_optimal_workers(SystemType::Ai, 500), 4);
        assert_eq!(manager.queue_pressure(), 0.0);
        assert!(!manager.should_use_threading(SystemType::Ai, 10_000).should_thread);
    }

    #[test]
    fn test_budget_follows_thread_count_after_invalidate() {
        let ts = Arc::new(ThreadSystem::with_threads(3));
        let manager = WorkerBudgetManager::new(Some(ts.clone()));
        assert_eq!(manager.get_budget().total_workers, 4);

        ts.init(64).unwrap();
        // Still cached
        assert_eq!(manager.get_budget().total_workers, 4);
        manager.invalidate_cache();
        assert_eq!(manager.get_budget().total_workers, 3);
        ts.clean();
    }

    #[test]
    fn test_static_split() {
        let one = WorkerBudget::from_total(1);
        assert_eq!((one.engine_reserved, one.ai_allocated, one.event_allocated), (1, 0, 0));

        let two = WorkerBudget::from_total(2);
        assert_eq!((two.engine_reserved, two.ai_allocated, two.event_allocated), (1, 1, 0));

        let eight = WorkerBudget::from_total(8);
        assert_eq!(eight.engine_reserved, 2);
        assert_eq!(eight.ai_allocated, 3);
        assert_eq!(eight.event_allocated, 1);
        assert_eq!(eight.remaining, 2);
        assert!(eight.has_buffer_capacity());

        for total in 1..64 {
            let b = WorkerBudget::from_total(total);
            if total > 1 {
                assert!(b.engine_reserved + b.ai_allocated + b.event_allocated + b.remaining <= total);
            }
        }
    }

    #[test]
    fn test_batch_strategy_covers_workload() {
        let manager = WorkerBudgetManager::default();
        for (n, w) in [(0, 4), (1, 4), (63, 8), (64, 8), (100, 1), (1000, 3), (10_000, 8), (7, 0)] {
            let (count, size) = manager.get_batch_strategy(SystemType::Ai, n, w);
            assert!(count >= 1);
            assert!(count * size >= n, "n={} w={} -> {}x{}", n, w, count, size);
        }
    }

    #[test]
    fn test_batch_strategy_forces_two_batches() {
        let manager = WorkerBudgetManager::default();
        let (count, size) = manager.get_batch_strategy(SystemType::Event, 64, 2);
        assert_eq!(count, 2);
        assert_eq!(size, 32);
        // Too small to split
        assert_eq!(manager.get_batch_strategy(SystemType::Event, 40, 8), (1, 40));
    }

    #[test]
    fn test_batch_strategy_scales_with_multiplier() {
        let manager = WorkerBudgetManager::default();
        assert_eq!(manager.get_batch_strategy(SystemType::Ai, 10_000, 8).0, 8);
        manager.state(SystemType::Ai).batch_multiplier.store(2.0);
        assert_eq!(manager.get_batch_strategy(SystemType::Ai, 10_000, 8).0, 16);
        manager.state(SystemType::Ai).batch_multiplier.store(0.4);
        assert_eq!(manager.get_batch_strategy(SystemType::Ai, 10_000, 8).0, 3);
    }

    #[test]
    fn test_multiplier_stays_clamped() {
        let manager = WorkerBudgetManager::default();
        let mut rng = rand::thread_rng();
        for _ in 0..5_000 {
            let workload = rng.gen_range(0..20_000);
            let time = rng.gen_range(-1.0..50.0);
            let threaded = rng.gen_bool(0.8);
            manager.report_execution(SystemType::Particle, workload, threaded, 4, time);
            let m = manager.batch_multiplier(SystemType::Particle);
            assert!((MIN_MULTIPLIER..=MAX_MULTIPLIER).contains(&m), "multiplier {}", m);
        }
    }

    #[test]
    fn test_hill_climb_rule() {
        // Improvement keeps direction
        let (m, d) = hill_climb(120.0, 100.0, 1.0, 1);
        assert_eq!(d, 1);
        assert!((m - 1.01).abs() < 1e-6);
        // Regression flips, then steps
        let (m, d) = hill_climb(80.0, 100.0, 1.0, 1);
        assert_eq!(d, -1);
        assert!((m - 0.99).abs() < 1e-6);
        // Noise holds
        assert_eq!(hill_climb(105.0, 100.0, 1.3, -1), (1.3, -1));
        // Clamp
        assert_eq!(hill_climb(200.0, 100.0, MAX_MULTIPLIER, 1).0, MAX_MULTIPLIER);
        assert_eq!(hill_climb(50.0, 100.0, MIN_MULTIPLIER, 1).0, MIN_MULTIPLIER);
    }

    #[test]
    fn test_first_multi_sample_skips_climb() {
        let manager = WorkerBudgetManager::default();
        manager.report_execution(SystemType::Ai, 1000, true, 8, 1.0);
        assert_eq!(manager.batch_multiplier(SystemType::Ai), DEFAULT_MULTIPLIER);
        assert_eq!(manager.expected_throughput(SystemType::Ai, true), 1000.0);
        // Big improvement on the second sample moves it
        manager.report_execution(SystemType::Ai, 1000, true, 8, 0.1);
        assert!(manager.batch_multiplier(SystemType::Ai) > DEFAULT_MULTIPLIER);
    }

    #[test]
    fn test_report_ignores_degenerate_samples() {
        let manager = WorkerBudgetManager::default();
        manager.report_execution(SystemType::Ai, 0, false, 1, 5.0);
        manager.report_execution(SystemType::Ai, 500, false, 1, 0.0);
        manager.report_execution(SystemType::Ai, 500, false, 1, -2.0);
        assert_eq!(manager.expected_throughput(SystemType::Ai, false), 0.0);
        assert_eq!(manager.learned_threshold(SystemType::Ai), 0);
    }

    #[test]
    fn test_threshold_learning() {
        let manager = WorkerBudgetManager::default();
        // Fast frames teach nothing
        for _ in 0..10 {
            manager.report_execution(SystemType::Pathfinding, 300, false, 1, 0.2);
        }
        assert_eq!(manager.learned_threshold(SystemType::Pathfinding), 0);
        // Workloads below MIN_WORKLOAD never feed the timing EMA
        manager.report_execution(SystemType::Pathfinding, 50, false, 1, 100.0);
        assert_eq!(manager.learned_threshold(SystemType::Pathfinding), 0);

        // EMA at 0.25 climbs past 0.9ms after a few slow frames
        let mut frames = 0;
        while manager.learned_threshold(SystemType::Pathfinding) == 0 {
            manager.report_execution(SystemType::Pathfinding, 450, false, 1, 3.0);
            frames += 1;
            assert!(frames < 10);
        }
        assert_eq!(manager.learned_threshold(SystemType::Pathfinding), 450);
        assert!(manager.is_threshold_active(SystemType::Pathfinding));

        // Later slow frames don't relearn
        manager.report_execution(SystemType::Pathfinding, 900, false, 1, 10.0);
        assert_eq!(manager.learned_threshold(SystemType::Pathfinding), 450);
    }

    #[test]
    fn test_should_thread_requires_workers_and_workload() {
        let single = running(1, 64);
        let manager = WorkerBudgetManager::new(Some(single.clone()));
        assert!(!manager.should_use_threading(SystemType::Ai, 10_000).should_thread);
        single.clean();

        let ts = running(4, 64);
        let manager = WorkerBudgetManager::new(Some(ts.clone()));
        assert_eq!(
            manager.should_use_threading(SystemType::Ai, 99),
            ThreadingDecision::default()
        );
        ts.clean();
        assert!(!manager.should_use_threading(SystemType::Ai, 10_000).should_thread);
    }

    #[test]
    fn test_static_cutoff_and_probe() {
        let ts = running(4, 64);
        let manager = WorkerBudgetManager::new(Some(ts.clone()));

        // Below the AI cutoff
        assert!(!manager.should_use_threading(SystemType::Ai, 150).should_thread);
        // Collision has a lower cutoff
        let first = manager.should_use_threading(SystemType::Collision, 150);
        assert_eq!(first, ThreadingDecision { should_thread: false, probe_phase: 1 });
        assert!(manager.should_use_threading(SystemType::Collision, 150).should_thread);

        // The first qualifying AI decision probes, the rest thread until the next probe
        assert_eq!(manager.should_use_threading(SystemType::Ai, 5000).probe_phase, 1);
        for _ in 1..PROBE_INTERVAL {
            assert!(manager.should_use_threading(SystemType::Ai, 5000).should_thread);
        }
        assert_eq!(manager.should_use_threading(SystemType::Ai, 5000).probe_phase, 1);
        ts.clean();
    }

    #[test]
    fn test_hysteresis_holds_multi_mode() {
        let ts = running(4, 64);
        let manager = WorkerBudgetManager::new(Some(ts.clone()));
        learn(&manager, SystemType::Ai, 1000);

        for i in 0..20 {
            let workload = if i % 2 == 0 { 960 } else { 1040 };
            assert!(manager.should_use_threading(SystemType::Ai, workload).should_thread);
        }
        ts.clean();
    }

    #[test]
    fn test_hysteresis_holds_single_mode() {
        let ts = running(4, 64);
        let manager = WorkerBudgetManager::new(Some(ts.clone()));
        learn(&manager, SystemType::Event, 1000);

        // Drop below the band to flip to single
        assert!(!manager.should_use_threading(SystemType::Event, 900).should_thread);
        for i in 0..20 {
            let workload = if i % 2 == 0 { 960 } else { 1040 };
            assert!(!manager.should_use_threading(SystemType::Event, workload).should_thread);
        }
        // Rising past the band flips back
        assert!(manager.should_use_threading(SystemType::Event, 1060).should_thread);
        ts.clean();
    }

    #[test]
    fn test_queue_pressure_limits_workers() {
        let ts = running(2, 20);
        let manager = WorkerBudgetManager::new(Some(ts.clone()));
        assert_eq!(manager.get_optimal_workers(SystemType::Ai, 10_000), 2);

        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        for _ in 0..21 {
            let rx = release_rx.clone();
            ts.enqueue_task(move || {
                let _ = rx.recv();
            });
        }
        // Two tasks are held by the workers, 19 wait in the queue
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ts.queue_size() > 19 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(manager.queue_pressure() > QUEUE_PRESSURE_CRITICAL);
        assert_eq!(manager.get_optimal_workers(SystemType::Ai, 10_000), 1);

        drop(release_tx);
        drop(release_rx);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ts.is_busy() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(manager.get_optimal_workers(SystemType::Ai, 10_000), 2);
        ts.clean();
    }

    #[test]
    fn test_reset_tuning() {
        let manager = WorkerBudgetManager::default();
        learn(&manager, SystemType::Particle, 600);
        manager.state(SystemType::Particle).batch_multiplier.store(1.7);
        manager.reset_tuning(SystemType::Particle);
        let snapshot = manager.snapshot(SystemType::Particle);
        assert_eq!(snapshot.learned_threshold, 0);
        assert!(!snapshot.threshold_active);
        assert_eq!(snapshot.batch_multiplier, DEFAULT_MULTIPLIER);
    }

    #[test]
    fn test_system_names() {
        assert_eq!(SystemType::Ai.to_string(), "AI");
        assert_eq!(SystemType::Collision.name(), "Collision");
        assert_eq!(SystemType::Particle.static_threading_cutoff(), 500);
    }
}
