/// Thread system constants
pub mod thread {
    /// Default task queue capacity reserved at init
    pub const DEFAULT_QUEUE_CAPACITY: usize = 512;
    /// Tasks running longer than this are logged as slow
    pub const SLOW_TASK_THRESHOLD_MS: u64 = 100;
    /// Upper bound on how long `clean()` waits for the queue to drain
    pub const SHUTDOWN_DRAIN_TIMEOUT_MS: u64 = 5_000;
    /// Sleep between drain checks during `clean()`
    pub const SHUTDOWN_POLL_INTERVAL_MS: u64 = 1;
}

/// Worker budget tuning constants
pub mod budget {
    /// Queue pressure above which every subsystem gets one worker
    pub const QUEUE_PRESSURE_CRITICAL: f64 = 0.90;
    /// Workloads below this never thread
    pub const MIN_WORKLOAD: usize = 100;
    /// Lower bound on items per batch when splitting work
    pub const MIN_ITEMS_PER_BATCH: usize = 32;
    /// Worker count assumed when no thread system is attached
    pub const FALLBACK_WORKERS: usize = 4;

    /// EMA weight for throughput samples
    pub const THROUGHPUT_SMOOTHING: f64 = 0.15;
    /// EMA weight for single-threaded time samples
    pub const TIME_SMOOTHING: f64 = 0.25;
    /// Smoothed single-threaded time (ms) at which a threading threshold is learned
    pub const LEARNING_TIME_THRESHOLD_MS: f64 = 0.9;

    /// Hysteresis band around the learned threshold (fraction of T)
    pub const HYSTERESIS_BAND: f64 = 0.05;

    /// Hill-climb: relative throughput change treated as noise
    pub const THROUGHPUT_TOLERANCE: f64 = 0.10;
    /// Hill-climb: multiplier step per adjustment
    pub const ADJUST_RATE: f32 = 0.01;
    pub const MIN_MULTIPLIER: f32 = 0.4;
    pub const MAX_MULTIPLIER: f32 = 2.0;
    pub const DEFAULT_MULTIPLIER: f32 = 1.0;

    /// Before a threshold is learned, every Nth qualifying decision runs
    /// single-threaded to sample timing
    pub const PROBE_INTERVAL: u32 = 64;

    // Static split used as the fallback allocation
    pub const AI_WORKER_PERCENTAGE: usize = 60;
    pub const EVENT_WORKER_PERCENTAGE: usize = 30;
    pub const ENGINE_MIN_WORKERS: usize = 1;
    pub const ENGINE_OPTIMAL_WORKERS: usize = 2;
}

/// AI manager constants
pub mod ai {
    pub const MIN_PRIORITY: u8 = 0;
    pub const MAX_PRIORITY: u8 = 9;
    pub const DEFAULT_PRIORITY: u8 = 5;

    /// Range multiplier step per priority level
    pub const PRIORITY_RANGE_STEP: f32 = 0.1;
    /// Bounds for the global priority multiplier
    pub const MIN_PRIORITY_MULTIPLIER: f32 = 0.1;
    pub const MAX_PRIORITY_MULTIPLIER: f32 = 10.0;

    pub const DEFAULT_MAX_UPDATE_DISTANCE: f32 = 4_000.0;
    pub const DEFAULT_MEDIUM_UPDATE_DISTANCE: f32 = 6_000.0;
    pub const DEFAULT_MIN_UPDATE_DISTANCE: f32 = 10_000.0;

    /// Frames between sweeps of expired/inactive records (must stay <= 128)
    pub const CLEANUP_INTERVAL_FRAMES: u64 = 64;
    /// Pending assignments applied per frame
    pub const ASSIGNMENT_BATCH_LIMIT: usize = 256;

    /// Frame budget the AI update is measured against (Hz)
    pub const TARGET_FRAME_RATE: u32 = 60;
}
