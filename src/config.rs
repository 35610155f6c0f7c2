//! Core configuration
//!
//! Defaults come from [`crate::constants`]; every field can be overridden
//! through `HAMMER_*` environment variables. Runtime `configure_*` setters on
//! the subsystems take precedence over whatever was loaded here.

use std::sync::OnceLock;

use crate::constants::{ai, thread};

static CONFIG: OnceLock<CoreConfig> = OnceLock::new();

/// Thread system settings
#[derive(Debug, Clone)]
pub struct ThreadConfig {
    /// Task queue capacity reserved at init
    pub queue_capacity: usize,
    /// Worker thread count; `None` means `max(1, hardware threads - 1)`
    pub worker_threads: Option<usize>,
    /// Tasks slower than this are logged at warn level
    pub slow_task_threshold_ms: u64,
    /// How long `clean()` waits for queued work before dropping it
    pub shutdown_timeout_ms: u64,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            queue_capacity: thread::DEFAULT_QUEUE_CAPACITY,
            worker_threads: None,
            slow_task_threshold_ms: thread::SLOW_TASK_THRESHOLD_MS,
            shutdown_timeout_ms: thread::SHUTDOWN_DRAIN_TIMEOUT_MS,
        }
    }
}

/// AI manager settings
#[derive(Debug, Clone)]
pub struct AiConfig {
    /// Allow batches to be dispatched to the thread system
    pub use_threading: bool,
    /// Cap on workers used per frame; 0 means no cap
    pub max_threads: usize,
    /// Global scale applied to every priority range multiplier
    pub priority_multiplier: f32,
    pub max_update_distance: f32,
    pub medium_update_distance: f32,
    pub min_update_distance: f32,
    /// Frames between cleanup sweeps
    pub cleanup_interval: u64,
    /// Pending assignments applied per frame
    pub assignment_batch_limit: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            use_threading: true,
            max_threads: 0,
            priority_multiplier: 1.0,
            max_update_distance: ai::DEFAULT_MAX_UPDATE_DISTANCE,
            medium_update_distance: ai::DEFAULT_MEDIUM_UPDATE_DISTANCE,
            min_update_distance: ai::DEFAULT_MIN_UPDATE_DISTANCE,
            cleanup_interval: ai::CLEANUP_INTERVAL_FRAMES,
            assignment_batch_limit: ai::ASSIGNMENT_BATCH_LIMIT,
        }
    }
}

/// Full core configuration
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub thread: ThreadConfig,
    pub ai: AiConfig,
}

/// Parse an env var, keeping `current` and warning when the value is bad
fn env_override<T: std::str::FromStr>(name: &str, current: T, accept: impl Fn(&T) -> bool) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(parsed) if accept(&parsed) => parsed,
            Ok(_) => {
                tracing::warn!("{} out of range ('{}'), using default", name, raw);
                current
            }
            Err(_) => {
                tracing::warn!("Invalid {} '{}', using default", name, raw);
                current
            }
        },
        Err(_) => current,
    }
}

impl CoreConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        config.thread.queue_capacity = env_override(
            "HAMMER_QUEUE_CAPACITY",
            config.thread.queue_capacity,
            |v| *v > 0 && *v <= 1 << 20,
        );
        if let Ok(raw) = std::env::var("HAMMER_WORKER_THREADS") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.thread.worker_threads = Some(n),
                _ => tracing::warn!("Invalid HAMMER_WORKER_THREADS '{}', using hardware default", raw),
            }
        }

        config.ai.use_threading =
            env_override("HAMMER_AI_THREADING", config.ai.use_threading, |_| true);
        config.ai.max_threads =
            env_override("HAMMER_AI_MAX_THREADS", config.ai.max_threads, |_| true);
        config.ai.priority_multiplier = env_override(
            "HAMMER_AI_PRIORITY_MULTIPLIER",
            config.ai.priority_multiplier,
            |v| v.is_finite() && *v > 0.0,
        );
        config.ai.max_update_distance = env_override(
            "HAMMER_AI_MAX_UPDATE_DISTANCE",
            config.ai.max_update_distance,
            |v| *v >= 0.0,
        );
        config.ai.medium_update_distance = env_override(
            "HAMMER_AI_MEDIUM_UPDATE_DISTANCE",
            config.ai.medium_update_distance,
            |v| *v >= 0.0,
        );
        config.ai.min_update_distance = env_override(
            "HAMMER_AI_MIN_UPDATE_DISTANCE",
            config.ai.min_update_distance,
            |v| *v >= 0.0,
        );
        config.ai.cleanup_interval = env_override(
            "HAMMER_AI_CLEANUP_INTERVAL",
            config.ai.cleanup_interval,
            |v| *v >= 1 && *v <= 128,
        );

        tracing::info!(
            queue_capacity = config.thread.queue_capacity,
            worker_threads = ?config.thread.worker_threads,
            ai_threading = config.ai.use_threading,
            ai_max_threads = config.ai.max_threads,
            cleanup_interval = config.ai.cleanup_interval,
            "Core configuration loaded"
        );

        config
    }

    /// Get the global configuration (loads from env on first call)
    pub fn global() -> &'static Self {
        CONFIG.get_or_init(Self::load_or_default)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.thread.queue_capacity == 0 {
            return Err("queue_capacity must be at least 1".to_string());
        }
        if self.thread.worker_threads == Some(0) {
            return Err("worker_threads must be at least 1".to_string());
        }
        if self.ai.cleanup_interval == 0 || self.ai.cleanup_interval > 128 {
            return Err("cleanup_interval must be 1-128 frames".to_string());
        }
        if self.ai.assignment_batch_limit == 0 {
            return Err("assignment_batch_limit must be at least 1".to_string());
        }
        if self.ai.max_update_distance < 0.0
            || self.ai.medium_update_distance < 0.0
            || self.ai.min_update_distance < 0.0
        {
            return Err("update distances cannot be negative".to_string());
        }
        if !(self.ai.priority_multiplier.is_finite() && self.ai.priority_multiplier > 0.0) {
            return Err("priority_multiplier must be positive".to_string());
        }
        Ok(())
    }
}
