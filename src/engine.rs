//! Engine core bundle
//!
//! Owns the thread system, worker budget manager and AI manager and wires
//! them together. Gameplay code holds one `EngineCore` (or clones of its
//! `Arc`s) instead of reaching for process-wide singletons.

use std::sync::Arc;

use crate::ai::AiManager;
use crate::config::CoreConfig;
use crate::core::clock::{Clock, SystemClock};
use crate::core::thread_system::{ThreadSystem, ThreadSystemError};
use crate::core::worker_budget::WorkerBudgetManager;

pub struct EngineCore {
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    thread_system: Arc<ThreadSystem>,
    budget: Arc<WorkerBudgetManager>,
    ai: Arc<AiManager>,
}

impl EngineCore {
    pub fn new(config: CoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Build with an explicit time source (tests use `ManualClock`)
    pub fn with_clock(config: CoreConfig, clock: Arc<dyn Clock>) -> Self {
        let thread_system = Arc::new(ThreadSystem::new(config.thread.clone()));
        let budget = Arc::new(WorkerBudgetManager::new(Some(thread_system.clone())));
        let ai = Arc::new(AiManager::new(
            Some(thread_system.clone()),
            budget.clone(),
            clock.clone(),
            &config.ai,
        ));
        Self {
            config,
            clock,
            thread_system,
            budget,
            ai,
        }
    }

    /// Start the thread system, then the AI manager
    pub fn init(&self) -> Result<(), ThreadSystemError> {
        self.thread_system.init_default()?;
        self.budget.invalidate_cache();
        if !self.ai.init() {
            tracing::warn!("AI manager did not initialize");
        }
        tracing::info!(
            workers = self.thread_system.thread_count(),
            queue_capacity = self.thread_system.queue_capacity(),
            "Engine core initialized"
        );
        Ok(())
    }

    /// Advance one frame
    pub fn update(&self, delta_time: f32) {
        self.clock.advance_frame();
        self.ai.update(delta_time);
    }

    /// Tear down in reverse dependency order: AI first, then workers
    pub fn clean(&self) {
        self.ai.clean();
        self.thread_system.clean();
        tracing::info!(frames = self.clock.frame_number(), "Engine core cleaned");
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn thread_system(&self) -> &Arc<ThreadSystem> {
        &self.thread_system
    }

    pub fn budget(&self) -> &Arc<WorkerBudgetManager> {
        &self.budget
    }

    pub fn ai(&self) -> &Arc<AiManager> {
        &self.ai
    }
}

impl Drop for EngineCore {
    fn drop(&mut self) {
        if !self.ai.is_shutdown() || self.thread_system.is_running() {
            self.clean();
        }
    }
}
