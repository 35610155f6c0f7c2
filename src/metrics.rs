//! Metrics snapshot for the engine core
//!
//! Collected on demand from a running [`EngineCore`] and rendered as
//! Prometheus text or JSON.

use serde::Serialize;

use crate::ai::AiPerformanceStats;
use crate::core::performance::BudgetStatus;
use crate::core::worker_budget::{SystemType, TuningSnapshot, WorkerBudget};
use crate::engine::EngineCore;

/// Thread system counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreadMetrics {
    pub running: bool,
    pub workers: usize,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub queue_pressure: f64,
    pub active_tasks: usize,
    pub tasks_enqueued: u64,
    pub tasks_processed: u64,
    pub tasks_panicked: u64,
}

/// AI manager counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct AiMetrics {
    pub frame: u64,
    pub behaviors: usize,
    pub managed_entities: usize,
    pub assignments: u64,
    pub behavior_updates: u64,
    pub last_frame_candidates: usize,
    pub last_frame_threaded: bool,
    pub budget_status: u8,
    pub budget_usage_percent: f32,
    pub stats: AiPerformanceStats,
}

/// Point-in-time view of the whole core
#[derive(Debug, Clone, Serialize)]
pub struct CoreMetrics {
    pub thread: ThreadMetrics,
    pub budget: WorkerBudget,
    pub tuning: Vec<TuningSnapshot>,
    pub ai: AiMetrics,
}

impl CoreMetrics {
    pub fn collect(engine: &EngineCore) -> Self {
        let ts = engine.thread_system();
        let budget = engine.budget();
        let ai = engine.ai();

        Self {
            thread: ThreadMetrics {
                running: ts.is_running(),
                workers: ts.thread_count(),
                queue_size: ts.queue_size(),
                queue_capacity: ts.queue_capacity(),
                queue_pressure: ts.queue_pressure(),
                active_tasks: ts.active_tasks(),
                tasks_enqueued: ts.total_tasks_enqueued(),
                tasks_processed: ts.total_tasks_processed(),
                tasks_panicked: ts.total_tasks_panicked(),
            },
            budget: budget.get_budget(),
            tuning: SystemType::ALL.iter().map(|&s| budget.snapshot(s)).collect(),
            ai: AiMetrics {
                frame: ai.frame_number(),
                behaviors: ai.behavior_count(),
                managed_entities: ai.managed_entity_count(),
                assignments: ai.total_assignment_count(),
                behavior_updates: ai.behavior_update_count(),
                last_frame_candidates: ai.last_frame_candidates(),
                last_frame_threaded: ai.last_frame_was_threaded(),
                budget_status: ai.frame_budget_status().level(),
                budget_usage_percent: ai.frame_budget_usage_percent(),
                stats: ai.performance_stats(),
            },
        }
    }

    /// Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Thread system
        metric!("hammer_thread_running", "Thread system running (0/1)", "gauge",
            self.thread.running as u8);
        metric!("hammer_thread_workers", "Worker threads", "gauge",
            self.thread.workers);
        metric!("hammer_queue_size", "Tasks waiting in the queue", "gauge",
            self.thread.queue_size);
        metric!("hammer_queue_capacity", "Reserved queue capacity", "gauge",
            self.thread.queue_capacity);
        metric!("hammer_queue_pressure", "Queue size over capacity", "gauge",
            self.thread.queue_pressure);
        metric!("hammer_tasks_active", "Tasks currently executing", "gauge",
            self.thread.active_tasks);
        metric!("hammer_tasks_enqueued_total", "Tasks accepted by the thread system", "counter",
            self.thread.tasks_enqueued);
        metric!("hammer_tasks_processed_total", "Tasks completed by workers", "counter",
            self.thread.tasks_processed);
        metric!("hammer_tasks_panicked_total", "Tasks that panicked", "counter",
            self.thread.tasks_panicked);

        // Worker budget
        metric!("hammer_budget_total_workers", "Workers available to the budget", "gauge",
            self.budget.total_workers);
        metric!("hammer_budget_ai_workers", "Static AI allocation", "gauge",
            self.budget.ai_allocated);
        for tuning in &self.tuning {
            let system = tuning.system.name().to_lowercase();
            metric!(format!("hammer_budget_{}_batch_multiplier", system),
                "Hill-climbed batch multiplier", "gauge", tuning.batch_multiplier);
            metric!(format!("hammer_budget_{}_learned_threshold", system),
                "Learned threading threshold (0 = not learned)", "gauge", tuning.learned_threshold);
            metric!(format!("hammer_budget_{}_threshold_active", system),
                "Multi-threaded mode (0/1)", "gauge", tuning.threshold_active as u8);
        }

        // AI
        metric!("hammer_ai_frame", "AI frames run", "counter",
            self.ai.frame);
        metric!("hammer_ai_behaviors", "Registered behavior templates", "gauge",
            self.ai.behaviors);
        metric!("hammer_ai_managed_entities", "Active managed entities", "gauge",
            self.ai.managed_entities);
        metric!("hammer_ai_assignments_total", "Behavior assignments", "counter",
            self.ai.assignments);
        metric!("hammer_ai_behavior_updates_total", "Behavior executions dispatched", "counter",
            self.ai.behavior_updates);
        metric!("hammer_ai_last_frame_candidates", "Entities updated last frame", "gauge",
            self.ai.last_frame_candidates);
        metric!("hammer_ai_last_frame_threaded", "Last frame dispatched to workers (0/1)", "gauge",
            self.ai.last_frame_threaded as u8);
        metric!("hammer_ai_failures_total", "Behavior executions that failed", "counter",
            self.ai.stats.failures);
        metric!("hammer_ai_update_time_avg_ms", "Average AI dispatch time", "gauge",
            self.ai.stats.average_update_time_ms());
        metric!("hammer_ai_entities_per_second", "AI throughput", "gauge",
            self.ai.stats.entities_per_second);
        metric!("hammer_ai_budget_status", "Frame budget status (0=Excellent, 4=Catastrophic)", "gauge",
            self.ai.budget_status);
        metric!("hammer_ai_budget_usage_percent", "AI share of the frame budget", "gauge",
            self.ai.budget_usage_percent);

        output
    }

    /// Pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn budget_status(&self) -> &'static str {
        match self.ai.budget_status {
            0 => "excellent",
            1 => "good",
            2 => "warning",
            3 => "critical",
            _ => "catastrophic",
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.ai.budget_status >= BudgetStatus::Critical.level()
    }
}
