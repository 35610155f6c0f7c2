//! Frame budget monitoring
//!
//! Tracks how much of the frame budget a subsystem's update consumes over a
//! rolling window and classifies it into a [`BudgetStatus`].

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Budget usage levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BudgetStatus {
    /// Well under budget
    Excellent,
    /// Normal operation
    Good,
    /// Close to the budget
    Warning,
    /// At or just over the budget
    Critical,
    /// Sustained overload
    Catastrophic,
}

impl BudgetStatus {
    /// Numeric level for metrics export (0 = excellent)
    pub fn level(self) -> u8 {
        match self {
            BudgetStatus::Excellent => 0,
            BudgetStatus::Good => 1,
            BudgetStatus::Warning => 2,
            BudgetStatus::Critical => 3,
            BudgetStatus::Catastrophic => 4,
        }
    }

    /// Whether callers should shed optional work
    pub fn is_degraded(self) -> bool {
        matches!(
            self,
            BudgetStatus::Warning | BudgetStatus::Critical | BudgetStatus::Catastrophic
        )
    }
}

/// Rolling monitor of update durations against a frame budget
#[derive(Debug, Clone)]
pub struct FrameBudgetMonitor {
    durations: VecDeque<Duration>,
    max_samples: usize,
    frame_budget: Duration,
    // Thresholds as fractions of the budget
    excellent_threshold: f32,
    warning_threshold: f32,
    critical_threshold: f32,
    catastrophic_threshold: f32,
    status: BudgetStatus,
}

impl FrameBudgetMonitor {
    /// Monitor against a `1 / frame_rate` budget
    pub fn new(frame_rate: u32) -> Self {
        let frame_budget = Duration::from_secs_f32(1.0 / frame_rate.max(1) as f32);
        Self {
            durations: VecDeque::with_capacity(120),
            max_samples: 120,
            frame_budget,
            excellent_threshold: 0.3,
            warning_threshold: 0.7,
            critical_threshold: 0.9,
            catastrophic_threshold: 1.5,
            status: BudgetStatus::Excellent,
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.durations.push_back(duration);
        while self.durations.len() > self.max_samples {
            self.durations.pop_front();
        }
        self.update_status();
    }

    fn update_status(&mut self) {
        // Not enough data yet
        if self.durations.len() < 10 {
            return;
        }

        let ratio = self.budget_ratio();
        self.status = if ratio < self.excellent_threshold {
            BudgetStatus::Excellent
        } else if ratio < self.warning_threshold {
            BudgetStatus::Good
        } else if ratio < self.critical_threshold {
            BudgetStatus::Warning
        } else if ratio < self.catastrophic_threshold {
            BudgetStatus::Critical
        } else {
            BudgetStatus::Catastrophic
        };
    }

    fn budget_ratio(&self) -> f32 {
        self.average().as_secs_f32() / self.frame_budget.as_secs_f32()
    }

    pub fn average(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.durations.iter().sum();
        sum / self.durations.len() as u32
    }

    /// 95th percentile duration in the window
    pub fn p95(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<_> = self.durations.iter().copied().collect();
        sorted.sort_unstable();
        let idx = (sorted.len() as f32 * 0.95) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn status(&self) -> BudgetStatus {
        self.status
    }

    /// Budget usage as percentage (0-100+)
    pub fn budget_usage_percent(&self) -> f32 {
        self.budget_ratio() * 100.0
    }

    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    pub fn sample_count(&self) -> usize {
        self.durations.len()
    }

    pub fn clear(&mut self) {
        self.durations.clear();
        self.status = BudgetStatus::Excellent;
    }
}

impl Default for FrameBudgetMonitor {
    fn default() -> Self {
        Self::new(crate::constants::ai::TARGET_FRAME_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(ms: u64) -> FrameBudgetMonitor {
        let mut monitor = FrameBudgetMonitor::new(60);
        for _ in 0..20 {
            monitor.record(Duration::from_millis(ms));
        }
        monitor
    }

    #[test]
    fn test_new_monitor_is_excellent() {
        let monitor = FrameBudgetMonitor::new(60);
        assert_eq!(monitor.status(), BudgetStatus::Excellent);
        assert_eq!(monitor.average(), Duration::ZERO);
        assert_eq!(monitor.p95(), Duration::ZERO);
    }

    #[test]
    fn test_status_levels() {
        // Budget is ~16.67ms
        assert_eq!(filled(2).status(), BudgetStatus::Excellent);
        assert_eq!(filled(8).status(), BudgetStatus::Good);
        assert_eq!(filled(13).status(), BudgetStatus::Warning);
        assert_eq!(filled(18).status(), BudgetStatus::Critical);
        assert_eq!(filled(30).status(), BudgetStatus::Catastrophic);
        assert!(filled(13).status().is_degraded());
        assert!(!filled(8).status().is_degraded());
    }

    #[test]
    fn test_status_needs_ten_samples() {
        let mut monitor = FrameBudgetMonitor::new(60);
        for _ in 0..9 {
            monitor.record(Duration::from_millis(30));
        }
        assert_eq!(monitor.status(), BudgetStatus::Excellent);
        monitor.record(Duration::from_millis(30));
        assert_eq!(monitor.status(), BudgetStatus::Catastrophic);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut monitor = FrameBudgetMonitor::new(60);
        for _ in 0..500 {
            monitor.record(Duration::from_micros(100));
        }
        assert_eq!(monitor.sample_count(), 120);
        monitor.clear();
        assert_eq!(monitor.sample_count(), 0);
    }

    #[test]
    fn test_p95() {
        let mut monitor = FrameBudgetMonitor::new(60);
        for i in 1..=100 {
            monitor.record(Duration::from_millis(i));
        }
        assert_eq!(monitor.p95(), Duration::from_millis(96));
        assert_eq!(BudgetStatus::Catastrophic.level(), 4);
    }
}
