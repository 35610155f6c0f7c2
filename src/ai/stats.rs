use serde::Serialize;

/// Rolling AI update statistics, kept globally and per behavior
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AiPerformanceStats {
    pub total_update_time_ms: f64,
    pub update_count: u64,
    pub entities_processed: u64,
    pub entities_per_second: f64,
    /// Behavior executions that returned an error or panicked
    pub failures: u64,
    /// Updates dispatched to the thread system
    pub threaded_frames: u64,
}

impl AiPerformanceStats {
    pub fn add_sample(&mut self, time_ms: f64, entities: u64) {
        self.total_update_time_ms += time_ms.max(0.0);
        self.update_count += 1;
        self.entities_processed += entities;
        if self.total_update_time_ms > 0.0 {
            self.entities_per_second =
                self.entities_processed as f64 / (self.total_update_time_ms / 1000.0);
        }
    }

    pub fn average_update_time_ms(&self) -> f64 {
        if self.update_count == 0 {
            0.0
        } else {
            self.total_update_time_ms / self.update_count as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sample() {
        let mut stats = AiPerformanceStats::default();
        stats.add_sample(2.0, 100);
        stats.add_sample(3.0, 150);
        assert_eq!(stats.update_count, 2);
        assert_eq!(stats.entities_processed, 250);
        assert!((stats.average_update_time_ms() - 2.5).abs() < 1e-9);
        // 250 entities in 5ms
        assert!((stats.entities_per_second - 50_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_time_keeps_rate() {
        let mut stats = AiPerformanceStats::default();
        stats.add_sample(0.0, 10);
        assert_eq!(stats.entities_per_second, 0.0);
        assert_eq!(stats.average_update_time_ms(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut stats = AiPerformanceStats::default();
        stats.add_sample(1.0, 1);
        stats.failures = 3;
        stats.reset();
        assert_eq!(stats, AiPerformanceStats::default());
    }
}
