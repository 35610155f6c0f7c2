//! Priority and distance based update gating
//!
//! An entity's priority widens its update ranges; its distance to the
//! reference point (the player, or the origin without one) picks how often
//! it updates. All comparisons are on squared distances.

use crate::constants::ai::{DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY, PRIORITY_RANGE_STEP};

/// Clamp a caller-supplied priority into `[0, 9]`
#[inline]
pub fn clamp_priority(priority: i32) -> u8 {
    priority.clamp(MIN_PRIORITY as i32, MAX_PRIORITY as i32) as u8
}

/// `(1.0 + 0.1 * p) * global`
#[inline]
pub fn range_multiplier(priority: u8, global_multiplier: f32) -> f32 {
    (1.0 + PRIORITY_RANGE_STEP * priority.min(MAX_PRIORITY) as f32) * global_multiplier
}

/// Coarse classification of a priority value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityBand {
    /// 0-2
    Background,
    /// 3-5
    Standard,
    /// 6-8
    Important,
    /// 9
    Critical,
}

impl PriorityBand {
    pub fn of(priority: u8) -> Self {
        match priority {
            0..=2 => PriorityBand::Background,
            3..=5 => PriorityBand::Standard,
            6..=8 => PriorityBand::Important,
            _ => PriorityBand::Critical,
        }
    }
}

impl Default for PriorityBand {
    fn default() -> Self {
        Self::of(DEFAULT_PRIORITY)
    }
}

/// Base update distances, before priority scaling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateBands {
    /// Inside this: every frame
    pub max_distance: f32,
    /// Inside this: every 2nd frame
    pub medium_distance: f32,
    /// Inside this: every 4th frame; beyond it never
    pub min_distance: f32,
}

impl UpdateBands {
    /// Negative distances clamp to 0
    pub fn new(max_distance: f32, medium_distance: f32, min_distance: f32) -> Self {
        Self {
            max_distance: max_distance.max(0.0),
            medium_distance: medium_distance.max(0.0),
            min_distance: min_distance.max(0.0),
        }
    }

    /// Frame interval for an entity at `distance_sq`, or `None` to skip it
    pub fn interval(&self, distance_sq: f32, priority: u8, global_multiplier: f32) -> Option<u32> {
        let m = range_multiplier(priority, global_multiplier);
        let m_sq = m * m;
        if distance_sq <= self.max_distance * self.max_distance * m_sq {
            Some(1)
        } else if distance_sq <= self.medium_distance * self.medium_distance * m_sq {
            Some(2)
        } else if distance_sq <= self.min_distance * self.min_distance * m_sq {
            Some(4)
        } else {
            None
        }
    }
}

/// Combined stagger gate: the per-entity counter must hit both the
/// behavior's frequency and the distance band's interval
#[inline]
pub fn is_due(counter: u32, frequency: u32, interval: u32) -> bool {
    counter % frequency.max(1) == 0 && counter % interval.max(1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_priority() {
        assert_eq!(clamp_priority(-4), 0);
        assert_eq!(clamp_priority(5), 5);
        assert_eq!(clamp_priority(42), 9);
    }

    #[test]
    fn test_range_multiplier() {
        assert!((range_multiplier(0, 1.0) - 1.0).abs() < 1e-6);
        assert!((range_multiplier(5, 1.0) - 1.5).abs() < 1e-6);
        assert!((range_multiplier(9, 1.0) - 1.9).abs() < 1e-6);
        assert!((range_multiplier(5, 2.0) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_priority_bands() {
        assert_eq!(PriorityBand::of(0), PriorityBand::Background);
        assert_eq!(PriorityBand::of(4), PriorityBand::Standard);
        assert_eq!(PriorityBand::of(8), PriorityBand::Important);
        assert_eq!(PriorityBand::of(9), PriorityBand::Critical);
        assert_eq!(PriorityBand::default(), PriorityBand::Standard);
    }

    #[test]
    fn test_intervals_by_distance() {
        let bands = UpdateBands::new(8_000.0, 10_000.0, 25_000.0);
        // Priority 5 scales every range by 1.5
        let at = |d: f32| bands.interval(d * d, 5, 1.0);
        assert_eq!(at(1_000.0), Some(1));
        assert_eq!(at(11_900.0), Some(1));
        assert_eq!(at(14_000.0), Some(2));
        assert_eq!(at(30_000.0), Some(4));
        assert_eq!(at(100_000.0), None);
    }

    #[test]
    fn test_priority_widens_range() {
        let bands = UpdateBands::new(1_000.0, 2_000.0, 3_000.0);
        let d_sq = 1_500.0f32 * 1_500.0;
        assert_eq!(bands.interval(d_sq, 0, 1.0), Some(2));
        assert_eq!(bands.interval(d_sq, 9, 1.0), Some(1));
    }

    #[test]
    fn test_negative_distances_clamp() {
        let bands = UpdateBands::new(-1.0, -1.0, -1.0);
        assert_eq!(bands.max_distance, 0.0);
        assert_eq!(bands.interval(0.0, 5, 1.0), Some(1));
        assert_eq!(bands.interval(1.0, 5, 1.0), None);
    }

    #[test]
    fn test_is_due() {
        assert!(is_due(7, 1, 1));
        assert!(!is_due(7, 2, 1));
        assert!(is_due(8, 2, 4));
        assert!(!is_due(6, 2, 4));
        // Zero frequency is treated as every frame
        assert!(is_due(3, 0, 1));
    }
}
