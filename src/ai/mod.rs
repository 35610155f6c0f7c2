//! AI: behavior interface, update gating and the per-frame manager

pub mod behavior;
pub mod gating;
pub mod manager;
mod registry;
pub mod stats;

pub use behavior::{Behavior, BehaviorError};
pub use gating::{PriorityBand, UpdateBands};
pub use manager::AiManager;
pub use stats::AiPerformanceStats;

use crate::entity::EntityId;

/// Assignment and lifecycle errors from the AI manager
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AiError {
    #[error("AI manager is shut down")]
    Shutdown,
    #[error("Unknown behavior '{0}'")]
    UnknownBehavior(String),
    #[error("Entity {0} no longer exists")]
    EntityExpired(EntityId),
}
