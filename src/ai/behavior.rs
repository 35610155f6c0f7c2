//! Behavior interface consumed by the AI manager
//!
//! A behavior is registered once as a shared template. Entities are assigned
//! by name; templates that return `Some` from [`Behavior::clone_behavior`]
//! get a private instance per entity, all others are shared.
//!
//! `execute_logic` may run on a worker thread and concurrently with other
//! entities, never concurrently for the same entity.

use std::sync::Arc;

use crate::entity::Entity;

/// Error returned from [`Behavior::execute_logic`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum BehaviorError {
    #[error("Behavior failed: {0}")]
    Failed(String),
    #[error("Invalid behavior state: {0}")]
    InvalidState(String),
}

pub trait Behavior: Send + Sync {
    /// Called once when the behavior is attached to `entity`
    fn init(&self, _entity: &Arc<Entity>) {}

    /// Per-frame update; reads the entity's position and writes its velocity/flip
    fn execute_logic(&self, entity: &Arc<Entity>) -> Result<(), BehaviorError>;

    /// Called when the behavior is detached from `entity`
    fn clean(&self, _entity: &Arc<Entity>) {}

    fn on_message(&self, _entity: &Arc<Entity>, _message: &str) {}

    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    /// Run every Nth eligible frame (values below 1 are treated as 1)
    fn update_frequency(&self) -> u32 {
        1
    }

    /// Per-entity instance, or `None` to share this template
    fn clone_behavior(&self) -> Option<Arc<dyn Behavior>> {
        None
    }
}

impl std::fmt::Debug for dyn Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Behavior")
            .field("name", &self.name())
            .field("priority", &self.priority())
            .field("update_frequency", &self.update_frequency())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec2::Vec2;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Seek {
        inits: AtomicU32,
    }

    impl Behavior for Seek {
        fn init(&self, _entity: &Arc<Entity>) {
            self.inits.fetch_add(1, Ordering::Relaxed);
        }

        fn execute_logic(&self, entity: &Arc<Entity>) -> Result<(), BehaviorError> {
            let toward = (Vec2::ZERO - entity.position()).normalize();
            entity.set_velocity(toward);
            entity.set_flip(toward.x < 0.0);
            Ok(())
        }

        fn name(&self) -> &str {
            "Seek"
        }
    }

    #[test]
    fn test_default_capabilities() {
        let seek = Seek {
            inits: AtomicU32::new(0),
        };
        assert_eq!(seek.priority(), 0);
        assert_eq!(seek.update_frequency(), 1);
        assert!(seek.clone_behavior().is_none());

        let entity = Entity::new(Vec2::new(10.0, 0.0));
        seek.init(&entity);
        seek.execute_logic(&entity).unwrap();
        assert_eq!(entity.velocity(), Vec2::new(-1.0, 0.0));
        assert!(entity.flip());
        assert_eq!(seek.inits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_debug_for_trait_object() {
        let behavior: Arc<dyn Behavior> = Arc::new(Seek {
            inits: AtomicU32::new(0),
        });
        let text = format!("{:?}", behavior);
        assert!(text.contains("Seek"));
    }

    #[test]
    fn test_error_display() {
        let err = BehaviorError::Failed("no path".into());
        assert_eq!(err.to_string(), "Behavior failed: no path");
    }
}
