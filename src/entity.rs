//! Shared game entity
//!
//! Entities are created by gameplay code and shared as `Arc<Entity>`; the AI
//! manager only keeps `Weak` references. Kinematics are lock-free because
//! behaviors write them every frame from worker threads. Appearance is
//! write-rare and sits behind a lock.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::util::atomic::AtomicVec2;
use crate::util::vec2::Vec2;

pub type EntityId = u64;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Sprite and animation attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Appearance {
    pub width: u32,
    pub height: u32,
    pub texture_id: String,
    pub current_frame: u32,
    pub current_row: u32,
    pub num_frames: u32,
    /// Milliseconds per animation frame
    pub anim_speed: u32,
}

#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    position: AtomicVec2,
    velocity: AtomicVec2,
    acceleration: AtomicVec2,
    flip_horizontal: AtomicBool,
    appearance: RwLock<Appearance>,
}

impl Entity {
    pub fn new(position: Vec2) -> Arc<Self> {
        Self::with_appearance(position, Appearance::default())
    }

    pub fn with_appearance(position: Vec2, appearance: Appearance) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed),
            position: AtomicVec2::new(position),
            velocity: AtomicVec2::new(Vec2::ZERO),
            acceleration: AtomicVec2::new(Vec2::ZERO),
            flip_horizontal: AtomicBool::new(false),
            appearance: RwLock::new(appearance),
        })
    }

    /// Process-unique id
    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.position.load()
    }

    #[inline]
    pub fn set_position(&self, position: Vec2) {
        self.position.store(position);
    }

    #[inline]
    pub fn velocity(&self) -> Vec2 {
        self.velocity.load()
    }

    #[inline]
    pub fn set_velocity(&self, velocity: Vec2) {
        self.velocity.store(velocity);
    }

    #[inline]
    pub fn acceleration(&self) -> Vec2 {
        self.acceleration.load()
    }

    #[inline]
    pub fn set_acceleration(&self, acceleration: Vec2) {
        self.acceleration.store(acceleration);
    }

    /// True when the sprite is mirrored horizontally
    #[inline]
    pub fn flip(&self) -> bool {
        self.flip_horizontal.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_flip(&self, horizontal: bool) {
        self.flip_horizontal.store(horizontal, Ordering::Relaxed);
    }

    /// Copy of the current appearance
    pub fn appearance(&self) -> Appearance {
        self.appearance.read().clone()
    }

    pub fn width(&self) -> u32 {
        self.appearance.read().width
    }

    pub fn height(&self) -> u32 {
        self.appearance.read().height
    }

    pub fn texture_id(&self) -> String {
        self.appearance.read().texture_id.clone()
    }

    /// Mutate appearance under the write lock
    pub fn update_appearance(&self, f: impl FnOnce(&mut Appearance)) {
        f(&mut *self.appearance.write());
    }

    /// Semi-implicit Euler step: velocity from acceleration, then position
    pub fn integrate(&self, dt: f32) {
        let velocity = self.velocity() + self.acceleration() * dt;
        self.set_velocity(velocity);
        self.set_position(self.position() + velocity * dt);
    }
}
