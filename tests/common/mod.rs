#![allow(dead_code)]

use hammer_engine_core::ai::{Behavior, BehaviorError};
use hammer_engine_core::config::{CoreConfig, ThreadConfig};
use hammer_engine_core::core::clock::ManualClock;
use hammer_engine_core::engine::EngineCore;
use hammer_engine_core::entity::{Entity, EntityId};
use hammer_engine_core::util::vec2::Vec2;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Engine with `workers` threads and a 1ms/frame manual clock, already initialized
pub fn engine(workers: usize, queue_capacity: usize) -> EngineCore {
    let config = CoreConfig {
        thread: ThreadConfig {
            worker_threads: Some(workers),
            queue_capacity,
            ..ThreadConfig::default()
        },
        ..CoreConfig::default()
    };
    let engine = EngineCore::with_clock(config, Arc::new(ManualClock::with_frame_step(1)));
    engine.init().expect("engine init");
    engine
}

/// Poll `condition` until it holds or two seconds pass
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Sets velocity to (1, 0), optionally spinning for `spin` first, and counts
/// dispatches per entity
pub struct Recorder {
    pub name: &'static str,
    pub spin: Duration,
    pub executions: AtomicU64,
    pub per_entity: Mutex<FxHashMap<EntityId, u32>>,
    pub messages: Mutex<Vec<(EntityId, String)>>,
}

impl Recorder {
    pub fn new(name: &'static str) -> Arc<Self> {
        Self::spinning(name, Duration::ZERO)
    }

    pub fn spinning(name: &'static str, spin: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            spin,
            executions: AtomicU64::new(0),
            per_entity: Mutex::new(FxHashMap::default()),
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn dispatches_of(&self, entity: &Entity) -> u32 {
        self.per_entity.lock().get(&entity.id()).copied().unwrap_or(0)
    }

    pub fn reset(&self) {
        self.executions.store(0, Ordering::Relaxed);
        self.per_entity.lock().clear();
    }
}

impl Behavior for Recorder {
    fn execute_logic(&self, entity: &Arc<Entity>) -> Result<(), BehaviorError> {
        if !self.spin.is_zero() {
            let start = Instant::now();
            while start.elapsed() < self.spin {
                std::hint::spin_loop();
            }
        }
        entity.set_velocity(Vec2::new(1.0, 0.0));
        self.executions.fetch_add(1, Ordering::Relaxed);
        *self.per_entity.lock().entry(entity.id()).or_insert(0) += 1;
        Ok(())
    }

    fn on_message(&self, entity: &Arc<Entity>, message: &str) {
        self.messages.lock().push((entity.id(), message.to_string()));
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// `count` entities on a ring of `radius` around the origin
pub fn ring(count: usize, radius: f32) -> Vec<Arc<Entity>> {
    (0..count)
        .map(|i| {
            let angle = i as f32 / count.max(1) as f32 * std::f32::consts::TAU;
            Entity::new(Vec2::new(angle.cos() * radius, angle.sin() * radius))
        })
        .collect()
}
