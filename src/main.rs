use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hammer_engine_core::ai::{Behavior, BehaviorError};
use hammer_engine_core::config::CoreConfig;
use hammer_engine_core::engine::EngineCore;
use hammer_engine_core::entity::Entity;
use hammer_engine_core::metrics::CoreMetrics;
use hammer_engine_core::util::vec2::Vec2;

const DEMO_ENTITIES: usize = 5_000;
const DEMO_FRAMES: u32 = 300;
const FRAME_DT: f32 = 1.0 / 60.0;
const WORLD_HALF_EXTENT: f32 = 12_000.0;

/// Steers toward the origin and mirrors the sprite when moving left
struct Drift {
    speed: f32,
}

impl Behavior for Drift {
    fn execute_logic(&self, entity: &Arc<Entity>) -> Result<(), BehaviorError> {
        let heading = (Vec2::ZERO - entity.position()).normalize();
        entity.set_velocity(heading * self.speed);
        entity.set_flip(heading.x < 0.0);
        Ok(())
    }

    fn name(&self) -> &str {
        "Drift"
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Hammer engine core demo v{}", env!("CARGO_PKG_VERSION"));

    let config = CoreConfig::global().clone();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: queue_capacity={}, workers={:?}, ai_threading={}",
        config.thread.queue_capacity, config.thread.worker_threads, config.ai.use_threading
    );

    let engine = EngineCore::new(config);
    engine.init()?;

    let ai = engine.ai();
    ai.register_behavior("Drift", Arc::new(Drift { speed: 120.0 }));

    let player = Entity::new(Vec2::ZERO);
    ai.set_player_for_distance_optimization(Some(&player));

    let mut rng = rand::thread_rng();
    let entities: Vec<Arc<Entity>> = (0..DEMO_ENTITIES)
        .map(|_| {
            let position = Vec2::new(
                rng.gen_range(-WORLD_HALF_EXTENT..WORLD_HALF_EXTENT),
                rng.gen_range(-WORLD_HALF_EXTENT..WORLD_HALF_EXTENT),
            );
            let entity = Entity::new(position);
            ai.register_entity_for_updates_with_behavior(&entity, rng.gen_range(0..=9), "Drift");
            entity
        })
        .collect();
    info!("Spawned {} entities", entities.len());

    let frame_budget = Duration::from_secs_f32(FRAME_DT);
    let started = Instant::now();
    for frame in 1..=DEMO_FRAMES {
        let frame_start = Instant::now();
        engine.update(FRAME_DT);
        for entity in &entities {
            entity.integrate(FRAME_DT);
        }

        if frame % 60 == 0 {
            let metrics = CoreMetrics::collect(&engine);
            info!(
                frame,
                candidates = metrics.ai.last_frame_candidates,
                threaded = metrics.ai.last_frame_threaded,
                status = metrics.budget_status(),
                "AI frame summary"
            );
        }

        if let Some(rest) = frame_budget.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let metrics = CoreMetrics::collect(&engine);
    info!(
        "Ran {} frames in {:.2}s, {} behavior updates",
        DEMO_FRAMES,
        started.elapsed().as_secs_f32(),
        metrics.ai.behavior_updates
    );
    println!("{}", metrics.to_json()?);

    engine.clean();
    info!("Shutdown complete");
    Ok(())
}
