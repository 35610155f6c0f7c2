//! AI manager
//!
//! Owns the managed-entity set and runs one [`AiManager::update`] per frame
//! from the game thread. Each frame it applies deferred assignments, delivers
//! queued messages, gates entities by priority and distance, then executes
//! the surviving candidates either inline or in batches on the thread
//! system, as the worker budget decides.
//!
//! Lock discipline: the behavior map and entity store are `RwLock`s read on
//! the hot path; the pending queue, message queue and stats are `Mutex`es.
//! Behavior callbacks (`init`, `clean`, `on_message`) are always invoked
//! after the relevant lock is released.

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use super::behavior::Behavior;
use super::gating::{clamp_priority, is_due, range_multiplier, PriorityBand, UpdateBands};
use super::registry::{EntityStore, MessageTarget, PendingAssignments, QueuedMessage};
use super::stats::AiPerformanceStats;
use super::AiError;
use crate::config::AiConfig;
use crate::constants::ai::{
    DEFAULT_PRIORITY, MAX_PRIORITY_MULTIPLIER, MIN_PRIORITY_MULTIPLIER, TARGET_FRAME_RATE,
};
use crate::core::clock::{Clock, SystemClock};
use crate::core::performance::{BudgetStatus, FrameBudgetMonitor};
use crate::core::task_queue::TaskPriority;
use crate::core::thread_system::ThreadSystem;
use crate::core::worker_budget::{SystemType, WorkerBudgetManager};
use crate::core::worker_pool::{panic_message, TaskError, TaskHandle};
use crate::entity::Entity;
use crate::util::atomic::AtomicF32;
use crate::util::vec2::Vec2;

/// One entity selected for this frame
struct Candidate {
    entity: Arc<Entity>,
    behavior: Arc<dyn Behavior>,
}

#[derive(Default)]
struct StatsState {
    global: AiPerformanceStats,
    per_behavior: HashMap<String, AiPerformanceStats>,
}

/// Run `execute_logic` for every candidate in `slice`; returns the failure count
fn execute_slice(slice: &[Candidate]) -> usize {
    let mut failures = 0;
    for candidate in slice {
        let result = catch_unwind(AssertUnwindSafe(|| {
            candidate.behavior.execute_logic(&candidate.entity)
        }));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                tracing::warn!(
                    entity = candidate.entity.id(),
                    behavior = candidate.behavior.name(),
                    error = %e,
                    "Behavior execution failed"
                );
            }
            Err(payload) => {
                failures += 1;
                tracing::error!(
                    entity = candidate.entity.id(),
                    behavior = candidate.behavior.name(),
                    panic = %panic_message(&*payload),
                    "Behavior panicked"
                );
            }
        }
    }
    failures
}

pub struct AiManager {
    thread_system: Option<Arc<ThreadSystem>>,
    budget: Arc<WorkerBudgetManager>,
    clock: Arc<dyn Clock>,

    behaviors: RwLock<HashMap<String, Arc<dyn Behavior>>>,
    entities: RwLock<EntityStore>,
    pending: Mutex<PendingAssignments>,
    messages: Mutex<Vec<QueuedMessage>>,
    player: RwLock<Option<Weak<Entity>>>,

    stats: Mutex<StatsState>,
    frame_monitor: Mutex<FrameBudgetMonitor>,

    initialized: AtomicBool,
    shutdown: AtomicBool,
    paused: AtomicBool,

    use_threading: AtomicBool,
    max_threads: AtomicUsize,
    priority_multiplier: AtomicF32,
    max_update_distance: AtomicF32,
    medium_update_distance: AtomicF32,
    min_update_distance: AtomicF32,
    cleanup_interval: AtomicU64,
    assignment_batch_limit: AtomicUsize,

    frame: AtomicU64,
    assignment_count: AtomicU64,
    behavior_update_count: AtomicU64,
    last_frame_threaded: AtomicBool,
    last_frame_candidates: AtomicUsize,
}

impl AiManager {
    pub fn new(
        thread_system: Option<Arc<ThreadSystem>>,
        budget: Arc<WorkerBudgetManager>,
        clock: Arc<dyn Clock>,
        config: &AiConfig,
    ) -> Self {
        let bands = UpdateBands::new(
            config.max_update_distance,
            config.medium_update_distance,
            config.min_update_distance,
        );
        Self {
            thread_system,
            budget,
            clock,
            behaviors: RwLock::new(HashMap::new()),
            entities: RwLock::new(EntityStore::default()),
            pending: Mutex::new(PendingAssignments::default()),
            messages: Mutex::new(Vec::new()),
            player: RwLock::new(None),
            stats: Mutex::new(StatsState::default()),
            frame_monitor: Mutex::new(FrameBudgetMonitor::new(TARGET_FRAME_RATE)),
            initialized: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            use_threading: AtomicBool::new(config.use_threading),
            max_threads: AtomicUsize::new(config.max_threads),
            priority_multiplier: AtomicF32::new(sanitize_multiplier(config.priority_multiplier)),
            max_update_distance: AtomicF32::new(bands.max_distance),
            medium_update_distance: AtomicF32::new(bands.medium_distance),
            min_update_distance: AtomicF32::new(bands.min_distance),
            cleanup_interval: AtomicU64::new(config.cleanup_interval.max(1)),
            assignment_batch_limit: AtomicUsize::new(config.assignment_batch_limit.max(1)),
            frame: AtomicU64::new(0),
            assignment_count: AtomicU64::new(0),
            behavior_update_count: AtomicU64::new(0),
            last_frame_threaded: AtomicBool::new(false),
            last_frame_candidates: AtomicUsize::new(0),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Returns false once the manager has been cleaned
    pub fn init(&self) -> bool {
        if self.is_shutdown() {
            tracing::warn!("AI manager init after clean ignored");
            return false;
        }
        if self.initialized.swap(true, Ordering::AcqRel) {
            return true;
        }
        self.budget.invalidate_cache();
        tracing::info!(
            threading = self.use_threading.load(Ordering::Relaxed),
            thread_system = self.thread_system.is_some(),
            "AI manager initialized"
        );
        true
    }

    /// Detach every behavior and drop all state; the manager stays shut down
    pub fn clean(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let detached = self.detach_all();
        self.behaviors.write().clear();
        self.pending.lock().clear();
        self.messages.lock().clear();
        *self.player.write() = None;
        self.initialized.store(false, Ordering::Release);
        tracing::info!(
            entities = detached,
            updates = self.behavior_update_count(),
            "AI manager cleaned"
        );
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    // ========================================================================
    // Behavior templates
    // ========================================================================

    /// Register a template under `name`; last write wins
    pub fn register_behavior(&self, name: impl Into<String>, behavior: Arc<dyn Behavior>) {
        let name = name.into();
        if self.is_shutdown() {
            tracing::debug!(behavior = %name, "Behavior registration after clean ignored");
            return;
        }
        if self.behaviors.write().insert(name.clone(), behavior).is_some() {
            tracing::debug!(behavior = %name, "Behavior template replaced");
        } else {
            tracing::debug!(behavior = %name, "Behavior template registered");
        }
    }

    pub fn has_behavior(&self, name: &str) -> bool {
        self.behaviors.read().contains_key(name)
    }

    pub fn get_behavior(&self, name: &str) -> Option<Arc<dyn Behavior>> {
        self.behaviors.read().get(name).cloned()
    }

    pub fn behavior_count(&self) -> usize {
        self.behaviors.read().len()
    }

    // ========================================================================
    // Entity registration and assignment
    // ========================================================================

    /// Add `entity` to the managed set or update its priority (clamped to 0-9)
    pub fn register_entity_for_updates(&self, entity: &Arc<Entity>, priority: i32) {
        if self.is_shutdown() {
            tracing::debug!(entity = entity.id(), "Entity registration after clean ignored");
            return;
        }
        let priority = clamp_priority(priority);
        let now = self.clock.now_ms();
        let mut store = self.entities.write();
        let existed = store.get(entity.id()).is_some();
        let record = store.upsert(entity, priority, now);
        record.priority = priority;
        record.active = true;
        drop(store);

        if !existed {
            tracing::trace!(
                entity = entity.id(),
                priority,
                band = ?PriorityBand::of(priority),
                "Entity registered for updates"
            );
        }
    }

    /// Register and queue `behavior_name` for the next frame boundary
    pub fn register_entity_for_updates_with_behavior(
        &self,
        entity: &Arc<Entity>,
        priority: i32,
        behavior_name: &str,
    ) {
        if self.is_shutdown() {
            tracing::debug!(entity = entity.id(), "Entity registration after clean ignored");
            return;
        }
        self.register_entity_for_updates(entity, priority);
        self.queue_behavior_assignment(entity, behavior_name);
    }

    /// Remove `entity` immediately, cleaning its behavior
    pub fn unregister_entity_from_updates(&self, entity: &Arc<Entity>) {
        self.pending.lock().remove(entity.id());
        let removed = self.entities.write().remove(entity.id());
        if let Some(behavior) = removed.and_then(|record| record.behavior) {
            behavior.clean(entity);
        }
    }

    /// Attach `behavior_name` now. Unknown entities are registered with the
    /// default priority; a previous behavior is cleaned first.
    pub fn assign_behavior_to_entity(
        &self,
        entity: &Arc<Entity>,
        behavior_name: &str,
    ) -> Result<(), AiError> {
        if self.is_shutdown() {
            return Err(AiError::Shutdown);
        }
        let Some(template) = self.get_behavior(behavior_name) else {
            tracing::error!(behavior = behavior_name, entity = entity.id(), "Unknown behavior");
            return Err(AiError::UnknownBehavior(behavior_name.to_string()));
        };
        let instance = template.clone_behavior().unwrap_or(template);

        let now = self.clock.now_ms();
        let previous = {
            let mut store = self.entities.write();
            let record = store.upsert(entity, DEFAULT_PRIORITY, now);
            record.active = true;
            record.behavior_name = Some(behavior_name.to_string());
            record.behavior.replace(Arc::clone(&instance))
        };

        if let Some(previous) = previous {
            previous.clean(entity);
        }
        instance.init(entity);
        self.assignment_count.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(entity = entity.id(), behavior = behavior_name, "Behavior assigned");
        Ok(())
    }

    /// Detach the entity's behavior; the record is dropped on the next sweep
    pub fn unassign_behavior_from_entity(&self, entity: &Arc<Entity>) {
        if self.is_shutdown() {
            return;
        }
        let previous = {
            let mut store = self.entities.write();
            store.get_mut(entity.id()).and_then(|record| {
                record.active = false;
                record.behavior_name = None;
                record.behavior.take()
            })
        };
        if let Some(previous) = previous {
            previous.clean(entity);
            tracing::trace!(entity = entity.id(), "Behavior unassigned");
        }
    }

    /// Defer an assignment to the next frame boundary; one entry per entity
    pub fn queue_behavior_assignment(&self, entity: &Arc<Entity>, behavior_name: &str) {
        if self.is_shutdown() {
            return;
        }
        self.pending.lock().push(entity, behavior_name);
    }

    /// Apply every queued assignment; returns how many entries were processed
    pub fn process_pending_behavior_assignments(&self) -> usize {
        self.apply_pending(usize::MAX)
    }

    fn apply_pending(&self, limit: usize) -> usize {
        let batch = self.pending.lock().take(limit);
        let processed = batch.len();
        for pending in batch {
            let result = match pending.entity.upgrade() {
                Some(entity) => self.assign_behavior_to_entity(&entity, &pending.behavior_name),
                None => Err(AiError::EntityExpired(pending.id)),
            };
            if let Err(e) = result {
                tracing::debug!(entity = pending.id, error = %e, "Pending assignment skipped");
            }
        }
        processed
    }

    pub fn entity_has_behavior(&self, entity: &Entity) -> bool {
        self.entities
            .read()
            .get(entity.id())
            .is_some_and(|record| record.behavior.is_some())
    }

    /// Name the entity's current behavior was assigned under
    pub fn entity_behavior_name(&self, entity: &Entity) -> Option<String> {
        self.entities
            .read()
            .get(entity.id())
            .and_then(|record| record.behavior_name.clone())
    }

    pub fn entity_priority(&self, entity: &Entity) -> Option<u8> {
        self.entities.read().get(entity.id()).map(|record| record.priority)
    }

    /// Frame of the entity's last dispatch, 0 if never
    pub fn entity_last_update_frame(&self, entity: &Entity) -> Option<u64> {
        self.entities
            .read()
            .get(entity.id())
            .map(|record| record.last_update_frame.load(Ordering::Relaxed))
    }

    /// Milliseconds since the entity was first registered
    pub fn entity_age_ms(&self, entity: &Entity) -> Option<u64> {
        let now = self.clock.now_ms();
        self.entities
            .read()
            .get(entity.id())
            .map(|record| now.saturating_sub(record.registered_at_ms))
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Deliver now, or on the next [`process_message_queue`](Self::process_message_queue)
    pub fn send_message_to_entity(&self, entity: &Arc<Entity>, message: &str, immediate: bool) {
        if self.is_shutdown() {
            tracing::debug!(entity = entity.id(), "Message after clean dropped");
            return;
        }
        if immediate {
            let behavior = self
                .entities
                .read()
                .get(entity.id())
                .and_then(|record| record.behavior.clone());
            if let Some(behavior) = behavior {
                behavior.on_message(entity, message);
            }
            return;
        }
        self.messages.lock().push(QueuedMessage {
            target: MessageTarget::Entity {
                id: entity.id(),
                entity: Arc::downgrade(entity),
            },
            message: message.to_string(),
            timestamp_ms: self.clock.now_ms(),
        });
    }

    pub fn broadcast_message(&self, message: &str, immediate: bool) {
        if self.is_shutdown() {
            tracing::debug!("Broadcast after clean dropped");
            return;
        }
        if immediate {
            for (entity, behavior) in self.live_behaviors() {
                behavior.on_message(&entity, message);
            }
            return;
        }
        self.messages.lock().push(QueuedMessage {
            target: MessageTarget::Broadcast,
            message: message.to_string(),
            timestamp_ms: self.clock.now_ms(),
        });
    }

    /// Deliver every queued message; returns how many were drained
    pub fn process_message_queue(&self) -> usize {
        let queued = std::mem::take(&mut *self.messages.lock());
        if queued.is_empty() {
            return 0;
        }

        let mut deliveries: Vec<(Arc<Entity>, Arc<dyn Behavior>, &str)> = Vec::new();
        let mut broadcast_targets: Option<Vec<(Arc<Entity>, Arc<dyn Behavior>)>> = None;
        {
            let store = self.entities.read();
            for queued_message in &queued {
                match &queued_message.target {
                    MessageTarget::Entity { id, entity } => {
                        let Some(entity) = entity.upgrade() else {
                            continue;
                        };
                        if let Some(behavior) = store.get(*id).and_then(|r| r.behavior.clone()) {
                            deliveries.push((entity, behavior, &queued_message.message));
                        }
                    }
                    MessageTarget::Broadcast => {
                        let targets = broadcast_targets.get_or_insert_with(|| {
                            store
                                .iter()
                                .filter_map(|r| Some((r.entity.upgrade()?, r.behavior.clone()?)))
                                .collect()
                        });
                        for (entity, behavior) in targets.iter() {
                            deliveries.push((
                                Arc::clone(entity),
                                Arc::clone(behavior),
                                &queued_message.message,
                            ));
                        }
                    }
                }
            }
        }

        for (entity, behavior, message) in &deliveries {
            behavior.on_message(entity, message);
        }
        tracing::trace!(
            messages = queued.len(),
            deliveries = deliveries.len(),
            oldest_ms = queued.first().map(|m| m.timestamp_ms),
            "Message queue processed"
        );
        queued.len()
    }

    fn live_behaviors(&self) -> Vec<(Arc<Entity>, Arc<dyn Behavior>)> {
        self.entities
            .read()
            .iter()
            .filter_map(|r| Some((r.entity.upgrade()?, r.behavior.clone()?)))
            .collect()
    }

    // ========================================================================
    // Player reference
    // ========================================================================

    /// Distance gating measures from this entity; `None` measures from the origin
    pub fn set_player_for_distance_optimization(&self, player: Option<&Arc<Entity>>) {
        *self.player.write() = player.map(Arc::downgrade);
    }

    /// Player position, or the origin without a live player
    pub fn player_position(&self) -> Vec2 {
        self.player
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .map_or(Vec2::ZERO, |player| player.position())
    }

    pub fn is_player_valid(&self) -> bool {
        self.player
            .read()
            .as_ref()
            .is_some_and(|player| player.strong_count() > 0)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn set_global_pause(&self, paused: bool) {
        if self.paused.swap(paused, Ordering::AcqRel) != paused {
            tracing::info!(paused, "AI global pause changed");
        }
    }

    pub fn is_globally_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// `max_threads` of 0 means no cap
    pub fn configure_threading(&self, use_threading: bool, max_threads: usize) {
        self.use_threading.store(use_threading, Ordering::Relaxed);
        self.max_threads.store(max_threads, Ordering::Relaxed);
        tracing::info!(use_threading, max_threads, "AI threading configured");
    }

    /// Non-finite values reset to 1.0
    pub fn configure_priority_multiplier(&self, multiplier: f32) {
        let multiplier = sanitize_multiplier(multiplier);
        self.priority_multiplier.store(multiplier);
        tracing::debug!(multiplier, "AI priority multiplier configured");
    }

    /// Negative distances clamp to 0
    pub fn configure_update_distances(&self, max: f32, medium: f32, min: f32) {
        let bands = UpdateBands::new(max, medium, min);
        self.max_update_distance.store(bands.max_distance);
        self.medium_update_distance.store(bands.medium_distance);
        self.min_update_distance.store(bands.min_distance);
        tracing::debug!(
            max = bands.max_distance,
            medium = bands.medium_distance,
            min = bands.min_distance,
            "AI update distances configured"
        );
    }

    pub fn update_bands(&self) -> UpdateBands {
        UpdateBands {
            max_distance: self.max_update_distance.load(),
            medium_distance: self.medium_update_distance.load(),
            min_distance: self.min_update_distance.load(),
        }
    }

    /// Effective range multiplier for `priority` under the current global multiplier
    pub fn update_range_multiplier(&self, priority: i32) -> f32 {
        range_multiplier(clamp_priority(priority), self.priority_multiplier.load())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Active records in the managed set
    pub fn managed_entity_count(&self) -> usize {
        self.entities.read().iter().filter(|r| r.active).count()
    }

    pub fn total_assignment_count(&self) -> u64 {
        self.assignment_count.load(Ordering::Relaxed)
    }

    /// `execute_logic` calls dispatched so far
    pub fn behavior_update_count(&self) -> u64 {
        self.behavior_update_count.load(Ordering::Relaxed)
    }

    pub fn pending_assignment_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn performance_stats(&self) -> AiPerformanceStats {
        self.stats.lock().global.clone()
    }

    pub fn behavior_stats(&self, name: &str) -> Option<AiPerformanceStats> {
        self.stats.lock().per_behavior.get(name).cloned()
    }

    pub fn last_frame_was_threaded(&self) -> bool {
        self.last_frame_threaded.load(Ordering::Relaxed)
    }

    pub fn last_frame_candidates(&self) -> usize {
        self.last_frame_candidates.load(Ordering::Relaxed)
    }

    pub fn frame_budget_status(&self) -> BudgetStatus {
        self.frame_monitor.lock().status()
    }

    pub fn frame_budget_usage_percent(&self) -> f32 {
        self.frame_monitor.lock().budget_usage_percent()
    }

    pub fn frame_number(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Bulk resets
    // ========================================================================

    /// Clean and drop every entity, template, queued item and statistic
    pub fn reset_behaviors(&self) {
        let detached = self.detach_all();
        self.behaviors.write().clear();
        self.pending.lock().clear();
        self.messages.lock().clear();
        self.reset_stats();
        tracing::info!(entities = detached, "AI behaviors reset");
    }

    /// Drop all per-level state while keeping behavior templates registered
    pub fn prepare_for_state_transition(&self) {
        let was_paused = self.paused.swap(true, Ordering::AcqRel);
        self.pending.lock().clear();
        self.messages.lock().clear();
        let detached = self.detach_all();
        *self.player.write() = None;
        self.reset_stats();
        self.budget.invalidate_cache();
        self.paused.store(false, Ordering::Release);
        tracing::info!(entities = detached, was_paused, "AI prepared for state transition");
    }

    /// Empty the entity store, cleaning behaviors on live entities
    fn detach_all(&self) -> usize {
        let records = self.entities.write().drain();
        let count = records.len();
        for record in records {
            if let (Some(behavior), Some(entity)) = (record.behavior, record.entity.upgrade()) {
                behavior.clean(&entity);
            }
        }
        count
    }

    fn reset_stats(&self) {
        let mut stats = self.stats.lock();
        stats.global.reset();
        stats.per_behavior.clear();
        drop(stats);
        self.frame_monitor.lock().clear();
    }

    // ========================================================================
    // Per-frame update
    // ========================================================================

    /// Run one AI frame. No-op before `init`, after `clean` or while paused.
    pub fn update(&self, delta_time: f32) {
        if !self.is_initialized() || self.is_shutdown() || self.is_globally_paused() {
            return;
        }
        let frame_start = Instant::now();
        let frame = self.frame.fetch_add(1, Ordering::Relaxed) + 1;

        if frame % self.cleanup_interval.load(Ordering::Relaxed).max(1) == 0 {
            self.sweep();
        }
        self.apply_pending(self.assignment_batch_limit.load(Ordering::Relaxed));
        self.process_message_queue();

        let candidates: Arc<[Candidate]> = self.collect_candidates(frame).into();
        let workload = candidates.len();
        self.last_frame_candidates.store(workload, Ordering::Relaxed);

        if workload == 0 {
            self.last_frame_threaded.store(false, Ordering::Relaxed);
            self.frame_monitor.lock().record(frame_start.elapsed());
            return;
        }

        let dispatch_start = Instant::now();
        let (threaded, batch_count, failures) = match self.plan_batches(workload) {
            Some((batch_count, batch_size)) => {
                self.execute_batched(&candidates, batch_count, batch_size)
            }
            None => (false, 1, execute_slice(&candidates)),
        };
        let time_ms = dispatch_start.elapsed().as_secs_f64() * 1000.0;

        self.budget
            .report_execution(SystemType::Ai, workload, threaded, batch_count, time_ms);
        self.behavior_update_count
            .fetch_add(workload as u64, Ordering::Relaxed);
        self.last_frame_threaded.store(threaded, Ordering::Relaxed);
        self.record_stats(&candidates, time_ms, threaded, failures);
        self.frame_monitor.lock().record(frame_start.elapsed());

        tracing::trace!(
            frame,
            delta_time,
            workload,
            threaded,
            batch_count,
            failures,
            time_ms,
            "AI frame"
        );
    }

    /// Drop records whose entity expired or whose behavior was unassigned
    fn sweep(&self) {
        let dropped = self
            .entities
            .write()
            .retain(|record| record.active && record.is_alive());
        if !dropped.is_empty() {
            tracing::debug!(removed = dropped.len(), "Swept managed entities");
        }
    }

    fn collect_candidates(&self, frame: u64) -> Vec<Candidate> {
        let origin = self.player_position();
        let bands = self.update_bands();
        let multiplier = self.priority_multiplier.load();

        let store = self.entities.read();
        let mut candidates = Vec::with_capacity(store.len());
        for record in store.iter() {
            if !record.active {
                continue;
            }
            let Some(behavior) = record.behavior.as_ref() else {
                continue;
            };
            let Some(entity) = record.entity.upgrade() else {
                continue;
            };

            let counter = record.tick();
            let distance_sq = entity.position().distance_sq_to(origin);
            let Some(interval) = bands.interval(distance_sq, record.priority, multiplier) else {
                continue;
            };
            if !is_due(counter, behavior.update_frequency(), interval) {
                continue;
            }

            record.last_update_frame.store(frame, Ordering::Relaxed);
            candidates.push(Candidate {
                entity,
                behavior: Arc::clone(behavior),
            });
        }
        candidates
    }

    /// `(batch_count, batch_size)` when this frame should be threaded
    fn plan_batches(&self, workload: usize) -> Option<(usize, usize)> {
        if !self.use_threading.load(Ordering::Relaxed) {
            return None;
        }
        if !self.thread_system.as_deref().is_some_and(ThreadSystem::is_running) {
            return None;
        }
        if !self
            .budget
            .should_use_threading(SystemType::Ai, workload)
            .should_thread
        {
            return None;
        }

        let mut workers = self.budget.get_optimal_workers(SystemType::Ai, workload);
        let cap = self.max_threads.load(Ordering::Relaxed);
        if cap > 0 {
            workers = workers.min(cap);
        }
        if workers <= 1 {
            return None;
        }

        let (batch_count, batch_size) =
            self.budget
                .get_batch_strategy(SystemType::Ai, workload, workers);
        (batch_count > 1).then_some((batch_count, batch_size))
    }

    /// Dispatch contiguous slices and wait for all of them.
    ///
    /// Returns `(threaded, batches, failures)`. Slices whose task never ran
    /// are executed inline.
    fn execute_batched(
        &self,
        candidates: &Arc<[Candidate]>,
        batch_count: usize,
        batch_size: usize,
    ) -> (bool, usize, usize) {
        let Some(thread_system) = self.thread_system.as_deref() else {
            return (false, 1, execute_slice(candidates));
        };

        let total = candidates.len();
        let mut handles: SmallVec<[(TaskHandle<usize>, Range<usize>); 16]> = SmallVec::new();
        for batch in 0..batch_count {
            let start = batch * batch_size;
            if start >= total {
                break;
            }
            let range = start..(start + batch_size).min(total);
            let shared = Arc::clone(candidates);
            let slice = range.clone();
            let handle = thread_system.enqueue_task_with_result_and(
                move || execute_slice(&shared[slice]),
                TaskPriority::High,
                Some(format!("AI batch {}", batch)),
            );
            handles.push((handle, range));
        }

        let dispatched = handles.len();
        let mut inline = 0;
        let mut failures = 0;
        for (handle, range) in handles {
            match handle.wait() {
                Ok(batch_failures) => failures += batch_failures,
                Err(TaskError::Shutdown) | Err(TaskError::Cancelled) => {
                    inline += 1;
                    failures += execute_slice(&candidates[range]);
                }
                Err(e) => {
                    tracing::error!(error = %e, items = range.len(), "AI batch failed");
                    failures += range.len();
                }
            }
        }
        if inline > 0 {
            tracing::warn!(
                batches = dispatched,
                inline,
                "Thread system unavailable, AI batches ran inline"
            );
        }
        (inline < dispatched, dispatched, failures)
    }

    fn record_stats(&self, candidates: &[Candidate], time_ms: f64, threaded: bool, failures: usize) {
        let workload = candidates.len();
        let mut per_behavior: HashMap<&str, u64> = HashMap::new();
        for candidate in candidates {
            *per_behavior.entry(candidate.behavior.name()).or_default() += 1;
        }

        let mut stats = self.stats.lock();
        stats.global.add_sample(time_ms, workload as u64);
        stats.global.failures += failures as u64;
        if threaded {
            stats.global.threaded_frames += 1;
        }
        for (name, count) in per_behavior {
            let share = time_ms * count as f64 / workload as f64;
            let entry = stats.per_behavior.entry_ref(name).or_default();
            entry.add_sample(share, count);
            if threaded {
                entry.threaded_frames += 1;
            }
        }
    }
}

fn sanitize_multiplier(multiplier: f32) -> f32 {
    if multiplier.is_finite() {
        multiplier.clamp(MIN_PRIORITY_MULTIPLIER, MAX_PRIORITY_MULTIPLIER)
    } else {
        1.0
    }
}

impl Default for AiManager {
    /// Standalone manager: no thread system, wall clock, default config
    fn default() -> Self {
        Self::new(
            None,
            Arc::new(WorkerBudgetManager::default()),
            Arc::new(SystemClock::new()),
            &AiConfig::default(),
        )
    }
}
