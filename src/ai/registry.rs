//! Managed-entity records, deferred assignments and queued messages

use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::behavior::Behavior;
use crate::entity::{Entity, EntityId};

/// Per-entity bookkeeping held by the AI manager
pub(crate) struct ManagedEntity {
    pub id: EntityId,
    pub entity: Weak<Entity>,
    pub priority: u8,
    pub behavior: Option<Arc<dyn Behavior>>,
    pub behavior_name: Option<String>,
    /// Cleared by unassign; the cleanup sweep drops inactive records
    pub active: bool,
    /// Advances once per frame the record is considered; seeded from the id
    /// so entities sharing a frequency don't all fire on the same frame
    pub frame_counter: AtomicU32,
    pub last_update_frame: AtomicU64,
    pub registered_at_ms: u64,
}

impl ManagedEntity {
    pub fn new(entity: &Arc<Entity>, priority: u8, now_ms: u64) -> Self {
        Self {
            id: entity.id(),
            entity: Arc::downgrade(entity),
            priority,
            behavior: None,
            behavior_name: None,
            active: true,
            frame_counter: AtomicU32::new(entity.id() as u32),
            last_update_frame: AtomicU64::new(0),
            registered_at_ms: now_ms,
        }
    }

    /// Advance and return the stagger counter
    #[inline]
    pub fn tick(&self) -> u32 {
        self.frame_counter
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }

    pub fn is_alive(&self) -> bool {
        self.entity.strong_count() > 0
    }
}

/// Dense record array with an id index; removal is swap-remove
#[derive(Default)]
pub(crate) struct EntityStore {
    records: Vec<ManagedEntity>,
    index: FxHashMap<EntityId, usize>,
}

impl EntityStore {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManagedEntity> {
        self.records.iter()
    }

    pub fn get(&self, id: EntityId) -> Option<&ManagedEntity> {
        self.index.get(&id).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut ManagedEntity> {
        match self.index.get(&id) {
            Some(&i) => Some(&mut self.records[i]),
            None => None,
        }
    }

    /// Existing record for `entity`, or a fresh one with `priority`
    pub fn upsert(&mut self, entity: &Arc<Entity>, priority: u8, now_ms: u64) -> &mut ManagedEntity {
        let id = entity.id();
        let i = match self.index.get(&id) {
            Some(&i) => i,
            None => {
                let i = self.records.len();
                self.records.push(ManagedEntity::new(entity, priority, now_ms));
                self.index.insert(id, i);
                i
            }
        };
        &mut self.records[i]
    }

    /// Swap-remove for O(1)
    pub fn remove(&mut self, id: EntityId) -> Option<ManagedEntity> {
        let i = self.index.remove(&id)?;
        let record = self.records.swap_remove(i);
        if let Some(moved) = self.records.get(i) {
            self.index.insert(moved.id, i);
        }
        Some(record)
    }

    /// Keep records matching `keep`; returns the dropped ones
    pub fn retain(&mut self, mut keep: impl FnMut(&ManagedEntity) -> bool) -> Vec<ManagedEntity> {
        let (kept, dropped): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.records).into_iter().partition(|r| keep(r));
        self.records = kept;
        self.index.clear();
        for (i, record) in self.records.iter().enumerate() {
            self.index.insert(record.id, i);
        }
        dropped
    }

    pub fn drain(&mut self) -> Vec<ManagedEntity> {
        self.index.clear();
        std::mem::take(&mut self.records)
    }
}

/// Deferred `entity -> behavior` assignment
pub(crate) struct PendingAssignment {
    pub id: EntityId,
    pub entity: Weak<Entity>,
    pub behavior_name: String,
}

/// Assignment queue deduplicated by entity (last write wins, first position kept)
#[derive(Default)]
pub(crate) struct PendingAssignments {
    queue: Vec<PendingAssignment>,
    index: FxHashMap<EntityId, usize>,
}

impl PendingAssignments {
    pub fn push(&mut self, entity: &Arc<Entity>, behavior_name: &str) {
        let id = entity.id();
        match self.index.get(&id) {
            Some(&i) => self.queue[i].behavior_name = behavior_name.to_string(),
            None => {
                self.index.insert(id, self.queue.len());
                self.queue.push(PendingAssignment {
                    id,
                    entity: Arc::downgrade(entity),
                    behavior_name: behavior_name.to_string(),
                });
            }
        }
    }

    pub fn remove(&mut self, id: EntityId) {
        if let Some(i) = self.index.remove(&id) {
            self.queue.remove(i);
            self.reindex();
        }
    }

    /// Take up to `limit` entries from the front
    pub fn take(&mut self, limit: usize) -> Vec<PendingAssignment> {
        let n = limit.min(self.queue.len());
        let taken: Vec<_> = self.queue.drain(..n).collect();
        self.reindex();
        taken
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.index.clear();
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, pending) in self.queue.iter().enumerate() {
            self.index.insert(pending.id, i);
        }
    }
}

/// Recipient of a queued message
pub(crate) enum MessageTarget {
    Entity { id: EntityId, entity: Weak<Entity> },
    Broadcast,
}

pub(crate) struct QueuedMessage {
    pub target: MessageTarget,
    pub message: String,
    pub timestamp_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec2::Vec2;

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = EntityStore::default();
        let e = Entity::new(Vec2::ZERO);
        store.upsert(&e, 3, 0);
        store.upsert(&e, 7, 0);
        assert_eq!(store.len(), 1);
        // Existing record keeps its priority; callers overwrite explicitly
        assert_eq!(store.get(e.id()).map(|r| r.priority), Some(3));
    }

    #[test]
    fn test_swap_remove_keeps_index_consistent() {
        let mut store = EntityStore::default();
        let entities: Vec<_> = (0..5).map(|_| Entity::new(Vec2::ZERO)).collect();
        for e in &entities {
            store.upsert(e, 5, 0);
        }
        assert!(store.remove(entities[1].id()).is_some());
        assert!(store.remove(entities[1].id()).is_none());
        assert_eq!(store.len(), 4);
        for e in entities.iter().filter(|e| e.id() != entities[1].id()) {
            assert_eq!(store.get(e.id()).map(|r| r.id), Some(e.id()));
        }
    }

    #[test]
    fn test_retain_drops_expired() {
        let mut store = EntityStore::default();
        let keep = Entity::new(Vec2::ZERO);
        {
            let gone = Entity::new(Vec2::ZERO);
            store.upsert(&gone, 5, 0);
        }
        store.upsert(&keep, 5, 0);
        let dropped = store.retain(ManagedEntity::is_alive);
        assert_eq!(dropped.len(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(keep.id()).is_some());
        assert!(store.get_mut(keep.id()).is_some());
    }

    #[test]
    fn test_pending_dedup_last_write_wins() {
        let mut pending = PendingAssignments::default();
        let a = Entity::new(Vec2::ZERO);
        let b = Entity::new(Vec2::ZERO);
        pending.push(&a, "Wander");
        pending.push(&b, "Guard");
        pending.push(&a, "Chase");
        assert_eq!(pending.len(), 2);

        let taken = pending.take(1);
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].id, a.id());
        assert_eq!(taken[0].behavior_name, "Chase");

        // Index still valid after partial drain
        pending.push(&b, "Flee");
        let rest = pending.take(usize::MAX);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].behavior_name, "Flee");
    }

    #[test]
    fn test_pending_remove() {
        let mut pending = PendingAssignments::default();
        let a = Entity::new(Vec2::ZERO);
        let b = Entity::new(Vec2::ZERO);
        pending.push(&a, "Wander");
        pending.push(&b, "Guard");
        pending.remove(a.id());
        pending.push(&b, "Idle");
        let all = pending.take(10);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].behavior_name, "Idle");
    }

    #[test]
    fn test_tick_wraps() {
        let e = Entity::new(Vec2::ZERO);
        let record = ManagedEntity::new(&e, 5, 0);
        record.frame_counter.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(record.tick(), 0);
        assert_eq!(record.tick(), 1);
    }
}
