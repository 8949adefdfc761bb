// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Generational entity identifiers and the pool that owns them.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam::queue::SegQueue;
use parking_lot::RwLock;

use crate::archetype::ArchetypeId;

/// A generational entity reference: `index` is reused after destruction,
/// `generation` increments each time so stale references compare unequal
/// to the live entity at the same index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    pub index: u32,
    pub generation: u32,
}

impl Entity {
    pub const NULL: Entity = Entity { index: u32::MAX, generation: u32::MAX };

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

struct Entry {
    generation: u32,
    is_alive: bool,
    archetype: ArchetypeId,
}

/// Owns every entity index ever handed out. `reserve` is the only
/// operation that may be called concurrently from multiple threads (it
/// backs `World::reserve` and `CommandBuffer::create`); every other
/// mutation happens only during a single-threaded command-buffer drain.
pub struct EntityPool {
    /// High-water mark for indices that have never been used.
    next_index: AtomicU32,
    free_list: SegQueue<u32>,
    entries: RwLock<Vec<Entry>>,
}

impl EntityPool {
    pub fn new() -> Self {
        Self { next_index: AtomicU32::new(0), free_list: SegQueue::new(), entries: RwLock::new(Vec::new()) }
    }

    /// Pops a free index if one exists, otherwise atomically grabs a
    /// fresh one; safe to call from multiple threads concurrently. The
    /// returned entity is reserved but not yet alive — `create_at` must
    /// follow before it participates in archetypes/queries.
    pub fn reserve(&self) -> Entity {
        if let Some(index) = self.free_list.pop() {
            let generation = self.entries.read()[index as usize].generation;
            return Entity { index, generation };
        }

        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write();
        if index as usize >= entries.len() {
            entries.resize_with(index as usize + 1, || Entry {
                generation: 0,
                is_alive: false,
                archetype: ArchetypeId::EMPTY,
            });
        }
        Entity { index, generation: entries[index as usize].generation }
    }

    /// Marks a previously-reserved entity alive. Panics if it is already
    /// alive, which would indicate a double `create_at` on the same
    /// reservation.
    pub fn create_at(&self, entity: Entity) {
        let mut entries = self.entries.write();
        let entry = &mut entries[entity.index as usize];
        assert!(entry.generation == entity.generation, "create_at on a stale entity reference");
        assert!(!entry.is_alive, "create_at on an already-alive entity");
        entry.is_alive = true;
    }

    /// Marks the entity dead, bumps its generation, and returns the
    /// index to the free list. No-op (returns false) if already dead or
    /// never created.
    pub fn destroy(&self, entity: Entity) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(entity.index as usize) else { return false };
        if entry.generation != entity.generation || !entry.is_alive {
            return false;
        }
        entry.is_alive = false;
        entry.generation = entry.generation.wrapping_add(1);
        entry.archetype = ArchetypeId::EMPTY;
        drop(entries);
        self.free_list.push(entity.index);
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        let entries = self.entries.read();
        entries
            .get(entity.index as usize)
            .map(|e| e.is_alive && e.generation == entity.generation)
            .unwrap_or(false)
    }

    pub fn archetype(&self, entity: Entity) -> Option<ArchetypeId> {
        let entries = self.entries.read();
        let entry = entries.get(entity.index as usize)?;
        (entry.generation == entity.generation && entry.is_alive).then_some(entry.archetype)
    }

    pub fn set_archetype(&self, entity: Entity, archetype: ArchetypeId) {
        let mut entries = self.entries.write();
        entries[entity.index as usize].archetype = archetype;
    }

    /// Current generation for the given index, for staleness checks
    /// independent of a specific `Entity` value.
    pub fn generation(&self, index: u32) -> Option<u32> {
        self.entries.read().get(index as usize).map(|e| e.generation)
    }

    pub fn alive_count(&self) -> usize {
        self.entries.read().iter().filter(|e| e.is_alive).count()
    }
}

impl Default for EntityPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn reserve_then_create_then_destroy() {
        let pool = EntityPool::new();
        let e = pool.reserve();
        assert!(!pool.is_alive(e));
        pool.create_at(e);
        assert!(pool.is_alive(e));
        assert!(pool.destroy(e));
        assert!(!pool.is_alive(e));
    }

    #[test]
    fn generation_increases_on_reuse() {
        let pool = EntityPool::new();
        let e1 = pool.reserve();
        pool.create_at(e1);
        pool.destroy(e1);

        let e2 = pool.reserve();
        assert_eq!(e2.index, e1.index);
        assert!(e2.generation > e1.generation);
    }

    #[test]
    fn stale_entity_is_not_alive() {
        let pool = EntityPool::new();
        let e1 = pool.reserve();
        pool.create_at(e1);
        pool.destroy(e1);
        let e2 = pool.reserve();
        pool.create_at(e2);

        assert!(!pool.is_alive(e1));
        assert!(pool.is_alive(e2));
    }

    #[test]
    fn concurrent_reserve_yields_distinct_entities() {
        let pool = Arc::new(EntityPool::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(thread::spawn(move || {
                (0..256).map(|_| pool.reserve()).collect::<Vec<_>>()
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.join().unwrap());
        }
        let unique: std::collections::HashSet<_> = all.iter().map(|e| (e.index, e.generation)).collect();
        assert_eq!(unique.len(), all.len());
    }
}
</content>
