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

//! Typed lifecycle observers: `on_add<C>`, `on_remove<C>`, `on_destroy`.
//! Dispatched at commit time, in the order components were added/removed
//! within a single command buffer replay, so observers see a causally
//! consistent sequence of world mutations rather than a batched summary.

use ahash::AHashMap;

use crate::entity::Entity;
use crate::types::DataTypeId;
use crate::world::World;

pub type ObserverFn = Box<dyn Fn(&mut World, Entity) + Send + Sync>;

/// Holds every registered observer, keyed by the component/relation type
/// it watches. Generalizes the donor's `Vec<Box<dyn Observer>>` broadcast
/// list (`src/observer.rs`) into three narrower channels so a system
/// watching one component type is not woken for every other mutation in
/// the world.
#[derive(Default)]
pub struct ObserverRegistry {
    on_add: AHashMap<DataTypeId, Vec<ObserverFn>>,
    on_remove: AHashMap<DataTypeId, Vec<ObserverFn>>,
    on_destroy: Vec<ObserverFn>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_add(&mut self, ty: DataTypeId, f: ObserverFn) {
        self.on_add.entry(ty).or_default().push(f);
    }

    pub fn on_remove(&mut self, ty: DataTypeId, f: ObserverFn) {
        self.on_remove.entry(ty).or_default().push(f);
    }

    pub fn on_destroy(&mut self, f: ObserverFn) {
        self.on_destroy.push(f);
    }

    /// # Safety
    /// `world` must be a valid, uniquely-borrowed pointer to the world
    /// that owns this registry; the registry itself must not be mutated
    /// while dispatch runs (no observer may register a further observer
    /// of the same channel while it is being dispatched).
    pub(crate) unsafe fn dispatch_add(&self, world: *mut World, ty: DataTypeId, entity: Entity) {
        if let Some(fs) = self.on_add.get(&ty) {
            for f in fs {
                f(&mut *world, entity);
            }
        }
    }

    /// # Safety
    /// See [`dispatch_add`](Self::dispatch_add).
    pub(crate) unsafe fn dispatch_remove(&self, world: *mut World, ty: DataTypeId, entity: Entity) {
        if let Some(fs) = self.on_remove.get(&ty) {
            for f in fs {
                f(&mut *world, entity);
            }
        }
    }

    /// # Safety
    /// See [`dispatch_add`](Self::dispatch_add).
    pub(crate) unsafe fn dispatch_destroy(&self, world: *mut World, entity: Entity) {
        for f in &self.on_destroy {
            f(&mut *world, entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn on_add_fires_only_for_its_type() {
        let mut registry = ObserverRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        registry.on_add(DataTypeId(1), Box::new(move |_world, _entity| {
            hits2.fetch_add(1, Ordering::SeqCst);
        }));

        let entity = Entity { index: 0, generation: 0 };
        let world_ptr = std::ptr::null_mut();
        unsafe {
            registry.dispatch_add(world_ptr, DataTypeId(2), entity);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
</content>
