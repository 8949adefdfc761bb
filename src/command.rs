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

//! Deferred, thread-safe mutation queue. Systems in the same parallel
//! layer are each handed their own `CommandBuffer` sharing the world's
//! `EntityPool`, and may `push` from any thread; `commit` replays
//! everything against the world single-threaded, between layers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::any_value::AnyValue;
use crate::blueprint::Blueprint;
use crate::entity::{Entity, EntityPool};
use crate::error::Result;
use crate::types::DataTypeId;
use crate::world::World;

type Closure = Box<dyn FnOnce(&mut World) -> Result<()> + Send>;

enum Command {
    Create(Entity),
    Destroy(Entity),
    AddComponent(Entity, DataTypeId, AnyValue),
    RemoveComponent(Entity, DataTypeId),
    Relate(Entity, Entity, DataTypeId, AnyValue),
    Unrelate(Entity, Entity, DataTypeId),
    InsertResource(DataTypeId, AnyValue),
    EraseResource(DataTypeId),
    Push(Closure),
}

/// Queues operations against a world without borrowing it. `create`
/// reserves the entity's index immediately (via a cloned handle to the
/// shared, lock-free `EntityPool`, not a borrow of the world), so the
/// returned `Entity` is a valid identifier to pass into later commands
/// on this or any other buffer even before `commit` runs — and the
/// buffer itself never ties up the world's borrow the way holding
/// `&World` would, leaving it free to be borrowed mutably for `commit`.
/// The entity is only marked alive once its `Create` command replays.
pub struct CommandBuffer {
    entities: Arc<EntityPool>,
    commands: Mutex<Vec<Command>>,
}

impl CommandBuffer {
    pub fn new(world: &World) -> Self {
        Self { entities: world.entity_pool(), commands: Mutex::new(Vec::new()) }
    }

    pub fn create(&self) -> Entity {
        let entity = self.entities.reserve();
        self.commands.lock().push(Command::Create(entity));
        entity
    }

    pub fn destroy(&self, entity: Entity) {
        self.commands.lock().push(Command::Destroy(entity));
    }

    pub fn add_component(&self, entity: Entity, ty: DataTypeId, value: AnyValue) {
        self.commands.lock().push(Command::AddComponent(entity, ty, value));
    }

    pub fn remove_component(&self, entity: Entity, ty: DataTypeId) {
        self.commands.lock().push(Command::RemoveComponent(entity, ty));
    }

    pub fn relate(&self, from: Entity, to: Entity, ty: DataTypeId, value: AnyValue) {
        self.commands.lock().push(Command::Relate(from, to, ty, value));
    }

    pub fn unrelate(&self, from: Entity, to: Entity, ty: DataTypeId) {
        self.commands.lock().push(Command::Unrelate(from, to, ty));
    }

    pub fn insert_resource(&self, ty: DataTypeId, value: AnyValue) {
        self.commands.lock().push(Command::InsertResource(ty, value));
    }

    pub fn erase_resource(&self, ty: DataTypeId) {
        self.commands.lock().push(Command::EraseResource(ty));
    }

    /// Queues an arbitrary world mutation, for operations with no direct
    /// command variant (e.g. a typed convenience wrapper).
    pub fn push<F>(&self, f: F)
    where
        F: FnOnce(&mut World) -> Result<()> + Send + 'static,
    {
        self.commands.lock().push(Command::Push(Box::new(f)));
    }

    /// Reserves an entity for every named template in `blueprint` and
    /// queues its population, returning the name→entity map immediately
    /// (the entities are valid identifiers right away, per `create`'s
    /// contract; they become alive and populated when `commit` runs).
    pub fn spawn(&self, blueprint: Blueprint) -> ahash::AHashMap<String, Entity> {
        let mut named = ahash::AHashMap::default();
        for name in blueprint.entities.keys() {
            named.insert(name.clone(), self.create());
        }
        let reserved = named.clone();
        self.push(move |world| blueprint.instantiate_reserved(world, &reserved));
        named
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }

    /// Replays every queued command against `world` in insertion order,
    /// then clears the buffer. Single-threaded; sees a consistent world
    /// between commands.
    pub fn commit(&self, world: &mut World) -> Result<()> {
        let commands = std::mem::take(&mut *self.commands.lock());
        for command in commands {
            match command {
                Command::Create(entity) => world.create_at(entity),
                Command::Destroy(entity) => world.destroy(entity)?,
                Command::AddComponent(entity, ty, value) => world.add_component_raw(entity, ty, value)?,
                Command::RemoveComponent(entity, ty) => world.remove_component_raw(entity, ty)?,
                Command::Relate(from, to, ty, value) => world.relate(from, to, ty, value)?,
                Command::Unrelate(from, to, ty) => world.unrelate(from, to, ty)?,
                Command::InsertResource(ty, value) => world.insert_resource(ty, value),
                Command::EraseResource(ty) => world.erase_resource(ty),
                Command::Push(f) => f(world)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Position {
        x: f32,
    }

    #[test]
    fn create_is_valid_identifier_before_commit() {
        let world = World::new();
        let buffer = CommandBuffer::new(&world);
        let entity = buffer.create();
        assert!(!world.is_alive(entity));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn commit_applies_queued_mutations() {
        let mut world = World::new();
        let id = world.register_component_type::<Position>().unwrap();
        let buffer = CommandBuffer::new(&world);
        let entity = buffer.create();
        let descriptor = world.types().descriptor(id).unwrap().clone();
        let value = AnyValue::default_construct(descriptor).unwrap();
        buffer.add_component(entity, id, value);

        buffer.commit(&mut world).unwrap();
        assert!(world.is_alive(entity));
        assert!(world.has_component_raw(entity, id));
        assert!(buffer.is_empty());
    }

    #[test]
    fn destroy_via_command_removes_entity() {
        let mut world = World::new();
        let buffer = CommandBuffer::new(&world);
        let entity = buffer.create();
        buffer.commit(&mut world).unwrap();
        assert!(world.is_alive(entity));

        let buffer = CommandBuffer::new(&world);
        buffer.destroy(entity);
        buffer.commit(&mut world).unwrap();
        assert!(!world.is_alive(entity));
    }
}
