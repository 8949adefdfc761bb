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

//! The central façade composing every storage subsystem: type
//! registration, archetypes, dense and sparse tables, the entity pool,
//! resources, observers and events. Everything else in the crate
//! (commands, queries, the scheduler) mutates the world only through
//! this type.

use std::sync::Arc;

use ahash::AHashMap;

use crate::any_value::AnyValue;
use crate::archetype::{ArchetypeGraph, ArchetypeId, ColumnId};
use crate::entity::{Entity, EntityPool};
use crate::error::{EcsError, Result};
use crate::event::EventRegistry;
use crate::observer::ObserverRegistry;
use crate::reflection::{Constructible, TypeDescriptor, TypeRegistry};
use crate::relation::{self, SparseRelationTableId, SparseRelationTableRegistry};
use crate::table::DenseTableRegistry;
use crate::types::{DataTypeId, Types};

pub struct World {
    type_registry: TypeRegistry,
    types: Types,
    graph: ArchetypeGraph,
    tables: DenseTableRegistry,
    relations: SparseRelationTableRegistry,
    /// Shared via `Arc` (not a plain field) so `CommandBuffer::new` can
    /// clone a handle to it without borrowing the rest of `World` — the
    /// reservation path (`EntityPool::reserve`) only needs `&self`, so a
    /// command buffer must be able to call `create()` while the world
    /// it was built from is later borrowed mutably elsewhere.
    entities: Arc<EntityPool>,
    resources: AHashMap<DataTypeId, AnyValue>,
    observers: ObserverRegistry,
    events: EventRegistry,
    relation_outgoing: AHashMap<(DataTypeId, Entity), Entity>,
    relation_depth: AHashMap<(DataTypeId, Entity), u32>,
}

impl World {
    pub fn new() -> Self {
        let mut tables = DenseTableRegistry::new();
        tables.get_or_create(ArchetypeId::EMPTY, std::iter::empty());
        Self {
            type_registry: TypeRegistry::new(),
            types: Types::new(),
            graph: ArchetypeGraph::new(),
            tables,
            relations: SparseRelationTableRegistry::new(),
            entities: Arc::new(EntityPool::new()),
            resources: AHashMap::default(),
            observers: ObserverRegistry::new(),
            events: EventRegistry::new(),
            relation_outgoing: AHashMap::default(),
            relation_depth: AHashMap::default(),
        }
    }

    // ---- type registration -------------------------------------------------

    pub fn register_component(&mut self, descriptor: Arc<TypeDescriptor>) -> Result<DataTypeId> {
        self.type_registry.insert(descriptor.clone())?;
        self.types.add_component(descriptor)
    }

    pub fn register_relation(&mut self, descriptor: Arc<TypeDescriptor>, symmetric: bool, tree: bool) -> Result<DataTypeId> {
        self.type_registry.insert(descriptor.clone())?;
        self.types.add_relation(descriptor, symmetric, tree)
    }

    pub fn register_resource(&mut self, descriptor: Arc<TypeDescriptor>) -> Result<DataTypeId> {
        self.type_registry.insert(descriptor.clone())?;
        self.types.add_resource(descriptor)
    }

    /// Registers `T` as a component on first use, building its
    /// descriptor from `Default` + move/destruct alone — components
    /// that are not `Clone` are still usable, they simply cannot be
    /// `copy_construct`ed (e.g. by a future blueprint clone operation).
    pub fn register_component_type<T: Default + Send + Sync + 'static>(&mut self) -> Result<DataTypeId> {
        let name = std::any::type_name::<T>();
        if let Some(id) = self.types.id_of(name) {
            return Ok(id);
        }
        let constructible = Constructible::of::<T>().with_default::<T>();
        let descriptor = Arc::new(TypeDescriptor::new(name, constructible));
        self.register_component(descriptor)
    }

    /// Registers `T` as a resource type on first use, keyed by its Rust
    /// type name the same way `register_component_type` keys components.
    /// Fetchers (`Res<T>`/`ResMut<T>`) resolve `T`'s `DataTypeId` through
    /// this name at schedule-compile time.
    pub fn register_resource_type<T: Default + Send + Sync + 'static>(&mut self) -> Result<DataTypeId> {
        let name = std::any::type_name::<T>();
        if let Some(id) = self.types.id_of(name) {
            return Ok(id);
        }
        let constructible = Constructible::of::<T>().with_default::<T>();
        let descriptor = Arc::new(TypeDescriptor::new(name, constructible));
        self.register_resource(descriptor)
    }

    /// Looks up `T`'s resource `DataTypeId`, if `register_resource_type::<T>`
    /// has run.
    pub fn resource_id_of<T: 'static>(&self) -> Option<DataTypeId> {
        self.types.id_of(std::any::type_name::<T>())
    }

    /// Registers `T` as a resource type if needed, then moves `value`
    /// into its slot (replacing whatever was there). Used by `App::new`
    /// to seed the reserved resources with real values rather than
    /// `T::default()`.
    pub fn insert_resource_value<T: Default + Send + Sync + 'static>(&mut self, value: T) -> Result<DataTypeId> {
        let id = self.register_resource_type::<T>()?;
        let descriptor = self.types.descriptor(id).expect("just registered").clone();
        let mut boxed = std::mem::ManuallyDrop::new(value);
        let any = unsafe { AnyValue::move_construct(descriptor, &mut *boxed as *mut T as *mut u8)? };
        self.insert_resource(id, any);
        Ok(id)
    }

    /// Typed read of a registered resource, for call sites outside the
    /// scheduler (e.g. the frame driver updating `DeltaTime`) that don't
    /// go through a `Fetcher`.
    pub fn resource_typed<T: 'static>(&self) -> Option<&T> {
        let id = self.resource_id_of::<T>()?;
        let ptr = self.resource(id)? as *const T;
        Some(unsafe { &*ptr })
    }

    pub fn resource_mut_typed<T: 'static>(&mut self) -> Option<&mut T> {
        let id = self.resource_id_of::<T>()?;
        let ptr = self.resource_mut(id)? as *mut T;
        Some(unsafe { &mut *ptr })
    }

    pub fn types(&self) -> &Types {
        &self.types
    }

    pub fn type_registry(&self) -> &TypeRegistry {
        &self.type_registry
    }

    // ---- resources ----------------------------------------------------------

    pub fn insert_resource(&mut self, id: DataTypeId, value: AnyValue) {
        self.resources.insert(id, value);
    }

    pub fn erase_resource(&mut self, id: DataTypeId) {
        self.resources.remove(&id);
    }

    pub fn resource(&self, id: DataTypeId) -> Option<*const u8> {
        self.resources.get(&id).map(|v| v.as_ptr())
    }

    pub fn resource_mut(&mut self, id: DataTypeId) -> Option<*mut u8> {
        self.resources.get_mut(&id).map(|v| v.as_mut_ptr())
    }

    // ---- entities -------------------------------------------------------------

    pub fn reserve(&self) -> Entity {
        self.entities.reserve()
    }

    pub fn create_at(&mut self, entity: Entity) {
        self.entities.create_at(entity);
        self.tables.get_or_create(ArchetypeId::EMPTY, std::iter::empty()).allocate_row(entity).expect("empty archetype allocation cannot fail");
        self.entities.set_archetype(entity, ArchetypeId::EMPTY);
    }

    pub fn create(&mut self) -> Entity {
        let entity = self.reserve();
        self.create_at(entity);
        entity
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn destroy(&mut self, entity: Entity) -> Result<()> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::InvalidEntity(entity));
        }

        let world_ptr = self as *mut World;
        unsafe {
            self.observers.dispatch_destroy(world_ptr, entity);
        }

        if let Some(archetype) = self.entities.archetype(entity) {
            if let Some(table) = self.tables.get_mut(archetype) {
                table.remove_row(entity);
            }
        }
        self.relations.remove_entity_everywhere(entity);
        self.relation_outgoing.retain(|(_, from), _| *from != entity);
        self.relation_depth.retain(|(_, from), _| *from != entity);
        self.entities.destroy(entity);
        Ok(())
    }

    // ---- components -----------------------------------------------------------

    /// Typed read of a component, resolving `T`'s `DataTypeId` by name the
    /// same way `resource_typed` does for resources.
    pub fn get_component<T: 'static>(&self, entity: Entity) -> Option<&T> {
        let id = self.types.id_of(std::any::type_name::<T>())?;
        let ptr = self.get_component_raw(entity, id)? as *const T;
        Some(unsafe { &*ptr })
    }

    pub fn get_component_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        let id = self.types.id_of(std::any::type_name::<T>())?;
        let ptr = self.get_component_raw_mut(entity, id)? as *mut T;
        Some(unsafe { &mut *ptr })
    }

    /// Registers `T` on first use and moves `value` onto `entity`,
    /// migrating it to the archetype with `T`'s column per
    /// `add_component_raw`.
    pub fn add_component<T: Default + Send + Sync + 'static>(&mut self, entity: Entity, value: T) -> Result<()> {
        let id = self.register_component_type::<T>()?;
        let descriptor = self.types.descriptor(id).expect("just registered").clone();
        let mut boxed = std::mem::ManuallyDrop::new(value);
        let any = unsafe { AnyValue::move_construct(descriptor, &mut *boxed as *mut T as *mut u8)? };
        self.add_component_raw(entity, id, any)
    }

    /// Creates a fresh entity and inserts every component of `bundle` onto
    /// it in one call.
    pub fn spawn<B: crate::component::Bundle>(&mut self, bundle: B) -> Result<Entity> {
        let entity = self.create();
        bundle.spawn_into(self, entity)?;
        Ok(entity)
    }

    pub fn has_component_raw(&self, entity: Entity, ty: DataTypeId) -> bool {
        let Some(archetype) = self.entities.archetype(entity) else { return false };
        self.graph.contains(archetype, ColumnId::of_component(ty))
    }

    pub fn get_component_raw(&self, entity: Entity, ty: DataTypeId) -> Option<*const u8> {
        let archetype = self.entities.archetype(entity)?;
        let table = self.tables.get(archetype)?;
        let row = table.row_of(entity)?;
        table.column(ColumnId::of_component(ty))?.get(row)
    }

    pub fn get_component_raw_mut(&mut self, entity: Entity, ty: DataTypeId) -> Option<*mut u8> {
        let archetype = self.entities.archetype(entity)?;
        let table = self.tables.get_mut(archetype)?;
        let row = table.row_of(entity)?;
        table.column_mut(ColumnId::of_component(ty))?.get_mut(row)
    }

    pub fn add_component_raw(&mut self, entity: Entity, ty: DataTypeId, value: AnyValue) -> Result<()> {
        let current = self.entities.archetype(entity).ok_or(EcsError::InvalidEntity(entity))?;
        let column = ColumnId::of_component(ty);

        if self.graph.contains(current, column) {
            let table = self.tables.get_mut(current).ok_or(EcsError::ArchetypeNotFound)?;
            let row = table.row_of(entity).ok_or(EcsError::InvalidEntity(entity))?;
            table.column_mut(column).ok_or(EcsError::ComponentNotFound)?.replace_move(row, value)?;
            return Ok(());
        }

        let dst = self.graph.with(current, column);
        let dst_columns: Vec<(ColumnId, Arc<TypeDescriptor>)> = self
            .graph
            .columns(dst)
            .map(|c| {
                let id = DataTypeId(c.0 as u32);
                (c, self.types.descriptor(id).cloned().expect("archetype column has no registered descriptor"))
            })
            .collect();
        self.tables.get_or_create(dst, dst_columns.into_iter());

        self.tables.move_row(current, dst, entity, Some((column, value)))?;
        self.entities.set_archetype(entity, dst);

        let world_ptr = self as *mut World;
        unsafe {
            self.observers.dispatch_add(world_ptr, ty, entity);
        }
        Ok(())
    }

    pub fn remove_component_raw(&mut self, entity: Entity, ty: DataTypeId) -> Result<()> {
        let current = self.entities.archetype(entity).ok_or(EcsError::InvalidEntity(entity))?;
        let column = ColumnId::of_component(ty);
        if !self.graph.contains(current, column) {
            return Err(EcsError::ComponentNotFound);
        }

        let dst = self.graph.without(current, column);
        let dst_columns: Vec<(ColumnId, Arc<TypeDescriptor>)> = self
            .graph
            .columns(dst)
            .map(|c| {
                let id = DataTypeId(c.0 as u32);
                (c, self.types.descriptor(id).cloned().expect("archetype column has no registered descriptor"))
            })
            .collect();
        self.tables.get_or_create(dst, dst_columns.into_iter());

        self.tables.move_row(current, dst, entity, None)?;
        self.entities.set_archetype(entity, dst);

        let world_ptr = self as *mut World;
        unsafe {
            self.observers.dispatch_remove(world_ptr, ty, entity);
        }
        Ok(())
    }

    // ---- relations --------------------------------------------------------------

    fn canonical_pair(&self, ty: DataTypeId, from: Entity, to: Entity) -> (Entity, Entity) {
        if self.types.is_symmetric(ty) {
            relation::symmetric_order(from, to)
        } else {
            (from, to)
        }
    }

    pub fn relate(&mut self, from: Entity, to: Entity, ty: DataTypeId, value: AnyValue) -> Result<()> {
        let is_tree = self.types.is_tree(ty);
        let (from, to) = self.canonical_pair(ty, from, to);

        if is_tree {
            if let Some(&old_to) = self.relation_outgoing.get(&(ty, from)) {
                if old_to != to {
                    self.unrelate(from, old_to, ty)?;
                }
            }
        }

        let from_archetype = self.entities.archetype(from).ok_or(EcsError::InvalidEntity(from))?;
        let to_archetype = self.entities.archetype(to).ok_or(EcsError::InvalidEntity(to))?;
        let depth = if is_tree { self.relation_depth.get(&(ty, to)).copied().unwrap_or(0) + 1 } else { 0 };

        let id = SparseRelationTableId { data_type: ty, from_archetype, to_archetype, depth };
        self.relations.create(id).upsert(from, to, value);

        if is_tree {
            self.relation_outgoing.insert((ty, from), to);
            self.relation_depth.insert((ty, from), depth);
        }
        Ok(())
    }

    pub fn unrelate(&mut self, from: Entity, to: Entity, ty: DataTypeId) -> Result<()> {
        let (from, to) = self.canonical_pair(ty, from, to);
        let Some(from_archetype) = self.entities.archetype(from) else { return Ok(()) };
        let Some(to_archetype) = self.entities.archetype(to) else { return Ok(()) };
        let depth = if self.types.is_tree(ty) { self.relation_depth.get(&(ty, from)).copied().unwrap_or(0) } else { 0 };

        let id = SparseRelationTableId { data_type: ty, from_archetype, to_archetype, depth };
        if let Some(table) = self.relations.get_mut(id) {
            table.remove(from, to);
        }
        if self.types.is_tree(ty) {
            self.relation_outgoing.remove(&(ty, from));
            self.relation_depth.remove(&(ty, from));
        }
        Ok(())
    }

    pub fn related(&self, from: Entity, to: Entity, ty: DataTypeId) -> Option<*const u8> {
        let (from, to) = self.canonical_pair(ty, from, to);
        let from_archetype = self.entities.archetype(from)?;
        let to_archetype = self.entities.archetype(to)?;
        let depth = if self.types.is_tree(ty) { self.relation_depth.get(&(ty, from)).copied().unwrap_or(0) } else { 0 };

        let id = SparseRelationTableId { data_type: ty, from_archetype, to_archetype, depth };
        self.relations.get(id)?.get(from, to).map(|v| v.as_ptr())
    }

    // ---- internal accessors for the query engine and scheduler --------------------

    pub(crate) fn graph(&self) -> &ArchetypeGraph {
        &self.graph
    }

    pub(crate) fn tables(&self) -> &DenseTableRegistry {
        &self.tables
    }

    pub(crate) fn relation_tables(&self) -> &SparseRelationTableRegistry {
        &self.relations
    }

    /// Every outgoing row of relation `ty` from `from`, across every
    /// `to`-archetype bucket. For a tree relation this has at most one
    /// element; for any other relation it may have many.
    pub(crate) fn relation_outgoing_rows(&self, ty: DataTypeId, from: Entity) -> Vec<(Entity, *const u8)> {
        let Some(from_archetype) = self.entities.archetype(from) else { return Vec::new() };
        let mut out = Vec::new();
        for &id in self.relations.tables_from(ty, from_archetype) {
            if let Some(table) = self.relations.get(id) {
                out.extend(table.outgoing(from).map(|(e, v)| (e, v.as_ptr())));
            }
        }
        out
    }

    /// Every incoming row of relation `ty` into `to`, across every
    /// `from`-archetype bucket.
    pub(crate) fn relation_incoming_rows(&self, ty: DataTypeId, to: Entity) -> Vec<(Entity, *const u8)> {
        let Some(to_archetype) = self.entities.archetype(to) else { return Vec::new() };
        let mut out = Vec::new();
        for &id in self.relations.tables_to(ty, to_archetype) {
            if let Some(table) = self.relations.get(id) {
                out.extend(table.incoming(to).map(|(e, v)| (e, v.as_ptr())));
            }
        }
        out
    }

    pub fn observers_mut(&mut self) -> &mut ObserverRegistry {
        &mut self.observers
    }

    pub fn events_mut(&mut self) -> &mut EventRegistry {
        &mut self.events
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn entity_archetype(&self, entity: Entity) -> Option<ArchetypeId> {
        self.entities.archetype(entity)
    }

    pub fn alive_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Row count of the dense table backing `archetype`, i.e. how many
    /// entities currently live in it. `None` if the archetype has no
    /// table yet.
    pub fn archetype_row_count(&self, archetype: ArchetypeId) -> Option<usize> {
        self.tables.get(archetype).map(|table| table.len())
    }

    /// Length of a single column within `archetype`'s dense table. Used
    /// by callers (and tests) that want to confirm a column stayed in
    /// lockstep with the table's row count after a migration.
    pub fn archetype_column_len(&self, archetype: ArchetypeId, column: ColumnId) -> Option<usize> {
        self.tables.get(archetype)?.column(column).map(|vector| vector.len())
    }

    pub fn entity_pool(&self) -> Arc<EntityPool> {
        self.entities.clone()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Clone)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Default, Clone)]
    struct ChildOf;

    fn position_value(world: &mut World, x: f32, y: f32) -> (DataTypeId, AnyValue) {
        let id = world.register_component_type::<Position>().unwrap();
        let descriptor = world.types().descriptor(id).unwrap().clone();
        let mut value = AnyValue::default_construct(descriptor).unwrap();
        unsafe {
            let ptr = value.as_mut_ptr() as *mut Position;
            (*ptr).x = x;
            (*ptr).y = y;
        }
        (id, value)
    }

    #[test]
    fn create_and_destroy_entity() {
        let mut world = World::new();
        let e = world.create();
        assert!(world.is_alive(e));
        world.destroy(e).unwrap();
        assert!(!world.is_alive(e));
    }

    #[test]
    fn add_component_moves_entity_to_new_archetype() {
        let mut world = World::new();
        let e = world.create();
        let empty = world.entity_archetype(e).unwrap();
        let (id, value) = position_value(&mut world, 1.0, 2.0);
        world.add_component_raw(e, id, value).unwrap();
        assert_ne!(world.entity_archetype(e).unwrap(), empty);
        assert!(world.has_component_raw(e, id));
        unsafe {
            let ptr = world.get_component_raw(e, id).unwrap() as *const Position;
            assert_eq!((*ptr).x, 1.0);
        }
    }

    #[test]
    fn remove_component_returns_to_previous_shape() {
        let mut world = World::new();
        let e = world.create();
        let empty = world.entity_archetype(e).unwrap();
        let (id, value) = position_value(&mut world, 1.0, 2.0);
        world.add_component_raw(e, id, value).unwrap();
        world.remove_component_raw(e, id).unwrap();
        assert_eq!(world.entity_archetype(e).unwrap(), empty);
        assert!(!world.has_component_raw(e, id));
    }

    #[test]
    fn relate_then_related_roundtrips() {
        let mut world = World::new();
        let a = world.create();
        let b = world.create();
        let descriptor = Arc::new(TypeDescriptor::new("ChildOf", Constructible::of::<ChildOf>().with_default::<ChildOf>()));
        let ty = world.register_relation(descriptor.clone(), false, true).unwrap();
        let value = AnyValue::default_construct(descriptor).unwrap();
        world.relate(a, b, ty, value).unwrap();
        assert!(world.related(a, b, ty).is_some());
        world.unrelate(a, b, ty).unwrap();
        assert!(world.related(a, b, ty).is_none());
    }

    #[test]
    fn tree_relation_replaces_prior_outgoing_edge() {
        let mut world = World::new();
        let child = world.create();
        let parent_a = world.create();
        let parent_b = world.create();
        let descriptor = Arc::new(TypeDescriptor::new("ChildOf2", Constructible::of::<ChildOf>().with_default::<ChildOf>()));
        let ty = world.register_relation(descriptor.clone(), false, true).unwrap();

        world.relate(child, parent_a, ty, AnyValue::default_construct(descriptor.clone()).unwrap()).unwrap();
        world.relate(child, parent_b, ty, AnyValue::default_construct(descriptor).unwrap()).unwrap();

        assert!(world.related(child, parent_a, ty).is_none());
        assert!(world.related(child, parent_b, ty).is_some());
    }
}
</content>
