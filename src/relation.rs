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

//! Sparse relation tables: edges between entities that are not worth
//! storing as dense per-archetype columns because most entities do not
//! participate in them. Grounded on `original_source`'s `SymmetricTrait`/
//! `TreeTrait` (`cubos/core/ecs/reflection.hpp`) rather than on anything
//! in the donor, which only ever modeled hierarchy through dense
//! `Parent`/`Children` components.

use ahash::AHashMap;

use crate::any_value::AnyValue;
use crate::archetype::ArchetypeId;
use crate::entity::Entity;
use crate::types::DataTypeId;

/// Identifies one sparse relation table by its data type and the pair of
/// archetypes it connects, plus tree depth (always 0 for non-tree
/// relations).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SparseRelationTableId {
    pub data_type: DataTypeId,
    pub from_archetype: ArchetypeId,
    pub to_archetype: ArchetypeId,
    pub depth: u32,
}

/// Canonical `(from, to)` ordering for a symmetric relation: lexicographic
/// by `(index, generation)`, so `relate(a, b, R)` and `relate(b, a, R)`
/// upsert the same row regardless of argument order.
pub fn symmetric_order(a: Entity, b: Entity) -> (Entity, Entity) {
    if (a.index, a.generation) <= (b.index, b.generation) {
        (a, b)
    } else {
        (b, a)
    }
}

struct Row {
    from: Entity,
    to: Entity,
    payload: AnyValue,
}

/// One `(from-archetype, to-archetype, depth)` bucket for a given
/// relation type. Rows are append-only with swap-erase removal, indexed
/// by `(from, to)` for O(1) lookup.
#[derive(Default)]
pub struct SparseRelationTable {
    rows: Vec<Row>,
    row_of: AHashMap<(Entity, Entity), usize>,
}

impl SparseRelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, from: Entity, to: Entity) -> Option<&AnyValue> {
        let row = *self.row_of.get(&(from, to))?;
        Some(&self.rows[row].payload)
    }

    pub fn upsert(&mut self, from: Entity, to: Entity, payload: AnyValue) {
        if let Some(&row) = self.row_of.get(&(from, to)) {
            self.rows[row].payload = payload;
            return;
        }
        let row = self.rows.len();
        self.row_of.insert((from, to), row);
        self.rows.push(Row { from, to, payload });
    }

    /// Removes the row, swap-erasing the last row into its place.
    pub fn remove(&mut self, from: Entity, to: Entity) -> bool {
        let Some(row) = self.row_of.remove(&(from, to)) else { return false };
        let last = self.rows.len() - 1;
        self.rows.swap_remove(row);
        if row != last {
            let moved = &self.rows[row];
            self.row_of.insert((moved.from, moved.to), row);
        }
        true
    }

    /// Removes every row touching `entity`, as either endpoint, used
    /// when an entity is destroyed.
    pub fn remove_entity(&mut self, entity: Entity) {
        let mut i = 0;
        while i < self.rows.len() {
            if self.rows[i].from == entity || self.rows[i].to == entity {
                let pair = (self.rows[i].from, self.rows[i].to);
                self.row_of.remove(&pair);
                let last = self.rows.len() - 1;
                self.rows.swap_remove(i);
                if i != last {
                    let moved = &self.rows[i];
                    self.row_of.insert((moved.from, moved.to), i);
                }
            } else {
                i += 1;
            }
        }
    }

    pub fn outgoing(&self, from: Entity) -> impl Iterator<Item = (Entity, &AnyValue)> {
        self.rows.iter().filter(move |r| r.from == from).map(|r| (r.to, &r.payload))
    }

    pub fn incoming(&self, to: Entity) -> impl Iterator<Item = (Entity, &AnyValue)> {
        self.rows.iter().filter(move |r| r.to == to).map(|r| (r.from, &r.payload))
    }
}

/// Owns every `SparseRelationTable`, plus per-`DataTypeId` indices by
/// from-archetype and to-archetype so the query engine can enumerate
/// candidate tables for a relation term without a linear scan.
#[derive(Default)]
pub struct SparseRelationTableRegistry {
    tables: AHashMap<SparseRelationTableId, SparseRelationTable>,
    by_from_archetype: AHashMap<(DataTypeId, ArchetypeId), Vec<SparseRelationTableId>>,
    by_to_archetype: AHashMap<(DataTypeId, ArchetypeId), Vec<SparseRelationTableId>>,
    max_depth: AHashMap<DataTypeId, u32>,
}

impl SparseRelationTableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, id: SparseRelationTableId) -> &mut SparseRelationTable {
        if !self.tables.contains_key(&id) {
            self.by_from_archetype.entry((id.data_type, id.from_archetype)).or_default().push(id);
            self.by_to_archetype.entry((id.data_type, id.to_archetype)).or_default().push(id);
            let max = self.max_depth.entry(id.data_type).or_insert(0);
            *max = (*max).max(id.depth);
            self.tables.insert(id, SparseRelationTable::new());
        }
        self.tables.get_mut(&id).unwrap()
    }

    pub fn get(&self, id: SparseRelationTableId) -> Option<&SparseRelationTable> {
        self.tables.get(&id)
    }

    pub fn get_mut(&mut self, id: SparseRelationTableId) -> Option<&mut SparseRelationTable> {
        self.tables.get_mut(&id)
    }

    pub fn tables_from(&self, data_type: DataTypeId, from_archetype: ArchetypeId) -> &[SparseRelationTableId] {
        self.by_from_archetype.get(&(data_type, from_archetype)).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn tables_to(&self, data_type: DataTypeId, to_archetype: ArchetypeId) -> &[SparseRelationTableId] {
        self.by_to_archetype.get(&(data_type, to_archetype)).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn max_depth(&self, data_type: DataTypeId) -> u32 {
        self.max_depth.get(&data_type).copied().unwrap_or(0)
    }

    /// Removes `entity` from every table of every relation type, as
    /// either endpoint.
    pub fn remove_entity_everywhere(&mut self, entity: Entity) {
        for table in self.tables.values_mut() {
            table.remove_entity(entity);
        }
    }

    /// Drops every table belonging to a removed data type.
    pub fn remove_type(&mut self, data_type: DataTypeId) {
        self.tables.retain(|id, _| id.data_type != data_type);
        self.by_from_archetype.retain(|(ty, _), _| *ty != data_type);
        self.by_to_archetype.retain(|(ty, _), _| *ty != data_type);
        self.max_depth.remove(&data_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::{describe, Constructible, TypeDescriptor};
    use std::sync::Arc;

    fn unit_payload() -> AnyValue {
        let descriptor = Arc::new(TypeDescriptor::new("unit", Constructible::of::<()>().with_default::<()>()));
        AnyValue::default_construct(descriptor).unwrap()
    }

    #[test]
    fn upsert_then_get_roundtrips() {
        let mut table = SparseRelationTable::new();
        let a = Entity { index: 0, generation: 0 };
        let b = Entity { index: 1, generation: 0 };
        table.upsert(a, b, unit_payload());
        assert!(table.get(a, b).is_some());
        assert!(table.get(b, a).is_none());
    }

    #[test]
    fn remove_entity_clears_both_directions() {
        let mut table = SparseRelationTable::new();
        let a = Entity { index: 0, generation: 0 };
        let b = Entity { index: 1, generation: 0 };
        let c = Entity { index: 2, generation: 0 };
        table.upsert(a, b, unit_payload());
        table.upsert(c, a, unit_payload());
        table.remove_entity(a);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn symmetric_order_is_stable_regardless_of_argument_order() {
        let a = Entity { index: 5, generation: 0 };
        let b = Entity { index: 2, generation: 0 };
        assert_eq!(symmetric_order(a, b), symmetric_order(b, a));
    }

    #[derive(Default, Clone)]
    struct _Unused;

    #[test]
    fn registry_tracks_max_depth_per_type() {
        let mut registry = SparseRelationTableRegistry::new();
        let ty = DataTypeId(0);
        registry.create(SparseRelationTableId { data_type: ty, from_archetype: ArchetypeId::EMPTY, to_archetype: ArchetypeId::EMPTY, depth: 0 });
        registry.create(SparseRelationTableId { data_type: ty, from_archetype: ArchetypeId::EMPTY, to_archetype: ArchetypeId::EMPTY, depth: 3 });
        assert_eq!(registry.max_depth(ty), 3);
        let _ = describe::<_Unused>();
    }
}
</content>
