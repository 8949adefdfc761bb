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

//! Dense, archetype-indexed storage: one [`DenseTable`] per archetype,
//! one [`AnyVector`] column per member of its signature. This is the
//! direct generalization of the donor's `Archetype`/`ComponentColumn`
//! pair in the now-removed `src/archetype.rs` content, with `ComponentColumn`
//! replaced by the type-erased `AnyVector` so a column can hold any
//! registered type, not just ones known at compile time.

use std::sync::Arc;

use ahash::AHashMap;

use crate::any_value::AnyVector;
use crate::archetype::{ArchetypeId, ColumnId};
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::reflection::TypeDescriptor;

/// One archetype's worth of rows: an ordered entity list and one
/// `AnyVector` per column, all the same length. Invariants enforced by
/// this type's API: every column vector has `entities.len()` elements;
/// each entity appears in `entities` at most once; row removal is
/// swap-erase, so row order is not stable across removals.
pub struct DenseTable {
    entities: Vec<Entity>,
    row_of: AHashMap<Entity, usize>,
    columns: AHashMap<ColumnId, AnyVector>,
}

impl DenseTable {
    pub fn new() -> Self {
        Self { entities: Vec::new(), row_of: AHashMap::default(), columns: AHashMap::default() }
    }

    pub fn add_column(&mut self, column: ColumnId, descriptor: Arc<TypeDescriptor>) {
        self.columns.entry(column).or_insert_with(|| AnyVector::new(descriptor));
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn row_of(&self, entity: Entity) -> Option<usize> {
        self.row_of.get(&entity).copied()
    }

    pub fn column(&self, column: ColumnId) -> Option<&AnyVector> {
        self.columns.get(&column)
    }

    pub fn column_mut(&mut self, column: ColumnId) -> Option<&mut AnyVector> {
        self.columns.get_mut(&column)
    }

    pub fn columns(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.columns.keys().copied()
    }

    /// Allocates a new row for `entity` with every column
    /// default-constructed. Callers typically overwrite the freshly
    /// added component's column right after via `column_mut`.
    pub fn allocate_row(&mut self, entity: Entity) -> Result<usize> {
        let row = self.entities.len();
        for vector in self.columns.values_mut() {
            vector.push_default().map_err(|_| {
                EcsError::MissingTrait(format!("{} has no default constructor for archetype insertion", vector.type_descriptor().name))
            })?;
        }
        self.entities.push(entity);
        self.row_of.insert(entity, row);
        Ok(row)
    }

    /// Removes `entity`'s row via swap-erase, returning the entity (if
    /// any) that was moved into the vacated row so its location can be
    /// updated by the caller.
    pub fn remove_row(&mut self, entity: Entity) -> Option<Entity> {
        let row = self.row_of.remove(&entity)?;
        let last = self.entities.len() - 1;
        for vector in self.columns.values_mut() {
            vector.swap_remove(row);
        }
        self.entities.swap_remove(row);
        if row != last {
            let moved = self.entities[row];
            self.row_of.insert(moved, row);
            Some(moved)
        } else {
            None
        }
    }

    /// Moves one row from `self` into `dst`, for every column `dst` also
    /// has. Columns present only in `self` are dropped with the vacated
    /// row. `inserted` supplies the value for a column that is new to
    /// `dst` (absent from `self`) — the caller (`World::add_component`)
    /// always knows this value up front, so no placeholder
    /// default-construction is needed for it.
    /// Returns the destination row and the entity swapped into `self`'s
    /// vacated slot, if any.
    pub fn move_row_to(
        &mut self,
        entity: Entity,
        dst: &mut DenseTable,
        mut inserted: Option<(ColumnId, crate::any_value::AnyValue)>,
    ) -> Result<(usize, Option<Entity>)> {
        let row = self.row_of.get(&entity).copied().ok_or(EcsError::InvalidEntity(entity))?;

        for (&column, dst_vector) in dst.columns.iter_mut() {
            let is_inserted_column = matches!(&inserted, Some((c, _)) if *c == column);
            if self.columns.contains_key(&column) {
                let src_vector = self.columns.get_mut(&column).unwrap();
                dst_vector.move_from(src_vector, row).map_err(|_| {
                    EcsError::MissingTrait(format!("{} is not move-constructible", dst_vector.type_descriptor().name))
                })?;
            } else if is_inserted_column {
                let (_, value) = inserted.take().unwrap();
                dst_vector.push_move(value).map_err(|_| {
                    EcsError::MissingTrait(format!("{} is not move-constructible", dst_vector.type_descriptor().name))
                })?;
            } else {
                dst_vector.push_default().map_err(|_| {
                    EcsError::MissingTrait(format!("{} has no default constructor for archetype insertion", dst_vector.type_descriptor().name))
                })?;
            }
        }
        let dst_row = dst.entities.len();
        dst.entities.push(entity);
        dst.row_of.insert(entity, dst_row);

        let swapped = self.remove_row_keep_columns(row);
        self.row_of.remove(&entity);
        Ok((dst_row, swapped))
    }

    /// Removes row `row` from every column (dropping values not already
    /// moved out by the caller) and from the entity list, swap-erase
    /// style.
    fn remove_row_keep_columns(&mut self, row: usize) -> Option<Entity> {
        let last = self.entities.len() - 1;
        for vector in self.columns.values_mut() {
            // Columns the caller already moved out of have one fewer
            // element than `self.entities` (shrunk by `move_from`'s
            // `swap_remove_forget`); only a column still at the full
            // entity count is still holding this row's value.
            if vector.len() == self.entities.len() {
                vector.swap_remove(row);
            }
        }
        self.entities.swap_remove(row);
        if row != last {
            let moved = self.entities[row];
            self.row_of.insert(moved, row);
            Some(moved)
        } else {
            None
        }
    }
}

impl Default for DenseTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns every `DenseTable` indexed by `ArchetypeId`, created lazily, plus
/// a reverse index from `ColumnId` to the set of archetypes that contain
/// it, used by the query engine to enumerate candidate tables without
/// scanning every archetype.
#[derive(Default)]
pub struct DenseTableRegistry {
    tables: AHashMap<ArchetypeId, DenseTable>,
    archetypes_with_column: AHashMap<ColumnId, Vec<ArchetypeId>>,
}

impl DenseTableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, id: ArchetypeId, columns: impl Iterator<Item = (ColumnId, Arc<TypeDescriptor>)>) -> &mut DenseTable {
        let is_new = !self.tables.contains_key(&id);
        let table = self.tables.entry(id).or_default();
        if is_new {
            for (column, descriptor) in columns {
                table.add_column(column, descriptor);
                self.archetypes_with_column.entry(column).or_default().push(id);
            }
        }
        self.tables.get_mut(&id).unwrap()
    }

    pub fn get(&self, id: ArchetypeId) -> Option<&DenseTable> {
        self.tables.get(&id)
    }

    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut DenseTable> {
        self.tables.get_mut(&id)
    }

    pub fn archetypes_with(&self, column: ColumnId) -> &[ArchetypeId] {
        self.archetypes_with_column.get(&column).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn archetype_count(&self) -> usize {
        self.tables.len()
    }

    /// Moves `entity`'s row from `src` to `dst`, both of which must
    /// already exist. Temporarily removes the `src` table from the map
    /// to get two independent `&mut DenseTable`s without unsafe
    /// aliasing, mirroring the donor's `split_at_mut` trick in
    /// `World::move_entity` but without relying on the two ids being
    /// orderable indices into one `Vec`.
    pub fn move_row(
        &mut self,
        src: ArchetypeId,
        dst: ArchetypeId,
        entity: Entity,
        inserted: Option<(ColumnId, crate::any_value::AnyValue)>,
    ) -> Result<(usize, Option<Entity>)> {
        let mut src_table = self.tables.remove(&src).ok_or(EcsError::ArchetypeNotFound)?;
        let result = (|| {
            let dst_table = self.tables.get_mut(&dst).ok_or(EcsError::ArchetypeNotFound)?;
            src_table.move_row_to(entity, dst_table, inserted)
        })();
        self.tables.insert(src, src_table);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::describe;

    #[derive(Clone, Default)]
    struct Position {
        x: f32,
    }

    #[test]
    fn allocate_and_remove_row() {
        let mut table = DenseTable::new();
        let descriptor = Arc::new(describe::<Position>());
        table.add_column(ColumnId(1), descriptor);
        let e = Entity { index: 0, generation: 0 };
        table.allocate_row(e).unwrap();
        assert_eq!(table.len(), 1);
        let swapped = table.remove_row(e);
        assert!(swapped.is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn move_row_preserves_shared_column_value() {
        let mut src = DenseTable::new();
        let mut dst = DenseTable::new();
        let descriptor = Arc::new(describe::<Position>());
        src.add_column(ColumnId(1), descriptor.clone());
        dst.add_column(ColumnId(1), descriptor);

        let e = Entity { index: 0, generation: 0 };
        src.allocate_row(e).unwrap();
        unsafe {
            let ptr = src.column_mut(ColumnId(1)).unwrap().get_mut(0).unwrap() as *mut Position;
            (*ptr).x = 42.0;
        }
        let (dst_row, swapped) = src.move_row_to(e, &mut dst, None).unwrap();
        assert!(swapped.is_none());
        assert_eq!(src.len(), 0);
        assert_eq!(dst.len(), 1);
        unsafe {
            let ptr = dst.column(ColumnId(1)).unwrap().get(dst_row).unwrap() as *const Position;
            assert_eq!((*ptr).x, 42.0);
        }
    }
}
</content>
