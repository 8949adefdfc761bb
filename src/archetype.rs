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

//! Archetypes as interned sets of columns, plus the lattice of
//! single-column add/remove transitions between them.

use ahash::AHashMap;

use crate::types::DataTypeId;

/// Identifies a column within a table. For components this equals the
/// owning `DataTypeId`; sparse relation columns derive their id from
/// `(DataTypeId, target-index)` instead, since a single relation type can
/// have up to `MaxTargetCount` distinct per-target columns.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ColumnId(pub u64);

impl ColumnId {
    pub fn of_component(ty: DataTypeId) -> Self {
        ColumnId(ty.0 as u64)
    }

    pub fn of_relation_target(ty: DataTypeId, target_index: u32) -> Self {
        ColumnId(((ty.0 as u64) << 32) | target_index as u64)
    }
}

/// Interned identifier for an archetype (a set of columns). `EMPTY` is
/// guaranteed to exist in every `ArchetypeGraph` and denotes an entity
/// with no components.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ArchetypeId(pub u32);

impl ArchetypeId {
    pub const EMPTY: ArchetypeId = ArchetypeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Sorted, deduplicated column set: the canonical signature an
/// `ArchetypeGraph` interns by content hash.
pub type ArchetypeSignature = Vec<ColumnId>;

struct Node {
    signature: ArchetypeSignature,
    with_edges: AHashMap<ColumnId, ArchetypeId>,
    without_edges: AHashMap<ColumnId, ArchetypeId>,
}

/// The lattice of archetypes reachable from the empty archetype by
/// adding or removing single columns, with content-hash interning so
/// that any two paths to the same column set land on the same
/// `ArchetypeId`. Mirrors the donor's `World::archetype_index`
/// (signature -> id) paired with a `Vec<Archetype>` indexed by id, but
/// additionally caches the `with`/`without` transition edges so repeated
/// structural changes (e.g. a system that adds then removes the same
/// component every frame) are O(1) after the first traversal.
pub struct ArchetypeGraph {
    nodes: Vec<Node>,
    by_signature: AHashMap<ArchetypeSignature, ArchetypeId>,
}

impl ArchetypeGraph {
    pub fn new() -> Self {
        let empty_signature: ArchetypeSignature = Vec::new();
        let mut by_signature = AHashMap::default();
        by_signature.insert(empty_signature.clone(), ArchetypeId::EMPTY);
        Self {
            nodes: vec![Node { signature: empty_signature, with_edges: AHashMap::default(), without_edges: AHashMap::default() }],
            by_signature,
        }
    }

    pub fn empty_id(&self) -> ArchetypeId {
        ArchetypeId::EMPTY
    }

    fn intern(&mut self, signature: ArchetypeSignature) -> ArchetypeId {
        if let Some(&id) = self.by_signature.get(&signature) {
            return id;
        }
        let id = ArchetypeId(self.nodes.len() as u32);
        self.by_signature.insert(signature.clone(), id);
        self.nodes.push(Node { signature, with_edges: AHashMap::default(), without_edges: AHashMap::default() });
        id
    }

    /// Adds `column` to `id`'s signature. Idempotent when the column is
    /// already present.
    pub fn with(&mut self, id: ArchetypeId, column: ColumnId) -> ArchetypeId {
        if let Some(&cached) = self.nodes[id.index()].with_edges.get(&column) {
            return cached;
        }
        if self.contains(id, column) {
            self.nodes[id.index()].with_edges.insert(column, id);
            return id;
        }
        let mut signature = self.nodes[id.index()].signature.clone();
        let pos = signature.partition_point(|c| c.0 < column.0);
        signature.insert(pos, column);
        let result = self.intern(signature);
        self.nodes[id.index()].with_edges.insert(column, result);
        result
    }

    /// Removes `column` from `id`'s signature. Idempotent when the
    /// column is absent.
    pub fn without(&mut self, id: ArchetypeId, column: ColumnId) -> ArchetypeId {
        if let Some(&cached) = self.nodes[id.index()].without_edges.get(&column) {
            return cached;
        }
        if !self.contains(id, column) {
            self.nodes[id.index()].without_edges.insert(column, id);
            return id;
        }
        let mut signature = self.nodes[id.index()].signature.clone();
        signature.retain(|c| *c != column);
        let result = self.intern(signature);
        self.nodes[id.index()].without_edges.insert(column, result);
        result
    }

    pub fn columns(&self, id: ArchetypeId) -> impl Iterator<Item = ColumnId> + '_ {
        self.nodes[id.index()].signature.iter().copied()
    }

    pub fn contains(&self, id: ArchetypeId, column: ColumnId) -> bool {
        self.nodes[id.index()].signature.binary_search_by(|c| c.0.cmp(&column.0)).is_ok()
    }

    pub fn signature(&self, id: ArchetypeId) -> &[ColumnId] {
        &self.nodes[id.index()].signature
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ArchetypeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_columns_intern_to_same_id() {
        let mut graph = ArchetypeGraph::new();
        let a = graph.with(graph.empty_id(), ColumnId(1));
        let a = graph.with(a, ColumnId(2));

        let b = graph.with(graph.empty_id(), ColumnId(2));
        let b = graph.with(b, ColumnId(1));

        assert_eq!(a, b);
    }

    #[test]
    fn with_is_idempotent() {
        let mut graph = ArchetypeGraph::new();
        let a = graph.with(graph.empty_id(), ColumnId(5));
        let a2 = graph.with(a, ColumnId(5));
        assert_eq!(a, a2);
    }

    #[test]
    fn without_is_idempotent_when_absent() {
        let mut graph = ArchetypeGraph::new();
        let empty = graph.empty_id();
        assert_eq!(graph.without(empty, ColumnId(9)), empty);
    }

    #[test]
    fn with_then_without_returns_to_original() {
        let mut graph = ArchetypeGraph::new();
        let empty = graph.empty_id();
        let a = graph.with(empty, ColumnId(3));
        let back = graph.without(a, ColumnId(3));
        assert_eq!(back, empty);
    }
}
</content>
