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

//! Allocation of small, dense [`DataTypeId`]s to registered type
//! descriptors, and their classification as components, relations or
//! resources. Archetype columns, the scheduler's access bitmaps and the
//! relation table registry all index by `DataTypeId` rather than by name,
//! since a `u32` is cheap to put in a `BitSet` or use as a hash-map key
//! where a `String` is not.

use std::sync::Arc;

use ahash::AHashMap;

use crate::error::Result;
use crate::reflection::TypeDescriptor;

/// A dense index into the type table, distinct from both `DataTypeId` in
/// the originating reflection system and Rust's own `std::any::TypeId`:
/// it is assigned in registration order and reused as an array index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct DataTypeId(pub u32);

impl DataTypeId {
    pub const INVALID: DataTypeId = DataTypeId(u32::MAX);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Classification and relation-shape bits attached at registration,
/// mirroring the donor's `SymmetricTrait`/`TreeTrait`/`EphemeralTrait`
/// marker types but stored as flags instead of separate trait impls,
/// since a type's classification never changes after registration.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TypeFlags(u8);

impl TypeFlags {
    pub const COMPONENT: TypeFlags = TypeFlags(0b0000_0001);
    pub const RELATION: TypeFlags = TypeFlags(0b0000_0010);
    pub const RESOURCE: TypeFlags = TypeFlags(0b0000_0100);
    pub const SYMMETRIC: TypeFlags = TypeFlags(0b0000_1000);
    pub const TREE: TypeFlags = TypeFlags(0b0001_0000);
    pub const EPHEMERAL: TypeFlags = TypeFlags(0b0010_0000);

    pub fn contains(self, other: TypeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for TypeFlags {
    type Output = TypeFlags;
    fn bitor(self, rhs: TypeFlags) -> TypeFlags {
        TypeFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for TypeFlags {
    fn bitor_assign(&mut self, rhs: TypeFlags) {
        self.0 |= rhs.0;
    }
}

struct Entry {
    descriptor: Arc<TypeDescriptor>,
    flags: TypeFlags,
}

/// Central registry mapping every registered type to a `DataTypeId` and
/// its classification, alongside the name-keyed descriptor table in
/// [`crate::reflection::TypeRegistry`].
#[derive(Default)]
pub struct Types {
    entries: Vec<Entry>,
    by_name: AHashMap<String, DataTypeId>,
}

impl Types {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, descriptor: Arc<TypeDescriptor>, flags: TypeFlags) -> Result<DataTypeId> {
        if let Some(&id) = self.by_name.get(&descriptor.name) {
            return Ok(id);
        }
        let id = DataTypeId(self.entries.len() as u32);
        self.by_name.insert(descriptor.name.clone(), id);
        self.entries.push(Entry { descriptor, flags });
        Ok(id)
    }

    pub fn add_component(&mut self, descriptor: Arc<TypeDescriptor>) -> Result<DataTypeId> {
        self.insert(descriptor, TypeFlags::COMPONENT)
    }

    pub fn add_relation(&mut self, descriptor: Arc<TypeDescriptor>, symmetric: bool, tree: bool) -> Result<DataTypeId> {
        let mut flags = TypeFlags::RELATION;
        if symmetric {
            flags |= TypeFlags::SYMMETRIC;
        }
        if tree {
            flags |= TypeFlags::TREE;
        }
        self.insert(descriptor, flags)
    }

    pub fn add_resource(&mut self, descriptor: Arc<TypeDescriptor>) -> Result<DataTypeId> {
        self.insert(descriptor, TypeFlags::RESOURCE)
    }

    pub fn id_of(&self, name: &str) -> Option<DataTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn descriptor(&self, id: DataTypeId) -> Option<&Arc<TypeDescriptor>> {
        self.entries.get(id.index()).map(|e| &e.descriptor)
    }

    pub fn flags(&self, id: DataTypeId) -> Option<TypeFlags> {
        self.entries.get(id.index()).map(|e| e.flags)
    }

    pub fn is_component(&self, id: DataTypeId) -> bool {
        self.flags(id).is_some_and(|f| f.contains(TypeFlags::COMPONENT))
    }

    pub fn is_relation(&self, id: DataTypeId) -> bool {
        self.flags(id).is_some_and(|f| f.contains(TypeFlags::RELATION))
    }

    pub fn is_symmetric(&self, id: DataTypeId) -> bool {
        self.flags(id).is_some_and(|f| f.contains(TypeFlags::SYMMETRIC))
    }

    pub fn is_tree(&self, id: DataTypeId) -> bool {
        self.flags(id).is_some_and(|f| f.contains(TypeFlags::TREE))
    }

    pub fn is_resource(&self, id: DataTypeId) -> bool {
        self.flags(id).is_some_and(|f| f.contains(TypeFlags::RESOURCE))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::describe;

    #[derive(Clone, Default)]
    struct Position {
        _x: f32,
    }

    #[derive(Clone, Default)]
    struct ChildOf;

    #[test]
    fn component_registration_is_idempotent() {
        let mut types = Types::new();
        let descriptor = Arc::new(describe::<Position>());
        let a = types.add_component(descriptor.clone()).unwrap();
        let b = types.add_component(descriptor).unwrap();
        assert_eq!(a, b);
        assert!(types.is_component(a));
    }

    #[test]
    fn relation_carries_symmetric_and_tree_flags() {
        let mut types = Types::new();
        let descriptor = Arc::new(describe::<ChildOf>());
        let id = types.add_relation(descriptor, false, true).unwrap();
        assert!(types.is_relation(id));
        assert!(types.is_tree(id));
        assert!(!types.is_symmetric(id));
    }
}
</content>
