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

//! Runtime type descriptors and the traits attached to them.
//!
//! A [`TypeDescriptor`] lets the rest of the crate construct, copy, move,
//! destruct and introspect values whose concrete Rust type is not known at
//! the call site — the archetype tables, the query engine and the
//! blueprint loader all operate purely in terms of descriptors. Traits are
//! attached once at registration and looked up by kind; unlike Rust's own
//! `TypeId`, the descriptor's identity is its name, because blueprints and
//! the scheduler's tag graph both need to name types across a process
//! boundary (JSON, debug output) where `TypeId` is meaningless.

use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{EcsError, Result};

/// Size/alignment and the four lifecycle operations every
/// runtime-manipulated value needs. Any constructor may be absent; an
/// operation that needs a missing one fails with `MissingTrait` rather
/// than panicking.
pub struct Constructible {
    pub size: usize,
    pub align: usize,
    pub default_construct: Option<unsafe fn(*mut u8)>,
    pub copy_construct: Option<unsafe fn(*mut u8, *const u8)>,
    pub move_construct: Option<unsafe fn(*mut u8, *mut u8)>,
    pub destruct: unsafe fn(*mut u8),
}

impl Constructible {
    /// Builds a descriptor for any concrete `T`, the way the donor's
    /// `ComponentColumn` builds its `drop_fn` from the element type.
    pub fn of<T: 'static>() -> Self {
        unsafe fn default_fn<T: Default>(ptr: *mut u8) {
            std::ptr::write(ptr as *mut T, T::default());
        }
        unsafe fn copy_fn<T: Clone>(dst: *mut u8, src: *const u8) {
            let value = (*(src as *const T)).clone();
            std::ptr::write(dst as *mut T, value);
        }
        unsafe fn move_fn<T>(dst: *mut u8, src: *mut u8) {
            std::ptr::copy_nonoverlapping(src, dst, std::mem::size_of::<T>());
        }
        unsafe fn destruct_fn<T>(ptr: *mut u8) {
            std::ptr::drop_in_place(ptr as *mut T);
        }

        Self {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            default_construct: None,
            copy_construct: None,
            move_construct: Some(move_fn::<T>),
            destruct: destruct_fn::<T>,
        }
    }

    pub fn with_default<T: Default + 'static>(mut self) -> Self {
        unsafe fn default_fn<T: Default>(ptr: *mut u8) {
            std::ptr::write(ptr as *mut T, T::default());
        }
        self.default_construct = Some(default_fn::<T>);
        self
    }

    pub fn with_copy<T: Clone + 'static>(mut self) -> Self {
        unsafe fn copy_fn<T: Clone>(dst: *mut u8, src: *const u8) {
            let value = (*(src as *const T)).clone();
            std::ptr::write(dst as *mut T, value);
        }
        self.copy_construct = Some(copy_fn::<T>);
        self
    }

    pub fn is_default_constructible(&self) -> bool {
        self.default_construct.is_some()
    }
    pub fn is_copy_constructible(&self) -> bool {
        self.copy_construct.is_some()
    }
}

/// One field of a struct-shaped descriptor: its name, the descriptor of
/// its own type, and the byte offset within the containing value.
pub struct Field {
    pub name: String,
    pub type_name: String,
    pub offset: usize,
}

pub struct Fields {
    pub fields: Vec<Field>,
}

impl Fields {
    pub fn by_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Element type name, length, and element-address accessors for
/// array-shaped values (e.g. `AnyVector` itself, or a `Vec<T>` field).
pub struct ArrayTrait {
    pub element_type_name: String,
    pub len: unsafe fn(*const u8) -> usize,
    pub get: unsafe fn(*const u8, usize) -> *const u8,
    pub get_mut: unsafe fn(*mut u8, usize) -> *mut u8,
}

pub struct DictionaryTrait {
    pub key_type_name: String,
    pub value_type_name: String,
    pub len: unsafe fn(*const u8) -> usize,
}

pub struct EnumVariant {
    pub name: String,
    pub discriminant: u64,
}

pub struct EnumTrait {
    pub variants: Vec<EnumVariant>,
    pub discriminant_of: unsafe fn(*const u8) -> u64,
}

pub struct MaskTrait {
    pub bits: Vec<(String, u64)>,
}

pub struct StringConversionTrait {
    pub to_string: unsafe fn(*const u8) -> String,
    pub from_string: unsafe fn(*mut u8, &str) -> std::result::Result<(), String>,
}

pub struct NullableTrait {
    pub is_null: unsafe fn(*const u8) -> bool,
    pub set_null: unsafe fn(*mut u8),
}

pub struct InheritsTrait {
    pub parent_name: String,
}

/// Bridges a value to and from `serde_json::Value`, used only by the
/// blueprint/scene loader. Kept separate from `StringConversionTrait`
/// since most components want structured JSON (objects/arrays), not a
/// single string.
pub struct JsonTrait {
    pub to_json: unsafe fn(*const u8) -> serde_json::Value,
    pub from_json: unsafe fn(*mut u8, &serde_json::Value) -> Result<()>,
}

/// An opaque record carrying a unique name and the traits attached to it
/// at registration time.
pub struct TypeDescriptor {
    pub name: String,
    pub constructible: Constructible,
    pub fields: Option<Fields>,
    pub array: Option<ArrayTrait>,
    pub dictionary: Option<DictionaryTrait>,
    pub enum_trait: Option<EnumTrait>,
    pub mask: Option<MaskTrait>,
    pub string_conversion: Option<StringConversionTrait>,
    pub nullable: Option<NullableTrait>,
    pub inherits: Option<InheritsTrait>,
    pub json: Option<JsonTrait>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, constructible: Constructible) -> Self {
        Self {
            name: name.into(),
            constructible,
            fields: None,
            array: None,
            dictionary: None,
            enum_trait: None,
            mask: None,
            string_conversion: None,
            nullable: None,
            inherits: None,
            json: None,
        }
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_json(mut self, json: JsonTrait) -> Self {
        self.json = Some(json);
        self
    }
}

/// Builds a `JsonTrait` for any `T: Serialize + DeserializeOwned`, the
/// generic case for ordinary component structs in a blueprint.
pub fn json_trait<T>() -> JsonTrait
where
    T: serde::Serialize + serde::de::DeserializeOwned + 'static,
{
    unsafe fn to_json<T: serde::Serialize>(ptr: *const u8) -> serde_json::Value {
        serde_json::to_value(&*(ptr as *const T)).unwrap_or(serde_json::Value::Null)
    }
    unsafe fn from_json<T: serde::de::DeserializeOwned>(ptr: *mut u8, value: &serde_json::Value) -> Result<()> {
        let parsed: T = serde_json::from_value(value.clone())
            .map_err(|e| EcsError::FormatError(e.to_string()))?;
        std::ptr::write(ptr as *mut T, parsed);
        Ok(())
    }
    JsonTrait { to_json: to_json::<T>, from_json: from_json::<T> }
}

/// Structural equality of two values of the same descriptor: short-circuit
/// on a primitive `StringConversion` fallback comparison, else recurse
/// into `Fields`, else fail with `MissingTrait`.
///
/// # Safety
/// `a` and `b` must point to live, initialized values of the type `ty`
/// describes.
pub unsafe fn compare(registry: &TypeRegistry, ty: &TypeDescriptor, a: *const u8, b: *const u8) -> Result<bool> {
    if let Some(fields) = &ty.fields {
        for field in &fields.fields {
            let Some(field_ty) = registry.get(&field.type_name) else {
                return Err(EcsError::MissingTrait(format!("unregistered field type {}", field.type_name)));
            };
            let fa = a.add(field.offset);
            let fb = b.add(field.offset);
            if !compare(registry, &field_ty, fa, fb)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    if let Some(sc) = &ty.string_conversion {
        return Ok((sc.to_string)(a) == (sc.to_string)(b));
    }
    Err(EcsError::MissingTrait(format!("{} has no structural or string-conversion comparison", ty.name)))
}

/// A set of descriptors keyed by their globally unique name.
#[derive(Default)]
pub struct TypeRegistry {
    by_name: AHashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent if the same descriptor (by `Arc` identity) is
    /// registered twice; fails if a *different* descriptor with the same
    /// name is already present.
    pub fn insert(&mut self, descriptor: Arc<TypeDescriptor>) -> Result<()> {
        match self.by_name.get(&descriptor.name) {
            Some(existing) if Arc::ptr_eq(existing, &descriptor) => Ok(()),
            Some(_) => crate::error::setup_error(format!("duplicate type name: {}", descriptor.name)),
            None => {
                self.by_name.insert(descriptor.name.clone(), descriptor);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.by_name.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.by_name.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Lightweight helper for ordinary Rust structs/components: builds a
/// `TypeDescriptor` from `T`'s own type name with no `Fields` trait
/// attached. Types that want field introspection (for blueprint
/// serialization) build their descriptor with `with_fields` instead,
/// typically via the `#[derive(Reflect)]`-shaped `impl_reflect!` macro
/// kept for that purpose.
pub fn describe<T: Default + Clone + 'static>() -> TypeDescriptor {
    let name = std::any::type_name::<T>().to_string();
    let constructible = Constructible::of::<T>().with_default::<T>().with_copy::<T>();
    TypeDescriptor::new(name, constructible)
}

/// Implements `Fields` for a struct by listing `(name, field type name,
/// offset)` triples. Intended to be driven by a small macro at call
/// sites, mirroring the donor's `impl_reflect!(T, fields: [...])` texture
/// but producing data instead of trait-method overrides.
#[macro_export]
macro_rules! reflect_fields {
    ($t:ty { $($field:ident : $ty_name:expr),* $(,)? }) => {{
        let base = 0usize as *const $t;
        $crate::reflection::Fields {
            fields: vec![
                $($crate::reflection::Field {
                    name: stringify!($field).to_string(),
                    type_name: $ty_name.to_string(),
                    offset: unsafe { (std::ptr::addr_of!((*base).$field) as usize) - (base as usize) },
                }),*
            ],
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[test]
    fn register_is_idempotent_by_identity() {
        let mut registry = TypeRegistry::new();
        let descriptor = Arc::new(describe::<Position>());
        registry.insert(descriptor.clone()).unwrap();
        registry.insert(descriptor).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_name_distinct_descriptor_fails() {
        let mut registry = TypeRegistry::new();
        let a = Arc::new(TypeDescriptor::new("dup", Constructible::of::<i32>()));
        let b = Arc::new(TypeDescriptor::new("dup", Constructible::of::<i32>()));
        registry.insert(a).unwrap();
        assert!(registry.insert(b).is_err());
    }

    #[test]
    fn fields_compare_structurally() {
        let fields = reflect_fields!(Position { x: "f32", y: "f32" });
        assert_eq!(fields.fields.len(), 2);
        assert_eq!(fields.fields[0].name, "x");
    }
}
</content>
