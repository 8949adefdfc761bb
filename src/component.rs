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

//! `Component` and `Bundle`: typed convenience layer over `World`'s
//! untyped, `DataTypeId`/`AnyValue` archetype API — registering each
//! type's descriptor from `Default` on first use, the same way
//! `World::register_component_type` already does for a single type.

use crate::entity::Entity;
use crate::error::Result;
use crate::world::World;

/// Marker trait for anything storable as a component. Blanket-implemented
/// for every type meeting `World::register_component_type`'s bound, so
/// ordinary `#[derive(Default)]` structs need no manual opt-in.
pub trait Component: Default + Send + Sync + 'static {}

impl<T: Default + Send + Sync + 'static> Component for T {}

/// A set of components inserted on one entity in a single call. Only
/// tuples implement this; a lone component is spawned as `(C,)`.
pub trait Bundle: Send + Sync + 'static {
    fn spawn_into(self, world: &mut World, entity: Entity) -> Result<()>;
}

macro_rules! impl_bundle {
    ($($T:ident),+) => {
        impl<$($T: Component),+> Bundle for ($($T,)+) {
            #[allow(non_snake_case)]
            fn spawn_into(self, world: &mut World, entity: Entity) -> Result<()> {
                let ($($T,)+) = self;
                $(world.add_component(entity, $T)?;)+
                Ok(())
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Default)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Clone, Copy, Default)]
    struct Velocity {
        dx: f32,
    }

    #[test]
    fn spawn_with_single_component() {
        let mut world = World::new();
        let entity = world.spawn((Position { x: 1.0, y: 2.0 },)).unwrap();
        let pos: &Position = world.get_component(entity).unwrap();
        assert_eq!(pos.x, 1.0);
        assert_eq!(pos.y, 2.0);
    }

    #[test]
    fn spawn_with_bundle_inserts_every_component() {
        let mut world = World::new();
        let entity = world.spawn((Position::default(), Velocity { dx: 3.0 })).unwrap();
        assert!(world.get_component::<Position>(entity).is_some());
        assert_eq!(world.get_component::<Velocity>(entity).unwrap().dx, 3.0);
    }
}
