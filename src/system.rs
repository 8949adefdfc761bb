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

//! System trait, access metadata and the fetcher protocol that lets a
//! system function declare its own arguments.
//!
//! Grounded on `original_source/core/include/cubos/core/ecs/system/fetcher.hpp`'s
//! `SystemFetcher<T>` (constructor taking world+options, `analyze`,
//! `fetch`), translated from a per-argument C++ template specialization
//! into a `Fetcher` trait with a generic associated `Item<'w>` so a
//! fetcher's state (e.g. an event reader's cursor) outlives any single
//! fetch call while the value it produces borrows the world for exactly
//! one system run.

use std::marker::PhantomData;

use crate::command::CommandBuffer;
use crate::error::{EcsError, Result};
use crate::event::Events;
use crate::query::{Query as CompiledQuery, Term};
use crate::time::DeltaTime;
use crate::types::DataTypeId;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub u32);

/// A system's declared data-access footprint, built up by each argument's
/// `Fetcher::analyze`. Two systems conflict (per §4.10) if either writes
/// a component/resource type the other reads or writes; command buffer
/// use never conflicts, since command buffers are serializable.
#[derive(Debug, Clone, Default)]
pub struct SystemAccess {
    pub reads: Vec<DataTypeId>,
    pub writes: Vec<DataTypeId>,
    pub resource_reads: Vec<DataTypeId>,
    pub resource_writes: Vec<DataTypeId>,
    pub uses_commands: bool,
}

impl SystemAccess {
    pub fn empty() -> Self {
        Self::default()
    }

    fn overlaps(a: &[DataTypeId], b: &[DataTypeId]) -> bool {
        a.iter().any(|x| b.contains(x))
    }

    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        Self::overlaps(&self.writes, &other.writes)
            || Self::overlaps(&self.writes, &other.reads)
            || Self::overlaps(&self.reads, &other.writes)
            || Self::overlaps(&self.resource_writes, &other.resource_writes)
            || Self::overlaps(&self.resource_writes, &other.resource_reads)
            || Self::overlaps(&self.resource_reads, &other.resource_writes)
    }
}

/// Extracts one system argument from the world. `Options` carries
/// per-registration configuration the fetcher needs before the first
/// frame (e.g. a `Query`'s term list); `State` is built once via `init`
/// and persists across every frame (e.g. an event reader's cursor).
pub trait Fetcher {
    type Options: Send + Sync + 'static;
    type State: Send + 'static;
    type Item<'w>;

    fn init(world: &World, options: &Self::Options) -> Result<Self::State>;
    fn analyze(world: &World, options: &Self::Options, access: &mut SystemAccess);
    fn fetch<'w>(world: &'w World, commands: &'w CommandBuffer, state: &'w mut Self::State) -> Self::Item<'w>;
}

/// Grants deferred mutation access; never conflicts with any other
/// argument.
pub struct Commands;

impl Fetcher for Commands {
    type Options = ();
    type State = ();
    type Item<'w> = &'w CommandBuffer;

    fn init(_world: &World, _options: &Self::Options) -> Result<Self::State> {
        Ok(())
    }

    fn analyze(_world: &World, _options: &Self::Options, access: &mut SystemAccess) {
        access.uses_commands = true;
    }

    fn fetch<'w>(_world: &'w World, commands: &'w CommandBuffer, _state: &'w mut Self::State) -> Self::Item<'w> {
        commands
    }
}

/// A compiled query argument: options are the term list, state is the
/// compiled `query::Query`, the fetched item is a thin view borrowing
/// both the world and the compiled plan.
pub struct QueryArg;

pub struct QueryView<'w> {
    world: &'w World,
    query: &'w CompiledQuery,
}

impl<'w> QueryView<'w> {
    pub fn rows(&self) -> Vec<ahash::AHashMap<u8, crate::entity::Entity>> {
        self.query.rows(self.world)
    }

    pub fn pin(&self, target: u8, entity: crate::entity::Entity) -> Vec<ahash::AHashMap<u8, crate::entity::Entity>> {
        self.query.pin(self.world, target, entity)
    }
}

impl Fetcher for QueryArg {
    type Options = Vec<Term>;
    type State = CompiledQuery;
    type Item<'w> = QueryView<'w>;

    fn init(world: &World, options: &Self::Options) -> Result<Self::State> {
        Ok(CompiledQuery::new(world, options.clone()))
    }

    fn analyze(_world: &World, options: &Self::Options, access: &mut SystemAccess) {
        for term in options {
            if let Term::Component { ty, access: term_access, .. } = term {
                match term_access {
                    crate::query::Access::Read => access.reads.push(*ty),
                    crate::query::Access::Write => access.writes.push(*ty),
                }
            }
        }
    }

    fn fetch<'w>(world: &'w World, _commands: &'w CommandBuffer, state: &'w mut Self::State) -> Self::Item<'w> {
        QueryView { world, query: state }
    }
}

/// Read-only resource access. `T` must already be registered via
/// `World::register_resource_type` before the owning system is built.
pub struct Res<T>(PhantomData<T>);

impl<T: 'static> Fetcher for Res<T> {
    type Options = ();
    type State = DataTypeId;
    type Item<'w> = &'w T;

    fn init(world: &World, _options: &Self::Options) -> Result<Self::State> {
        world.resource_id_of::<T>().ok_or_else(|| EcsError::ResourceNotFound(std::any::type_name::<T>().to_string()))
    }

    fn analyze(world: &World, _options: &Self::Options, access: &mut SystemAccess) {
        if let Some(id) = world.resource_id_of::<T>() {
            access.resource_reads.push(id);
        }
    }

    fn fetch<'w>(world: &'w World, _commands: &'w CommandBuffer, state: &'w mut Self::State) -> Self::Item<'w> {
        let ptr = world.resource(*state).expect("resource present (validated at schedule build)");
        unsafe { &*(ptr as *const T) }
    }
}

/// Mutable resource access.
pub struct ResMut<T>(PhantomData<T>);

impl<T: 'static> Fetcher for ResMut<T> {
    type Options = ();
    type State = DataTypeId;
    type Item<'w> = &'w mut T;

    fn init(world: &World, _options: &Self::Options) -> Result<Self::State> {
        world.resource_id_of::<T>().ok_or_else(|| EcsError::ResourceNotFound(std::any::type_name::<T>().to_string()))
    }

    fn analyze(world: &World, _options: &Self::Options, access: &mut SystemAccess) {
        if let Some(id) = world.resource_id_of::<T>() {
            access.resource_writes.push(id);
        }
    }

    fn fetch<'w>(world: &'w World, _commands: &'w CommandBuffer, state: &'w mut Self::State) -> Self::Item<'w> {
        // `World` is shared (`&'w World`) during a system run; resources
        // are handed out as raw pointers and mutability is enforced by
        // the scheduler's conflict analysis, not the borrow checker, the
        // same trust boundary `get_component_raw_mut` relies on.
        let ptr = world.resource(*state).expect("resource present (validated at schedule build)") as *mut u8;
        unsafe { &mut *(ptr as *mut T) }
    }
}

/// Reads events of type `T` sent since this reader's last run. The
/// cursor lives in `State`, so readers registered at different times
/// each see only events sent after their own registration onward.
pub struct EventReader<T>(PhantomData<T>);

pub struct EventReaderHandle<'w, T> {
    events: Option<&'w Events<T>>,
    cursor: &'w mut u64,
}

impl<'w, T> EventReaderHandle<'w, T> {
    pub fn read(&mut self) -> Vec<&'w T> {
        let Some(events) = self.events else { return Vec::new() };
        let (iter, next_cursor) = events.read_from(*self.cursor);
        let items: Vec<&'w T> = iter.collect();
        *self.cursor = next_cursor;
        items
    }
}

impl<T: Send + Sync + 'static> Fetcher for EventReader<T> {
    type Options = ();
    type State = u64;
    type Item<'w> = EventReaderHandle<'w, T>;

    fn init(_world: &World, _options: &Self::Options) -> Result<Self::State> {
        Ok(0)
    }

    fn analyze(_world: &World, _options: &Self::Options, _access: &mut SystemAccess) {}

    fn fetch<'w>(world: &'w World, _commands: &'w CommandBuffer, state: &'w mut Self::State) -> Self::Item<'w> {
        EventReaderHandle { events: world.events().channel::<T>(), cursor: state }
    }
}

/// Writes events of type `T`. Since `Events<T>` lives behind `&World`
/// (not `&mut World`) during a system run, sends are queued through the
/// command buffer and applied when it commits.
pub struct EventWriter<T>(PhantomData<T>);

pub struct EventWriterHandle<'w, T> {
    commands: &'w CommandBuffer,
    _marker: PhantomData<T>,
}

impl<'w, T: Send + Sync + 'static> EventWriterHandle<'w, T> {
    pub fn send(&self, event: T) {
        self.commands.push(move |world| {
            world.events_mut().channel_mut::<T>().send(event);
            Ok(())
        });
    }
}

impl<T: Send + Sync + 'static> Fetcher for EventWriter<T> {
    type Options = ();
    type State = ();
    type Item<'w> = EventWriterHandle<'w, T>;

    fn init(_world: &World, _options: &Self::Options) -> Result<Self::State> {
        Ok(())
    }

    fn analyze(_world: &World, _options: &Self::Options, access: &mut SystemAccess) {
        access.uses_commands = true;
    }

    fn fetch<'w>(_world: &'w World, commands: &'w CommandBuffer, _state: &'w mut Self::State) -> Self::Item<'w> {
        EventWriterHandle { commands, _marker: PhantomData }
    }
}

/// Convenience fetcher for the reserved `DeltaTime` resource; a thin
/// wrapper over `Res<DeltaTime>` so systems don't need to register it
/// themselves (`App::new` inserts it before the first frame).
pub struct DeltaTimeArg;

impl Fetcher for DeltaTimeArg {
    type Options = ();
    type State = DataTypeId;
    type Item<'w> = &'w DeltaTime;

    fn init(world: &World, options: &Self::Options) -> Result<Self::State> {
        Res::<DeltaTime>::init(world, options)
    }

    fn analyze(_world: &World, _options: &Self::Options, access: &mut SystemAccess) {
        // DeltaTime is read by virtually every system; excluding it from
        // the conflict matrix would be wrong (two writers would race),
        // but there is exactly one writer (the scheduler's frame driver)
        // and it is applied outside any layer, so no reads need recording.
    }

    fn fetch<'w>(world: &'w World, commands: &'w CommandBuffer, state: &'w mut Self::State) -> Self::Item<'w> {
        Res::<DeltaTime>::fetch(world, commands, state)
    }
}

/// A system: a debug name, its declared access, and a boxed run
/// function closing over its own fetcher states.
pub trait System: Send {
    fn name(&self) -> &str;
    fn access(&self) -> &SystemAccess;
    fn run<'w>(&mut self, world: &'w World, commands: &'w CommandBuffer) -> Result<()>;
}

pub type BoxedSystem = Box<dyn System>;

/// Wraps a function together with its arguments' combined fetcher
/// state. `Fetchers` is a single `Fetcher` impl or, via
/// `impl_fetcher_tuple!`, a tuple of them.
pub struct FunctionSystem<F, Fetchers: Fetcher> {
    name: &'static str,
    access: SystemAccess,
    func: F,
    state: Fetchers::State,
}

impl Fetcher for () {
    type Options = ();
    type State = ();
    type Item<'w> = ();

    fn init(_world: &World, _options: &Self::Options) -> Result<Self::State> {
        Ok(())
    }

    fn analyze(_world: &World, _options: &Self::Options, _access: &mut SystemAccess) {}

    fn fetch<'w>(_world: &'w World, _commands: &'w CommandBuffer, _state: &'w mut Self::State) -> Self::Item<'w> {}
}

macro_rules! impl_fetcher_tuple {
    ($($ty:ident $opt:ident $st:ident),+) => {
        impl<$($ty: Fetcher),+> Fetcher for ($($ty,)+) {
            type Options = ($($ty::Options,)+);
            type State = ($($ty::State,)+);
            type Item<'w> = ($($ty::Item<'w>,)+);

            #[allow(non_snake_case)]
            fn init(world: &World, options: &Self::Options) -> Result<Self::State> {
                let ($($opt,)+) = options;
                Ok(($($ty::init(world, $opt)?,)+))
            }

            #[allow(non_snake_case)]
            fn analyze(world: &World, options: &Self::Options, access: &mut SystemAccess) {
                let ($($opt,)+) = options;
                $($ty::analyze(world, $opt, access);)+
            }

            #[allow(non_snake_case)]
            fn fetch<'w>(world: &'w World, commands: &'w CommandBuffer, state: &'w mut Self::State) -> Self::Item<'w> {
                let ($($st,)+) = state;
                ($($ty::fetch(world, commands, $st),)+)
            }
        }
    };
}

impl_fetcher_tuple!(A oa sa);
impl_fetcher_tuple!(A oa sa, B ob sb);
impl_fetcher_tuple!(A oa sa, B ob sb, C oc sc);
impl_fetcher_tuple!(A oa sa, B ob sb, C oc sc, D od sd);
impl_fetcher_tuple!(A oa sa, B ob sb, C oc sc, D od sd, E oe se);

impl<F, Fetchers> System for FunctionSystem<F, Fetchers>
where
    Fetchers: Fetcher + Send + 'static,
    for<'w> F: FnMut(Fetchers::Item<'w>) -> Result<()> + Send,
{
    fn name(&self) -> &str {
        self.name
    }

    fn access(&self) -> &SystemAccess {
        &self.access
    }

    fn run<'w>(&mut self, world: &'w World, commands: &'w CommandBuffer) -> Result<()> {
        let item = Fetchers::fetch(world, commands, &mut self.state);
        (self.func)(item)
    }
}

/// Builds a [`FunctionSystem`] by running every argument fetcher's
/// `init` against `world`, then recording its combined access.
pub fn build_system<F, Fetchers>(world: &World, name: &'static str, options: Fetchers::Options, func: F) -> Result<BoxedSystem>
where
    Fetchers: Fetcher + Send + 'static,
    for<'w> F: FnMut(Fetchers::Item<'w>) -> Result<()> + Send + 'static,
{
    let state = Fetchers::init(world, &options)?;
    let mut access = SystemAccess::empty();
    Fetchers::analyze(world, &options, &mut access);
    Ok(Box::new(FunctionSystem { name, access, func, state }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConditionId(pub u32);

/// A boolean-returning system, used to gate a tag's stage or drive a
/// `repeat` loop. Evaluated single-threaded, before the stage's systems,
/// and cached for the stage per §4.10.
pub trait Condition: Send {
    fn name(&self) -> &str;
    fn access(&self) -> &SystemAccess;
    fn evaluate<'w>(&mut self, world: &'w World, commands: &'w CommandBuffer) -> Result<bool>;
}

pub type BoxedCondition = Box<dyn Condition>;

pub struct FunctionCondition<F, Fetchers: Fetcher> {
    name: &'static str,
    access: SystemAccess,
    func: F,
    state: Fetchers::State,
}

impl<F, Fetchers> Condition for FunctionCondition<F, Fetchers>
where
    Fetchers: Fetcher + Send + 'static,
    for<'w> F: FnMut(Fetchers::Item<'w>) -> Result<bool> + Send,
{
    fn name(&self) -> &str {
        self.name
    }

    fn access(&self) -> &SystemAccess {
        &self.access
    }

    fn evaluate<'w>(&mut self, world: &'w World, commands: &'w CommandBuffer) -> Result<bool> {
        let item = Fetchers::fetch(world, commands, &mut self.state);
        (self.func)(item)
    }
}

pub fn build_condition<F, Fetchers>(world: &World, name: &'static str, options: Fetchers::Options, func: F) -> Result<BoxedCondition>
where
    Fetchers: Fetcher + Send + 'static,
    for<'w> F: FnMut(Fetchers::Item<'w>) -> Result<bool> + Send + 'static,
{
    let state = Fetchers::init(world, &options)?;
    let mut access = SystemAccess::empty();
    Fetchers::analyze(world, &options, &mut access);
    Ok(Box::new(FunctionCondition { name, access, func, state }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_access_write_write_conflicts() {
        let mut a = SystemAccess::empty();
        a.writes.push(DataTypeId(0));
        let mut b = SystemAccess::empty();
        b.writes.push(DataTypeId(0));
        assert!(a.conflicts_with(&b));
    }

    #[test]
    fn system_access_read_read_does_not_conflict() {
        let mut a = SystemAccess::empty();
        a.reads.push(DataTypeId(0));
        let mut b = SystemAccess::empty();
        b.reads.push(DataTypeId(0));
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn commands_only_systems_never_conflict_by_command_use() {
        let mut a = SystemAccess::empty();
        a.uses_commands = true;
        let mut b = SystemAccess::empty();
        b.uses_commands = true;
        assert!(!a.conflicts_with(&b));
    }
}
