//! The application: owns the `World`, a startup tag graph run once and a
//! main tag graph run every frame, and drives both through the executor.
//! Grounded on the donor's `App`/`HotReloadApp` pair, with the hot-reload
//! half dropped (out of scope) and `Schedule`/`SystemRegistry` swapped in
//! for the donor's single flat `schedule: Schedule`.

use ahash::AHashSet;

use crate::entity::Entity;
use crate::error::{setup_error, Result};
use crate::executor::{run_schedule, SystemProfiler};
use crate::observer::ObserverFn;
use crate::plugin::Plugin;
use crate::reflection::{Constructible, TypeDescriptor};
use crate::schedule::{Schedule, SystemRegistry, TagGraph, TagId};
use crate::system::{build_condition, build_system, ConditionId, Fetcher, SystemId};
use crate::time::{Arguments, DeltaTime, FixedTime, ShouldQuit, Time};
use crate::types::DataTypeId;
use crate::world::World;

pub struct App {
    pub world: World,
    startup_tags: TagGraph,
    startup_registry: SystemRegistry,
    tags: TagGraph,
    registry: SystemRegistry,
    installed_plugins: AHashSet<&'static str>,
    profiler: SystemProfiler,
}

impl App {
    /// A fresh app with the reserved resources (`DeltaTime`, `ShouldQuit`,
    /// `Arguments`, `Time`, `FixedTime`) already seeded, `Arguments` read
    /// from the process's actual command line. Also installs the global
    /// `tracing` subscriber, if one isn't already set, so fatal and
    /// suppressed errors (`error::setup_error`/`log_suppressed`) reach a
    /// destination by default instead of being silently dropped.
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt().json().try_init();

        let mut world = World::new();
        world.insert_resource_value(DeltaTime::default()).expect("reserved resource registers cleanly");
        world.insert_resource_value(ShouldQuit::default()).expect("reserved resource registers cleanly");
        world
            .insert_resource_value(Arguments { values: std::env::args().collect() })
            .expect("reserved resource registers cleanly");
        world.insert_resource_value(Time::new()).expect("reserved resource registers cleanly");
        world.insert_resource_value(FixedTime::default()).expect("reserved resource registers cleanly");

        Self {
            world,
            startup_tags: TagGraph::new(),
            startup_registry: SystemRegistry::new(),
            tags: TagGraph::new(),
            registry: SystemRegistry::new(),
            installed_plugins: AHashSet::default(),
            profiler: SystemProfiler::new(),
        }
    }

    /// Installs `plugin`, idempotently: a second call with a plugin of the
    /// same `name()` is a no-op. Fails if a declared dependency hasn't been
    /// installed yet, which makes a true dependency cycle impossible —
    /// whichever plugin in the cycle runs first will always find the other
    /// missing.
    pub fn plugin<P: Plugin>(&mut self, plugin: P) -> Result<&mut Self> {
        let name = plugin.name();
        if self.installed_plugins.contains(name) {
            return Ok(self);
        }
        for dep in plugin.dependencies() {
            if !self.installed_plugins.contains(dep) {
                return setup_error(format!("plugin '{name}' depends on '{dep}', which is not installed"));
            }
        }
        self.installed_plugins.insert(name);
        plugin.build(self)?;
        Ok(self)
    }

    pub fn component<T: Default + Send + Sync + 'static>(&mut self) -> Result<&mut Self> {
        self.world.register_component_type::<T>()?;
        Ok(self)
    }

    pub fn resource<T: Default + Send + Sync + 'static>(&mut self) -> Result<&mut Self> {
        self.world.register_resource_type::<T>()?;
        Ok(self)
    }

    /// Registers a relation type. `symmetric` and `tree` mirror the two
    /// relation flavors `Types::add_relation` understands.
    pub fn relation<T: 'static>(&mut self, symmetric: bool, tree: bool) -> Result<&mut Self> {
        let name = std::any::type_name::<T>();
        if self.world.types().id_of(name).is_none() {
            let constructible = Constructible::of::<T>();
            let descriptor = std::sync::Arc::new(TypeDescriptor::new(name, constructible));
            self.world.register_relation(descriptor, symmetric, tree)?;
        }
        Ok(self)
    }

    pub fn startup_tag(&mut self, name: &str) -> TagBuilder<'_> {
        let id = self.startup_tags.tag(name);
        TagBuilder { graph: &mut self.startup_tags, id }
    }

    pub fn tag(&mut self, name: &str) -> TagBuilder<'_> {
        let id = self.tags.tag(name);
        TagBuilder { graph: &mut self.tags, id }
    }

    pub fn startup_system(&mut self, tag: TagId, name: &'static str) -> SystemBuilder<'_> {
        SystemBuilder { world: &self.world, registry: &mut self.startup_registry, tag, name }
    }

    pub fn system(&mut self, tag: TagId, name: &'static str) -> SystemBuilder<'_> {
        SystemBuilder { world: &self.world, registry: &mut self.registry, tag, name }
    }

    pub fn startup_condition(&mut self, name: &'static str) -> ConditionBuilder<'_> {
        ConditionBuilder { world: &self.world, registry: &mut self.startup_registry, name }
    }

    pub fn condition(&mut self, name: &'static str) -> ConditionBuilder<'_> {
        ConditionBuilder { world: &self.world, registry: &mut self.registry, name }
    }

    pub fn observer(&mut self, _name: &'static str) -> ObserverBuilder<'_> {
        ObserverBuilder { world: &mut self.world }
    }

    /// Compiles both schedules, runs the startup schedule exactly once,
    /// then loops the main schedule until a system sets `ShouldQuit.flag`.
    pub fn run(&mut self) -> Result<()> {
        let startup = Schedule::compile(&self.startup_registry, &self.startup_tags, &[])?;
        run_schedule(&startup, &mut self.startup_registry, &mut self.world, &mut self.profiler)?;

        let main = Schedule::compile(&self.registry, &self.tags, &[])?;
        loop {
            self.tick_time();
            run_schedule(&main, &mut self.registry, &mut self.world, &mut self.profiler)?;
            if self.world.resource_typed::<ShouldQuit>().is_some_and(|q| q.flag) {
                break;
            }
        }
        Ok(())
    }

    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }

    fn tick_time(&mut self) {
        if let Some(time) = self.world.resource_mut_typed::<Time>() {
            time.update();
        }
        let (value, scale) = self
            .world
            .resource_typed::<Time>()
            .map(|t| (t.delta_seconds(), t.time_scale()))
            .unwrap_or((0.0, 1.0));
        if let Some(dt) = self.world.resource_mut_typed::<DeltaTime>() {
            *dt = DeltaTime { value, scale };
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Chainable tag configuration, borrowed from whichever `TagGraph`
/// (startup or main) the tag was created in.
pub struct TagBuilder<'a> {
    graph: &'a mut TagGraph,
    id: TagId,
}

impl<'a> TagBuilder<'a> {
    pub fn id(&self) -> TagId {
        self.id
    }

    pub fn before(self, other: TagId) -> Self {
        self.graph.before(self.id, other);
        self
    }

    pub fn after(self, other: TagId) -> Self {
        self.graph.after(self.id, other);
        self
    }

    pub fn tagged(self, parent: TagId) -> Self {
        self.graph.inherit(self.id, parent);
        self
    }

    pub fn repeat(self, condition: ConditionId) -> Self {
        self.graph.repeat(self.id, condition);
        self
    }

    pub fn gate(self, condition: ConditionId) -> Self {
        self.graph.gate(self.id, condition);
        self
    }
}

/// Finalizes a system by running its fetchers' `init` against the world
/// and registering the built system under the chosen tag. `Fetchers` is
/// named explicitly at the call site (e.g. `.call::<_, (Commands, Res<Foo>)>(...)`)
/// rather than inferred from the closure's argument types, the same
/// explicit-parameter shape `build_system` itself already requires.
pub struct SystemBuilder<'a> {
    world: &'a World,
    registry: &'a mut SystemRegistry,
    tag: TagId,
    name: &'static str,
}

impl<'a> SystemBuilder<'a> {
    pub fn call<F, Fetchers>(self, options: Fetchers::Options, func: F) -> Result<SystemId>
    where
        Fetchers: Fetcher + Send + 'static,
        for<'w> F: FnMut(Fetchers::Item<'w>) -> Result<()> + Send + 'static,
    {
        let system = build_system::<F, Fetchers>(self.world, self.name, options, func)?;
        Ok(self.registry.register_system(self.tag, system))
    }
}

pub struct ConditionBuilder<'a> {
    world: &'a World,
    registry: &'a mut SystemRegistry,
    name: &'static str,
}

impl<'a> ConditionBuilder<'a> {
    pub fn call<F, Fetchers>(self, options: Fetchers::Options, func: F) -> Result<ConditionId>
    where
        Fetchers: Fetcher + Send + 'static,
        for<'w> F: FnMut(Fetchers::Item<'w>) -> Result<bool> + Send + 'static,
    {
        let condition = build_condition::<F, Fetchers>(self.world, self.name, options, func)?;
        Ok(self.registry.register_condition(condition))
    }
}

pub struct ObserverBuilder<'a> {
    world: &'a mut World,
}

impl<'a> ObserverBuilder<'a> {
    pub fn on_add<C: Default + Send + Sync + 'static>(self) -> Result<TypedObserverBuilder<'a>> {
        let ty = self.world.register_component_type::<C>()?;
        Ok(TypedObserverBuilder { world: self.world, ty, channel: ObserverChannel::Add })
    }

    pub fn on_remove<C: Default + Send + Sync + 'static>(self) -> Result<TypedObserverBuilder<'a>> {
        let ty = self.world.register_component_type::<C>()?;
        Ok(TypedObserverBuilder { world: self.world, ty, channel: ObserverChannel::Remove })
    }

    pub fn on_destroy(self) -> DestroyObserverBuilder<'a> {
        DestroyObserverBuilder { world: self.world }
    }
}

enum ObserverChannel {
    Add,
    Remove,
}

pub struct TypedObserverBuilder<'a> {
    world: &'a mut World,
    ty: DataTypeId,
    channel: ObserverChannel,
}

impl<'a> TypedObserverBuilder<'a> {
    pub fn call<F: Fn(&mut World, Entity) + Send + Sync + 'static>(self, f: F) {
        let f: ObserverFn = Box::new(f);
        match self.channel {
            ObserverChannel::Add => self.world.observers_mut().on_add(self.ty, f),
            ObserverChannel::Remove => self.world.observers_mut().on_remove(self.ty, f),
        }
    }
}

pub struct DestroyObserverBuilder<'a> {
    world: &'a mut World,
}

impl<'a> DestroyObserverBuilder<'a> {
    pub fn call<F: Fn(&mut World, Entity) + Send + Sync + 'static>(self, f: F) {
        self.world.observers_mut().on_destroy(Box::new(f));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::Commands;

    struct CountingPlugin(std::sync::Arc<std::sync::atomic::AtomicU32>);
    impl Plugin for CountingPlugin {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn build(&self, app: &mut App) -> Result<()> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let tag = app.tag("update").id();
            app.system(tag, "noop").call::<_, Commands>((), |_commands| Ok(()))?;
            Ok(())
        }
    }

    struct DependentPlugin;
    impl Plugin for DependentPlugin {
        fn name(&self) -> &'static str {
            "dependent"
        }

        fn dependencies(&self) -> &[&'static str] {
            &["counting"]
        }

        fn build(&self, _app: &mut App) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn plugin_is_idempotent() {
        let mut app = App::new();
        let builds = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        app.plugin(CountingPlugin(builds.clone())).unwrap();
        app.plugin(CountingPlugin(builds.clone())).unwrap();
        assert_eq!(builds.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let mut app = App::new();
        assert!(app.plugin(DependentPlugin).is_err());
    }

    #[test]
    fn dependency_installed_first_succeeds() {
        let mut app = App::new();
        let builds = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        app.plugin(CountingPlugin(builds)).unwrap();
        app.plugin(DependentPlugin).unwrap();
    }

    #[test]
    fn reserved_resources_are_seeded() {
        let app = App::new();
        assert!(app.world.resource_typed::<DeltaTime>().is_some());
        assert!(app.world.resource_typed::<ShouldQuit>().is_some());
        assert!(app.world.resource_typed::<Arguments>().is_some());
    }
}
