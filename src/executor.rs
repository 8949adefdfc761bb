//! Frame executor: profiler kept from the donor, driving logic rewritten
//! to walk a compiled [`Schedule`] — one [`ScheduleStage`] per tag, each
//! stage's layers run in order, each layer's systems run concurrently
//! (feature `parallel`) or in sequence, with a [`CommandBuffer`] per
//! system committed after its layer finishes.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::command::CommandBuffer;
use crate::error::Result;
use crate::schedule::{Schedule, SystemRegistry};
use crate::system::SystemId;
use crate::world::World;

/// Aggregated timing for one system across every frame it has run in.
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub call_count: u64,
}

/// Per-system execution timings, sampled by [`run_schedule`].
pub struct SystemProfiler {
    timings: HashMap<SystemId, Vec<Duration>>,
    call_counts: HashMap<SystemId, u64>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self { timings: HashMap::new(), call_counts: HashMap::new() }
    }

    pub fn record_execution(&mut self, id: SystemId, duration: Duration) {
        self.timings.entry(id).or_default().push(duration);
        self.call_counts.entry(id).and_modify(|c| *c += 1).or_insert(1);
    }

    pub fn stats(&self, id: SystemId) -> Option<SystemStats> {
        let timings = self.timings.get(&id)?;
        if timings.is_empty() {
            return None;
        }
        let min = *timings.iter().min().unwrap_or(&Duration::ZERO);
        let max = *timings.iter().max().unwrap_or(&Duration::ZERO);
        let avg = timings.iter().sum::<Duration>() / timings.len() as u32;
        Some(SystemStats { min, max, avg, call_count: *self.call_counts.get(&id).unwrap_or(&0) })
    }

    pub fn clear(&mut self) {
        self.timings.clear();
        self.call_counts.clear();
    }
}

impl Default for SystemProfiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs every stage of `schedule` once, in order, against `world`.
/// A stage whose gate conditions evaluate to `false` is skipped
/// entirely; a stage with a `repeat` condition runs its layers in a
/// loop until that condition comes back `false` (checked once per
/// iteration, before the first and between each).
pub fn run_schedule(schedule: &Schedule, registry: &mut SystemRegistry, world: &mut World, profiler: &mut SystemProfiler) -> Result<()> {
    for stage in &schedule.stages {
        if !evaluate_gate(&stage.gate, registry, world)? {
            continue;
        }
        loop {
            run_layers(&stage.layers, registry, world, profiler)?;
            match stage.repeat {
                Some(condition) if evaluate_condition(condition, registry, world)? => continue,
                _ => break,
            }
        }
    }
    Ok(())
}

fn evaluate_gate(gate: &[crate::system::ConditionId], registry: &mut SystemRegistry, world: &World) -> Result<bool> {
    for &condition in gate {
        if !evaluate_condition(condition, registry, world)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn evaluate_condition(condition: crate::system::ConditionId, registry: &mut SystemRegistry, world: &World) -> Result<bool> {
    let commands = CommandBuffer::new(world);
    let result = registry.condition_mut(condition).evaluate(world, &commands)?;
    // Conditions only read state; a condition that queued commands would
    // be observing effects out of order with the systems it gates.
    debug_assert!(commands.is_empty(), "conditions must not queue commands");
    Ok(result)
}

fn run_layers(layers: &[Vec<SystemId>], registry: &mut SystemRegistry, world: &mut World, profiler: &mut SystemProfiler) -> Result<()> {
    for layer in layers {
        run_layer(layer, registry, world, profiler)?;
    }
    Ok(())
}

#[cfg(feature = "parallel")]
fn run_layer(layer: &[SystemId], registry: &mut SystemRegistry, world: &mut World, profiler: &mut SystemProfiler) -> Result<()> {
    use parking_lot::Mutex;

    let systems = registry.systems_mut(layer);
    let buffers: Vec<CommandBuffer> = layer.iter().map(|_| CommandBuffer::new(world)).collect();
    let shared_world: &World = world;
    let results = Mutex::new(Vec::with_capacity(layer.len()));

    rayon::scope(|scope| {
        for ((&id, system), buffer) in layer.iter().zip(systems).zip(&buffers) {
            let results = &results;
            scope.spawn(move |_| {
                let start = Instant::now();
                let outcome = system.run(shared_world, buffer);
                results.lock().push((id, start.elapsed(), outcome));
            });
        }
    });

    for (id, elapsed, outcome) in results.into_inner() {
        profiler.record_execution(id, elapsed);
        outcome?;
    }
    for buffer in buffers {
        buffer.commit(world)?;
    }
    Ok(())
}

#[cfg(not(feature = "parallel"))]
fn run_layer(layer: &[SystemId], registry: &mut SystemRegistry, world: &mut World, profiler: &mut SystemProfiler) -> Result<()> {
    for &id in layer {
        let buffer = CommandBuffer::new(world);
        let start = Instant::now();
        let outcome = registry.system_mut(id).run(world, &buffer);
        profiler.record_execution(id, start.elapsed());
        outcome?;
        buffer.commit(world)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::any_value::AnyValue;
    use crate::schedule::TagGraph;
    use crate::system::{build_system, ResMut};
    use crate::world::World;

    #[derive(Default)]
    struct Counter(u32);

    fn with_counter(world: &mut World) {
        let id = world.register_resource_type::<Counter>().unwrap();
        let descriptor = world.types().descriptor(id).unwrap().clone();
        let value = AnyValue::default_construct(descriptor).unwrap();
        world.insert_resource(id, value);
    }

    #[test]
    fn sequential_stage_runs_and_commits() {
        let mut world = World::new();
        with_counter(&mut world);

        let mut registry = SystemRegistry::new();
        let mut tags = TagGraph::new();
        let main = tags.tag("main");

        let increment = build_system::<_, ResMut<Counter>>(&world, "increment", (), |counter: &mut Counter| {
            counter.0 += 1;
            Ok(())
        })
        .unwrap();
        registry.register_system(main, increment);

        let schedule = Schedule::compile(&registry, &tags, &[]).unwrap();
        let mut profiler = SystemProfiler::new();
        run_schedule(&schedule, &mut registry, &mut world, &mut profiler).unwrap();

        let system_id = registry.find_by_name("increment").unwrap();
        assert_eq!(profiler.stats(system_id).unwrap().call_count, 1);
    }

    #[test]
    fn gated_stage_skips_when_condition_false() {
        use crate::system::build_condition;

        let mut world = World::new();
        with_counter(&mut world);

        let mut registry = SystemRegistry::new();
        let mut tags = TagGraph::new();
        let main = tags.tag("main");

        let never = build_condition::<_, ()>(&world, "never", (), |_: ()| Ok(false)).unwrap();
        let gate = registry.register_condition(never);
        tags.gate(main, gate);

        let increment = build_system::<_, ResMut<Counter>>(&world, "increment", (), |counter: &mut Counter| {
            counter.0 += 1;
            Ok(())
        })
        .unwrap();
        registry.register_system(main, increment);

        let schedule = Schedule::compile(&registry, &tags, &[]).unwrap();
        let mut profiler = SystemProfiler::new();
        run_schedule(&schedule, &mut registry, &mut world, &mut profiler).unwrap();

        let system_id = registry.find_by_name("increment").unwrap();
        assert_eq!(profiler.stats(system_id), None);
    }
}
