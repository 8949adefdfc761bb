use criterion::{criterion_group, criterion_main, Criterion};
use ecs_core::world::World;

#[derive(Clone, Copy, Default)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy, Default)]
struct Velocity {
    dx: f32,
    dy: f32,
}

fn spawn_one_component(c: &mut Criterion) {
    c.bench_function("spawn_one_component", |b| {
        b.iter(|| {
            let mut world = World::new();
            for _ in 0..1000 {
                world.spawn((Position::default(),)).unwrap();
            }
        });
    });
}

fn spawn_two_components(c: &mut Criterion) {
    c.bench_function("spawn_two_components", |b| {
        b.iter(|| {
            let mut world = World::new();
            for _ in 0..1000 {
                world.spawn((Position::default(), Velocity::default())).unwrap();
            }
        });
    });
}

fn despawn(c: &mut Criterion) {
    c.bench_function("despawn_one_component", |b| {
        b.iter(|| {
            let mut world = World::new();
            let entities: Vec<_> = (0..1000).map(|_| world.spawn((Position::default(),)).unwrap()).collect();
            for entity in entities {
                world.destroy(entity).unwrap();
            }
        });
    });
}

/// `hecs` comparison baseline, the way the donor's own spawn benchmarks
/// always ran alongside a `hecs` measurement for the same workload.
fn hecs_spawn_two_components(c: &mut Criterion) {
    c.bench_function("hecs_spawn_two_components", |b| {
        b.iter(|| {
            let mut world = hecs::World::new();
            for _ in 0..1000 {
                world.spawn((Position::default(), Velocity::default()));
            }
        });
    });
}

criterion_group!(benches, spawn_one_component, spawn_two_components, despawn, hecs_spawn_two_components);
criterion_main!(benches);
