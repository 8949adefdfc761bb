use criterion::{criterion_group, criterion_main, Criterion};
use ecs_core::query::{Access, Query, Term};
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

fn build_world(entities: usize) -> World {
    let mut world = World::new();
    for i in 0..entities {
        if i % 2 == 0 {
            world.spawn((Position::default(), Velocity::default())).unwrap();
        } else {
            world.spawn((Position::default(),)).unwrap();
        }
    }
    world
}

fn query_single_component(c: &mut Criterion) {
    let world = build_world(5000);
    let position_ty = world.types().id_of(std::any::type_name::<Position>()).unwrap();
    let terms = vec![Term::Component { target: 0, ty: position_ty, access: Access::Read, optional: false }];

    c.bench_function("query_single_component", |b| {
        b.iter(|| {
            let query = Query::new(&world, terms.clone());
            query.rows(&world)
        });
    });
}

fn query_two_components(c: &mut Criterion) {
    let world = build_world(5000);
    let position_ty = world.types().id_of(std::any::type_name::<Position>()).unwrap();
    let velocity_ty = world.types().id_of(std::any::type_name::<Velocity>()).unwrap();
    let terms = vec![
        Term::Component { target: 0, ty: position_ty, access: Access::Read, optional: false },
        Term::Component { target: 0, ty: velocity_ty, access: Access::Write, optional: false },
    ];

    c.bench_function("query_two_components", |b| {
        b.iter(|| {
            let query = Query::new(&world, terms.clone());
            query.rows(&world)
        });
    });
}

criterion_group!(benches, query_single_component, query_two_components);
criterion_main!(benches);
