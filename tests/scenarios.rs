//! Integration tests spanning multiple modules: archetype migration,
//! relation semantics, command buffer deferral, observer causality and
//! scheduler conflict detection.

use std::sync::{Arc, Mutex};

use ecs_core::any_value::AnyValue;
use ecs_core::command::CommandBuffer;
use ecs_core::dependency::DependencyGraph;
use ecs_core::entity::Entity;
use ecs_core::system::SystemAccess;
use ecs_core::world::World;

#[derive(Clone, Copy, Default, PartialEq, Debug)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Clone, Copy, Default, PartialEq, Debug)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[test]
fn scenario_a_archetype_migration() {
    let mut world = World::new();
    let entity = world.spawn((Position { x: 1.0, y: 2.0, z: 3.0 },)).unwrap();
    assert!(world.get_component::<Position>(entity).is_some());

    world.add_component(entity, Velocity::default()).unwrap();
    assert!(world.get_component::<Position>(entity).is_some());
    assert!(world.get_component::<Velocity>(entity).is_some());
    assert_eq!(*world.get_component::<Position>(entity).unwrap(), Position { x: 1.0, y: 2.0, z: 3.0 });
}

#[test]
fn scenario_a2_migration_leaves_sibling_row_intact() {
    use ecs_core::archetype::ColumnId;

    let mut world = World::new();
    let ty = world.register_component_type::<Position>().unwrap();

    let e0 = world.spawn((Position { x: 1.0, y: 0.0, z: 0.0 },)).unwrap();
    let e1 = world.spawn((Position { x: 2.0, y: 0.0, z: 0.0 },)).unwrap();
    let archetype = world.entity_archetype(e1).unwrap();
    assert_eq!(world.archetype_row_count(archetype), Some(2));

    world.add_component(e0, Velocity::default()).unwrap();

    // e1 never moved; its row must still hold its own value, not e0's,
    // and must not have been read out of a column the migration left
    // shorter than the table's entity list.
    assert_eq!(*world.get_component::<Position>(e1).unwrap(), Position { x: 2.0, y: 0.0, z: 0.0 });
    assert_eq!(*world.get_component::<Position>(e0).unwrap(), Position { x: 1.0, y: 0.0, z: 0.0 });

    let remaining = world.entity_archetype(e1).unwrap();
    let row_count = world.archetype_row_count(remaining).unwrap();
    let column_len = world.archetype_column_len(remaining, ColumnId::of_component(ty)).unwrap();
    assert_eq!(column_len, row_count);
}

#[derive(Clone, Copy, Default)]
struct ChildOf;

#[test]
fn scenario_b_tree_relation_uniqueness() {
    let mut world = World::new();
    let ty = world.register_relation(relation_descriptor::<ChildOf>("ChildOf"), false, true).unwrap();

    let p1 = world.spawn((Position::default(),)).unwrap();
    let p2 = world.spawn((Position::default(),)).unwrap();
    let c = world.spawn((Position::default(),)).unwrap();

    world.relate(c, p1, ty, AnyValue::default_construct(world.types().descriptor(ty).unwrap().clone()).unwrap()).unwrap();
    world.relate(c, p2, ty, AnyValue::default_construct(world.types().descriptor(ty).unwrap().clone()).unwrap()).unwrap();

    assert!(world.related(c, p2, ty).is_some());
    assert!(world.related(c, p1, ty).is_none());
}

#[derive(Clone, Copy, Default)]
struct Touches;

#[test]
fn scenario_c_symmetric_relation() {
    let mut world = World::new();
    let ty = world.register_relation(relation_descriptor::<Touches>("Touches"), true, false).unwrap();

    let a = world.spawn((Position::default(),)).unwrap();
    let b = world.spawn((Position::default(),)).unwrap();

    world.relate(a, b, ty, AnyValue::default_construct(world.types().descriptor(ty).unwrap().clone()).unwrap()).unwrap();

    assert!(world.related(a, b, ty).is_some());
    assert!(world.related(b, a, ty).is_some());
    assert_eq!(world.related(a, b, ty), world.related(b, a, ty));
}

#[test]
fn scenario_d_command_buffer_deferral() {
    let mut world = World::new();
    world.register_component_type::<Position>().unwrap();

    let entity;
    {
        let commands = CommandBuffer::new(&world);
        entity = commands.create();
        let ty = world.types().id_of(std::any::type_name::<Position>()).unwrap();
        let descriptor = world.types().descriptor(ty).unwrap().clone();
        commands.add_component(entity, ty, AnyValue::default_construct(descriptor).unwrap());

        assert!(!world.is_alive(entity));

        commands.commit(&mut world).unwrap();
    }

    assert!(world.is_alive(entity));
    assert!(world.get_component::<Position>(entity).is_some());
}

#[test]
fn scenario_e_observer_causality() {
    let mut world = World::new();
    let recorded: Arc<Mutex<Vec<Entity>>> = Arc::new(Mutex::new(Vec::new()));
    let ty = world.register_component_type::<Position>().unwrap();

    let recorded_clone = recorded.clone();
    world.observers_mut().on_add(
        ty,
        Box::new(move |world: &mut World, entity: Entity| {
            assert!(world.get_component::<Position>(entity).is_some());
            recorded_clone.lock().unwrap().push(entity);
        }),
    );

    let entity;
    {
        let commands = CommandBuffer::new(&world);
        entity = commands.create();
        let descriptor = world.types().descriptor(ty).unwrap().clone();
        commands.add_component(entity, ty, AnyValue::default_construct(descriptor).unwrap());
        commands.commit(&mut world).unwrap();
    }

    assert!(recorded.lock().unwrap().as_slice() == [entity]);
}

#[test]
fn scenario_f_conflicting_writes_separate_layers() {
    use ecs_core::types::DataTypeId;

    let mut write_a = SystemAccess::empty();
    write_a.writes.push(DataTypeId(1));
    let mut write_a_too = SystemAccess::empty();
    write_a_too.writes.push(DataTypeId(1));
    let mut write_b = SystemAccess::empty();
    write_b.writes.push(DataTypeId(2));

    let graph = DependencyGraph::new(vec![write_a, write_b, write_a_too], &[]);
    let stages = graph.stages();

    // system 0 and system 2 both write column 1, so they cannot share a
    // layer; system 1 writes a disjoint column and packs alongside one
    // of them.
    let layer_of = |sys: usize| stages.iter().position(|s| s.system_indices.contains(&sys)).unwrap();
    assert_ne!(layer_of(0), layer_of(2));
}

fn relation_descriptor<T: 'static>(name: &'static str) -> Arc<ecs_core::reflection::TypeDescriptor> {
    use ecs_core::reflection::Constructible;
    Arc::new(ecs_core::reflection::TypeDescriptor::new(name, Constructible::of::<T>().with_default::<T>()))
}
