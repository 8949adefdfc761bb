//! Tag graph, system/condition registry and schedule compilation.
//!
//! Grounded on the donor's `SystemGraph` (topological sort via Kahn's
//! algorithm, lazily rebuilt on mutation) generalized one level up: the
//! donor topologically sorts individual systems by conflict edges alone,
//! this sorts named *tags* by explicit `before`/`after`/`inherits`
//! edges, then hands each tag's system set to `dependency::DependencyGraph`
//! for conflict-based layer packing within that tag.

use ahash::AHashMap;
use std::collections::VecDeque;

use crate::dependency::DependencyGraph;
use crate::error::{EcsError, Result};
use crate::system::{BoxedCondition, BoxedSystem, ConditionId, SystemAccess, SystemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagId(pub u32);

#[derive(Default)]
pub struct Tag {
    pub name: String,
    before: Vec<TagId>,
    after: Vec<TagId>,
    inherits: Option<TagId>,
    repeat: Option<ConditionId>,
    gate: Vec<ConditionId>,
}

/// The ordering DAG over tags. Built incrementally via `tag`, resolved
/// (inheritance flattened, cycles rejected) by `compile`.
#[derive(Default)]
pub struct TagGraph {
    tags: Vec<Tag>,
    by_name: AHashMap<String, TagId>,
}

impl TagGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&mut self, name: &str) -> TagId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = TagId(self.tags.len() as u32);
        self.tags.push(Tag { name: name.to_string(), ..Tag::default() });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn before(&mut self, tag: TagId, other: TagId) {
        self.tags[tag.0 as usize].before.push(other);
    }

    pub fn after(&mut self, tag: TagId, other: TagId) {
        self.tags[tag.0 as usize].after.push(other);
    }

    pub fn inherit(&mut self, tag: TagId, parent: TagId) {
        self.tags[tag.0 as usize].inherits = Some(parent);
    }

    pub fn repeat(&mut self, tag: TagId, condition: ConditionId) {
        self.tags[tag.0 as usize].repeat = Some(condition);
    }

    pub fn gate(&mut self, tag: TagId, condition: ConditionId) {
        self.tags[tag.0 as usize].gate.push(condition);
    }

    pub fn name_of(&self, tag: TagId) -> &str {
        &self.tags[tag.0 as usize].name
    }

    fn ancestors(&self, tag: TagId) -> Vec<TagId> {
        let mut chain = Vec::new();
        let mut current = Some(tag);
        while let Some(t) = current {
            chain.push(t);
            current = self.tags[t.0 as usize].inherits;
        }
        chain
    }

    /// Every `before`/`after` constraint on `tag` or any tag it inherits
    /// from, flattened.
    fn effective_edges(&self, tag: TagId) -> (Vec<TagId>, Vec<TagId>) {
        let mut before = Vec::new();
        let mut after = Vec::new();
        for ancestor in self.ancestors(tag) {
            before.extend(self.tags[ancestor.0 as usize].before.iter().copied());
            after.extend(self.tags[ancestor.0 as usize].after.iter().copied());
        }
        (before, after)
    }

    /// Topological order over every declared tag. `Err(SystemCycleDetected)`
    /// if the before/after/inherits edges form a cycle.
    pub fn topological_order(&self) -> Result<Vec<TagId>> {
        let count = self.tags.len();
        let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];

        for i in 0..count {
            let (before, after) = self.effective_edges(TagId(i as u32));
            for other in before {
                out_edges[i].push(other.0 as usize);
                in_degree[other.0 as usize] += 1;
            }
            for other in after {
                out_edges[other.0 as usize].push(i);
                in_degree[i] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(node) = queue.pop_front() {
            order.push(TagId(node as u32));
            for &next in &out_edges[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != count {
            return Err(EcsError::SystemCycleDetected);
        }
        Ok(order)
    }
}

/// Owns every registered system and condition, keyed by id and tag.
/// Matches `SystemRegistry` from the scheduler design: callable objects
/// plus debug names, looked up by `SystemId`/`ConditionId`.
#[derive(Default)]
pub struct SystemRegistry {
    systems: Vec<(String, TagId, BoxedSystem)>,
    conditions: Vec<(String, BoxedCondition)>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_system(&mut self, tag: TagId, system: BoxedSystem) -> SystemId {
        let id = SystemId(self.systems.len() as u32);
        self.systems.push((system.name().to_string(), tag, system));
        id
    }

    pub fn register_condition(&mut self, condition: BoxedCondition) -> ConditionId {
        let id = ConditionId(self.conditions.len() as u32);
        self.conditions.push((condition.name().to_string(), condition));
        id
    }

    pub fn system_mut(&mut self, id: SystemId) -> &mut BoxedSystem {
        &mut self.systems[id.0 as usize].2
    }

    /// Disjoint mutable borrows of several systems at once, for a
    /// parallel layer's worth of `rayon::scope` closures. `ids` must be
    /// pairwise distinct, which every layer `Schedule::compile` produces
    /// guarantees (a system belongs to exactly one conflict-free group).
    pub fn systems_mut(&mut self, ids: &[SystemId]) -> Vec<&mut BoxedSystem> {
        let mut slots: Vec<Option<&mut BoxedSystem>> = self.systems.iter_mut().map(|(_, _, sys)| Some(sys)).collect();
        ids.iter()
            .map(|id| slots[id.0 as usize].take().expect("layer ids are pairwise distinct"))
            .collect()
    }

    pub fn condition_mut(&mut self, id: ConditionId) -> &mut BoxedCondition {
        &mut self.conditions[id.0 as usize].1
    }

    pub fn find_by_name(&self, name: &str) -> Option<SystemId> {
        self.systems.iter().position(|(n, _, _)| n == name).map(|i| SystemId(i as u32))
    }

    fn systems_in_tag(&self, tag: TagId) -> Vec<SystemId> {
        self.systems.iter().enumerate().filter(|(_, (_, t, _))| *t == tag).map(|(i, _)| SystemId(i as u32)).collect()
    }

    fn access_of(&self, id: SystemId) -> SystemAccess {
        self.systems[id.0 as usize].2.access().clone()
    }
}

/// One compiled tag's worth of work: its gate/repeat conditions and the
/// conflict-free parallel layers its systems were packed into.
pub struct ScheduleStage {
    pub tag: TagId,
    pub gate: Vec<ConditionId>,
    pub repeat: Option<ConditionId>,
    pub layers: Vec<Vec<SystemId>>,
}

/// An ordered, conflict-free execution plan ready for the executor.
/// Rebuilding (`compile`) is lazy-invalidated the same way the donor's
/// `Schedule::rebuild` was: call again whenever the tag graph or the set
/// of registered systems changes.
pub struct Schedule {
    pub stages: Vec<ScheduleStage>,
}

impl Schedule {
    /// Named `before(...)`/`after(...)` constraints between individual
    /// systems in the same tag (as opposed to between tags) are folded
    /// in as forced edges during layer packing, the way the donor's
    /// unused `OrderingConstraint` was meant to be consulted.
    pub fn compile(registry: &SystemRegistry, tags: &TagGraph, forced: &[(SystemId, SystemId)]) -> Result<Self> {
        let order = tags.topological_order()?;
        let mut stages = Vec::new();

        for tag in order {
            let members = registry.systems_in_tag(tag);
            if members.is_empty() {
                continue;
            }
            let accesses: Vec<SystemAccess> = members.iter().map(|&id| registry.access_of(id)).collect();
            let local_forced: Vec<(usize, usize)> = forced
                .iter()
                .filter_map(|&(a, b)| {
                    let ia = members.iter().position(|&m| m == a)?;
                    let ib = members.iter().position(|&m| m == b)?;
                    Some((ia, ib))
                })
                .collect();

            let graph = DependencyGraph::new(accesses, &local_forced);
            let layers = graph.stages().iter().map(|stage| stage.system_indices.iter().map(|&idx| members[idx]).collect()).collect();

            let tag_struct = &tags.tags[tag.0 as usize];
            stages.push(ScheduleStage { tag, gate: tag_struct.gate.clone(), repeat: tag_struct.repeat, layers });
        }

        Ok(Self { stages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::build_system;
    use crate::world::World;

    #[test]
    fn tags_topologically_order_before_constraints() {
        let mut tags = TagGraph::new();
        let physics = tags.tag("physics");
        let render = tags.tag("render");
        tags.before(physics, render);

        let order = tags.topological_order().unwrap();
        let physics_pos = order.iter().position(|&t| t == physics).unwrap();
        let render_pos = order.iter().position(|&t| t == render).unwrap();
        assert!(physics_pos < render_pos);
    }

    #[test]
    fn cyclic_tags_are_rejected() {
        let mut tags = TagGraph::new();
        let a = tags.tag("a");
        let b = tags.tag("b");
        tags.before(a, b);
        tags.before(b, a);
        assert!(tags.topological_order().is_err());
    }

    #[test]
    fn independent_systems_in_one_tag_share_a_layer() {
        let world = World::new();
        let mut registry = SystemRegistry::new();
        let mut tags = TagGraph::new();
        let main = tags.tag("main");

        let sys_a = build_system::<_, ()>(&world, "a", (), |_: ()| Ok(())).unwrap();
        let sys_b = build_system::<_, ()>(&world, "b", (), |_: ()| Ok(())).unwrap();
        registry.register_system(main, sys_a);
        registry.register_system(main, sys_b);

        let schedule = Schedule::compile(&registry, &tags, &[]).unwrap();
        assert_eq!(schedule.stages.len(), 1);
        assert_eq!(schedule.stages[0].layers.len(), 1);
        assert_eq!(schedule.stages[0].layers[0].len(), 2);
    }
}
