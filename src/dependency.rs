//! Conflict matrix and parallel layer packing for one stage's worth of
//! systems (all systems under a single tag, already ordered relative to
//! other tags by `schedule::TagGraph`).
//!
//! Kept from the donor almost unchanged: `build_dependency_matrix`,
//! Kahn's-algorithm depth grouping, and the greedy `optimize_stages`
//! pass. Two additions: `forced_edges` lets the schedule compiler wire a
//! named `before`/`after` constraint in as a hard edge even when the two
//! systems' accesses don't otherwise conflict, and `SystemAccess`'s
//! field names follow `system.rs`'s split between component and
//! resource access.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::bitset::BitSet;
use crate::system::SystemAccess;

/// A group of systems (by index into the slice passed to
/// `DependencyGraph::new`) that can run concurrently.
#[derive(Clone, Debug)]
pub struct ExecutionStage {
    pub system_indices: Vec<usize>,
    pub depth: usize,
}

pub struct DependencyGraph {
    stages: Vec<ExecutionStage>,
    critical_path: Vec<usize>,
    dependency_matrix: Vec<BitSet>,
}

impl DependencyGraph {
    /// `forced_edges` are `(before, after)` index pairs from named
    /// ordering constraints; they're folded into the same matrix as
    /// access conflicts before stage packing runs.
    pub fn new(system_accesses: Vec<SystemAccess>, forced_edges: &[(usize, usize)]) -> Self {
        let dependency_matrix = Self::build_dependency_matrix(&system_accesses, forced_edges);
        let stages = Self::build_stages_topological(&system_accesses, &dependency_matrix);
        let critical_path = Self::find_critical_path(&stages, &dependency_matrix);

        Self { stages, critical_path, dependency_matrix }
    }

    fn build_dependency_matrix(accesses: &[SystemAccess], forced_edges: &[(usize, usize)]) -> Vec<BitSet> {
        let count = accesses.len();
        let mut matrix = vec![BitSet::with_capacity(count); count];

        for i in 0..count {
            for j in (i + 1)..count {
                if accesses[i].conflicts_with(&accesses[j]) {
                    matrix[i].set(j);
                }
            }
        }

        for &(before, after) in forced_edges {
            if before < count && after < count {
                matrix[before].set(after);
            }
        }

        matrix
    }

    fn build_stages_topological(accesses: &[SystemAccess], dependency_matrix: &[BitSet]) -> Vec<ExecutionStage> {
        let count = accesses.len();
        if count == 0 {
            return vec![];
        }

        let mut in_degree = vec![0; count];
        for matrix_row in dependency_matrix.iter() {
            for neighbor in matrix_row.ones() {
                in_degree[neighbor] += 1;
            }
        }

        let mut depths = vec![0; count];
        let mut queue = VecDeque::new();
        for (idx, &degree) in in_degree.iter().enumerate() {
            if degree == 0 {
                queue.push_back(idx);
            }
        }

        let mut sorted = Vec::with_capacity(count);
        while let Some(node) = queue.pop_front() {
            sorted.push(node);
            for neighbor in dependency_matrix[node].ones() {
                in_degree[neighbor] -= 1;
                depths[neighbor] = depths[neighbor].max(depths[node] + 1);
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        let max_depth = *depths.iter().max().unwrap_or(&0);
        let mut stages = Vec::new();

        for depth in 0..=max_depth {
            let mut stage_systems = Vec::new();
            for &sys_idx in &sorted {
                if depths[sys_idx] == depth {
                    let can_add = stage_systems.iter().all(|&existing: &usize| !accesses[sys_idx].conflicts_with(&accesses[existing]));
                    if can_add {
                        stage_systems.push(sys_idx);
                    }
                }
            }
            if !stage_systems.is_empty() {
                stages.push(ExecutionStage { system_indices: stage_systems, depth });
            }
        }

        Self::optimize_stages(&mut stages, accesses, &sorted, &depths);
        stages
    }

    fn optimize_stages(stages: &mut Vec<ExecutionStage>, accesses: &[SystemAccess], sorted: &[usize], depths: &[usize]) {
        let mut assigned: FxHashSet<usize> = stages.iter().flat_map(|s| s.system_indices.iter().copied()).collect();
        let mut unassigned: Vec<usize> = sorted.iter().copied().filter(|idx| !assigned.contains(idx)).collect();

        while !unassigned.is_empty() {
            let mut next_unassigned = Vec::with_capacity(unassigned.len());

            for &sys_idx in &unassigned {
                let target_depth = depths[sys_idx];
                let mut placed = false;

                for stage in stages.iter_mut().filter(|s| s.depth >= target_depth) {
                    let can_add = stage.system_indices.iter().all(|&existing| !accesses[sys_idx].conflicts_with(&accesses[existing]));
                    if can_add {
                        stage.system_indices.push(sys_idx);
                        assigned.insert(sys_idx);
                        placed = true;
                        break;
                    }
                }

                if !placed {
                    next_unassigned.push(sys_idx);
                }
            }

            if next_unassigned.len() == unassigned.len() && !next_unassigned.is_empty() {
                let sys_idx = next_unassigned.remove(0);
                let new_depth = stages.last().map(|s| s.depth + 1).unwrap_or(0);
                stages.push(ExecutionStage { system_indices: vec![sys_idx], depth: new_depth });
                assigned.insert(sys_idx);
            }

            unassigned = next_unassigned;
        }
    }

    fn find_critical_path(stages: &[ExecutionStage], dependency_matrix: &[BitSet]) -> Vec<usize> {
        if stages.is_empty() {
            return vec![];
        }

        let mut max_depth_system = 0;
        let mut max_depth = 0;
        for stage in stages {
            if stage.depth > max_depth {
                max_depth = stage.depth;
                if let Some(&first_sys) = stage.system_indices.first() {
                    max_depth_system = first_sys;
                }
            }
        }

        let mut path = vec![max_depth_system];
        let mut current = max_depth_system;

        loop {
            let mut predecessor = None;
            for (i, matrix_row) in dependency_matrix.iter().enumerate() {
                if matrix_row.contains(current) {
                    predecessor = Some(i);
                    break;
                }
            }
            if let Some(pred) = predecessor {
                path.push(pred);
                current = pred;
            } else {
                break;
            }
        }

        path.reverse();
        path
    }

    pub fn stages(&self) -> &[ExecutionStage] {
        &self.stages
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn critical_path(&self) -> &[usize] {
        &self.critical_path
    }

    pub fn is_critical(&self, system_index: usize) -> bool {
        self.critical_path.contains(&system_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataTypeId;

    fn reads(ids: &[u32]) -> SystemAccess {
        SystemAccess { reads: ids.iter().map(|&i| DataTypeId(i)).collect(), ..SystemAccess::empty() }
    }

    fn writes(ids: &[u32]) -> SystemAccess {
        SystemAccess { writes: ids.iter().map(|&i| DataTypeId(i)).collect(), ..SystemAccess::empty() }
    }

    #[test]
    fn independent_reads_run_in_one_layer() {
        let graph = DependencyGraph::new(vec![reads(&[0]), reads(&[1])], &[]);
        assert_eq!(graph.stage_count(), 1);
    }

    #[test]
    fn write_then_read_runs_sequentially() {
        let graph = DependencyGraph::new(vec![writes(&[0]), reads(&[0])], &[]);
        assert_eq!(graph.stage_count(), 2);
    }

    #[test]
    fn forced_edge_separates_otherwise_independent_systems() {
        let graph = DependencyGraph::new(vec![reads(&[0]), reads(&[1])], &[(0, 1)]);
        assert_eq!(graph.stage_count(), 2);
    }

    #[test]
    fn diamond_dependency_packs_into_three_layers() {
        let accesses = vec![writes(&[0]), writes(&[1]), SystemAccess { reads: vec![DataTypeId(0)], writes: vec![DataTypeId(2)], ..SystemAccess::empty() }, SystemAccess { reads: vec![DataTypeId(1)], writes: vec![DataTypeId(3)], ..SystemAccess::empty() }, reads(&[2, 3])];
        let graph = DependencyGraph::new(accesses, &[]);
        assert!(graph.stage_count() <= 3);
        assert!(graph.stages()[0].system_indices.contains(&0) || graph.stages()[0].system_indices.contains(&1));
    }
}
