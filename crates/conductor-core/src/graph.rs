//! Dependency graph over units of work.
//!
//! Built once from the plan before any execution. Structure (units and
//! edges) is immutable after `build`; only unit statuses change, and only
//! through the coordinator-facing mutators here.

use crate::error::{ConductorError, Result};
use crate::types::UnitStatus;
use crate::unit::Unit;
use std::collections::{HashMap, HashSet, VecDeque};

// ---------------------------------------------------------------------------
// DependencyGraph
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct DependencyGraph {
    /// Units in plan order. Indices are stable for the life of the graph.
    units: Vec<Unit>,
    index: HashMap<String, usize>,
    /// Forward edges: dependency index → dependent indices.
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Construct the graph from a list of units with declared dependencies.
    ///
    /// Fails fast, before any execution, on duplicate ids, dangling
    /// dependency references, and cycles.
    pub fn build(units: Vec<Unit>) -> Result<Self> {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, unit) in units.iter().enumerate() {
            unit.validate()?;
            if index.insert(unit.id.clone(), i).is_some() {
                return Err(ConductorError::DuplicateUnit(unit.id.clone()));
            }
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
        for (i, unit) in units.iter().enumerate() {
            for dep in &unit.dependencies {
                let Some(&di) = index.get(dep) else {
                    return Err(ConductorError::UnknownDependency {
                        unit: unit.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                dependents[di].push(i);
            }
        }

        let graph = Self {
            units,
            index,
            dependents,
        };

        // A valid topological order must exist; otherwise report every unit
        // that is in or downstream of the cycle.
        let ordered: usize = graph.level_indices().iter().map(|l| l.len()).sum();
        if ordered < graph.units.len() {
            let placed: HashSet<usize> = graph.level_indices().into_iter().flatten().collect();
            let cycled: Vec<String> = graph
                .units
                .iter()
                .enumerate()
                .filter(|(i, _)| !placed.contains(i))
                .map(|(_, u)| u.id.clone())
                .collect();
            return Err(ConductorError::CycleDetected(cycled.join(", ")));
        }

        Ok(graph)
    }

    /// Execution levels via Kahn's algorithm: each level is the frontier of
    /// units whose dependencies all sit in strictly earlier levels.
    ///
    /// Deterministic for a given input: frontiers are ordered by plan
    /// position, so the same plan always yields the same level sequence.
    pub fn levels(&self) -> Vec<Vec<String>> {
        self.level_indices()
            .into_iter()
            .map(|level| level.iter().map(|&i| self.units[i].id.clone()).collect())
            .collect()
    }

    fn level_indices(&self) -> Vec<Vec<usize>> {
        let mut in_degree: Vec<usize> = self.units.iter().map(|u| u.dependencies.len()).collect();

        let mut current: Vec<usize> = (0..self.units.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();

        let mut levels = Vec::new();
        while !current.is_empty() {
            let mut next = Vec::new();
            for &i in &current {
                for &dep in &self.dependents[i] {
                    in_degree[dep] -= 1;
                    if in_degree[dep] == 0 {
                        next.push(dep);
                    }
                }
            }
            next.sort_unstable();
            levels.push(std::mem::replace(&mut current, next));
        }
        levels
    }

    /// Propagate a terminal failure: every unit transitively depending on
    /// `unit_id` (forward closure, not just direct dependents) transitions
    /// to `Blocked`. Returns the ids newly blocked, in plan order.
    pub fn mark_failed(&mut self, unit_id: &str) -> Result<Vec<String>> {
        let &start = self
            .index
            .get(unit_id)
            .ok_or_else(|| ConductorError::UnitNotFound(unit_id.to_string()))?;
        self.units[start].status = UnitStatus::Failed;

        let mut blocked: Vec<usize> = Vec::new();
        let mut seen: HashSet<usize> = HashSet::new();
        let mut queue: VecDeque<usize> = VecDeque::from([start]);
        while let Some(i) = queue.pop_front() {
            for &dep in &self.dependents[i] {
                if seen.insert(dep) {
                    queue.push_back(dep);
                    if !self.units[dep].status.is_terminal() {
                        self.units[dep].status = UnitStatus::Blocked;
                        blocked.push(dep);
                    }
                }
            }
        }

        blocked.sort_unstable();
        Ok(blocked.into_iter().map(|i| self.units[i].id.clone()).collect())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn unit(&self, id: &str) -> Option<&Unit> {
        self.index.get(id).map(|&i| &self.units[i])
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn status(&self, id: &str) -> Option<UnitStatus> {
        self.unit(id).map(|u| u.status)
    }

    /// Coordinator-only status write.
    pub fn set_status(&mut self, id: &str, status: UnitStatus) -> Result<()> {
        let &i = self
            .index
            .get(id)
            .ok_or_else(|| ConductorError::UnitNotFound(id.to_string()))?;
        self.units[i].status = status;
        Ok(())
    }

    pub fn record_attempts(&mut self, id: &str, attempts: u32, notes: Option<String>) -> Result<()> {
        let &i = self
            .index
            .get(id)
            .ok_or_else(|| ConductorError::UnitNotFound(id.to_string()))?;
        self.units[i].attempt_count = attempts;
        self.units[i].result_notes = notes;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str, deps: &[&str]) -> Unit {
        Unit::new(id, format!("unit {id}")).with_dependencies(deps)
    }

    #[test]
    fn no_deps_single_level() {
        let g = DependencyGraph::build(vec![unit("a", &[]), unit("b", &[]), unit("c", &[])])
            .unwrap();
        assert_eq!(g.levels(), vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn spec_scenario_five_units() {
        // unit-5 depends on {1,2}, unit-4 depends on {3}, units 1/2/3 free.
        let g = DependencyGraph::build(vec![
            unit("u1", &[]),
            unit("u2", &[]),
            unit("u3", &[]),
            unit("u4", &["u3"]),
            unit("u5", &["u1", "u2"]),
        ])
        .unwrap();
        let levels = g.levels();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0], vec!["u1", "u2", "u3"]);
        assert_eq!(levels[1], vec!["u4", "u5"]);
    }

    #[test]
    fn levels_partition_with_deps_strictly_earlier() {
        let g = DependencyGraph::build(vec![
            unit("a", &[]),
            unit("b", &["a"]),
            unit("c", &["a"]),
            unit("d", &["b", "c"]),
        ])
        .unwrap();
        let levels = g.levels();

        // Partition of all ids
        let all: Vec<&String> = levels.iter().flatten().collect();
        assert_eq!(all.len(), 4);

        // Every dependency in a strictly earlier level
        let level_of: HashMap<&str, usize> = levels
            .iter()
            .enumerate()
            .flat_map(|(k, ids)| ids.iter().map(move |id| (id.as_str(), k)))
            .collect();
        for u in g.units() {
            for dep in &u.dependencies {
                assert!(level_of[dep.as_str()] < level_of[u.id.as_str()]);
            }
        }
    }

    #[test]
    fn deterministic_level_ordering() {
        let build = || {
            DependencyGraph::build(vec![
                unit("z-last", &[]),
                unit("a-first", &[]),
                unit("mid", &["z-last"]),
            ])
            .unwrap()
            .levels()
        };
        // Plan order, not alphabetical: z-last was inserted first.
        assert_eq!(build(), build());
        assert_eq!(build()[0], vec!["z-last", "a-first"]);
    }

    #[test]
    fn cycle_detected_at_build() {
        let err = DependencyGraph::build(vec![
            unit("a", &["b"]),
            unit("b", &["a"]),
            unit("free", &[]),
        ])
        .unwrap_err();
        match err {
            ConductorError::CycleDetected(ids) => {
                assert!(ids.contains('a') && ids.contains('b'));
                assert!(!ids.contains("free"));
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn cycle_reports_downstream_units_too() {
        let err = DependencyGraph::build(vec![
            unit("a", &["b"]),
            unit("b", &["a"]),
            unit("child", &["a"]),
        ])
        .unwrap_err();
        match err {
            ConductorError::CycleDetected(ids) => assert!(ids.contains("child")),
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency_rejected() {
        let err = DependencyGraph::build(vec![unit("a", &["ghost"])]).unwrap_err();
        assert!(matches!(
            err,
            ConductorError::UnknownDependency { ref unit, ref dependency }
                if unit == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn duplicate_id_rejected() {
        let err =
            DependencyGraph::build(vec![unit("a", &[]), unit("a", &[])]).unwrap_err();
        assert!(matches!(err, ConductorError::DuplicateUnit(_)));
    }

    #[test]
    fn mark_failed_blocks_forward_closure_only() {
        // a → b → d, a → c; e independent
        let mut g = DependencyGraph::build(vec![
            unit("a", &[]),
            unit("b", &["a"]),
            unit("c", &["a"]),
            unit("d", &["b"]),
            unit("e", &[]),
        ])
        .unwrap();

        let blocked = g.mark_failed("b").unwrap();
        assert_eq!(blocked, vec!["d"]);
        assert_eq!(g.status("b"), Some(UnitStatus::Failed));
        assert_eq!(g.status("d"), Some(UnitStatus::Blocked));
        // Siblings and upstream untouched
        assert_eq!(g.status("a"), Some(UnitStatus::Pending));
        assert_eq!(g.status("c"), Some(UnitStatus::Pending));
        assert_eq!(g.status("e"), Some(UnitStatus::Pending));
    }

    #[test]
    fn mark_failed_spans_indirect_dependents() {
        let mut g = DependencyGraph::build(vec![
            unit("u2", &[]),
            unit("u3", &["u2"]),
            unit("u5", &["u3"]),
        ])
        .unwrap();
        let blocked = g.mark_failed("u2").unwrap();
        assert_eq!(blocked, vec!["u3", "u5"]);
    }

    #[test]
    fn mark_failed_skips_already_terminal_dependents() {
        let mut g =
            DependencyGraph::build(vec![unit("a", &[]), unit("b", &["a"])]).unwrap();
        g.set_status("b", UnitStatus::Succeeded).unwrap();
        let blocked = g.mark_failed("a").unwrap();
        assert!(blocked.is_empty());
        assert_eq!(g.status("b"), Some(UnitStatus::Succeeded));
    }
}
