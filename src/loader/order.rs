// ABOUTME: Dependency graph helpers: transitive closure, Kahn ordering with
// ABOUTME: priority tie-breaks, and cycle extraction for error reporting.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::module::ModuleRegistry;

/// A requested id set closed over its transitive dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyClosure {
    /// Known module ids, requested ones first, in discovery order.
    pub modules: Vec<String>,
    /// Requested ids that are not in the registry.
    pub unknown: Vec<String>,
}

/// Close `ids` over their dependencies.
///
/// Dependencies missing from the registry are left out; loading the module
/// that names them reports the missing dependency.
pub fn dependency_closure(registry: &ModuleRegistry, ids: &[String]) -> DependencyClosure {
    let mut closure = DependencyClosure::default();
    let mut seen = HashSet::new();
    let mut queue: Vec<&str> = Vec::new();

    for id in ids {
        if !registry.contains(id) {
            if !closure.unknown.contains(id) {
                closure.unknown.push(id.clone());
            }
            continue;
        }
        if seen.insert(id.as_str()) {
            closure.modules.push(id.clone());
            queue.push(id.as_str());
        }
    }

    while let Some(id) = queue.pop() {
        let Some(definition) = registry.get(id) else {
            continue;
        };
        for dep in &definition.dependencies {
            if registry.contains(dep) && seen.insert(dep.as_str()) {
                closure.modules.push(dep.clone());
                queue.push(dep.as_str());
            }
        }
    }

    closure
}

/// Result of ordering a module set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologicalOrder {
    /// Every dependency (within the set) precedes its dependents.
    pub order: Vec<String>,
    /// Ids that could not be ordered because they sit on or behind a cycle.
    pub blocked: Vec<String>,
}

/// Order `ids` with Kahn's algorithm.
///
/// Only edges between members of `ids` are considered. Among modules that are
/// ready at the same time, higher `priority` goes first, then ascending id.
pub fn topological_order(registry: &ModuleRegistry, ids: &[String]) -> TopologicalOrder {
    let members: BTreeSet<&str> = ids
        .iter()
        .map(String::as_str)
        .filter(|id| registry.contains(id))
        .collect();

    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for &id in &members {
        let mut deps: Vec<&str> = registry
            .get(id)
            .map(|d| d.dependencies.iter().map(String::as_str).collect())
            .unwrap_or_default();
        deps.sort_unstable();
        deps.dedup();

        let mut count = 0;
        for dep in deps {
            if members.contains(dep) {
                count += 1;
                dependents.entry(dep).or_default().push(id);
            }
        }
        indegree.insert(id, count);
    }

    let priority_of = |id: &str| registry.get(id).map(|d| d.priority).unwrap_or_default();

    let mut ready: BTreeSet<(Reverse<i32>, &str)> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(&id, _)| (Reverse(priority_of(id)), id))
        .collect();

    let mut order = Vec::with_capacity(members.len());
    while let Some((_, id)) = ready.pop_first() {
        order.push(id.to_string());
        for &dependent in dependents.get(id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(count) = indegree.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert((Reverse(priority_of(dependent)), dependent));
                }
            }
        }
    }

    let placed: HashSet<&str> = order.iter().map(String::as_str).collect();
    let blocked = members
        .iter()
        .filter(|id| !placed.contains(*id))
        .map(|id| id.to_string())
        .collect();

    TopologicalOrder { order, blocked }
}

/// Find one dependency cycle among `ids`, returned as `[a, b, .., a]`.
pub fn find_cycle(registry: &ModuleRegistry, ids: &[String]) -> Option<Vec<String>> {
    let members: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
    let mut done: HashSet<&str> = HashSet::new();

    for &start in &members {
        let mut path = Vec::new();
        if let Some(cycle) = visit(registry, &members, start, &mut path, &mut done) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    registry: &'a ModuleRegistry,
    members: &BTreeSet<&'a str>,
    id: &'a str,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    if let Some(pos) = path.iter().position(|p| *p == id) {
        let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
        cycle.push(id.to_string());
        return Some(cycle);
    }
    if done.contains(id) {
        return None;
    }

    path.push(id);
    if let Some(definition) = registry.get(id) {
        for dep in &definition.dependencies {
            if members.contains(dep.as_str()) {
                if let Some(cycle) = visit(registry, members, dep, path, done) {
                    return Some(cycle);
                }
            }
        }
    }
    path.pop();
    done.insert(id);
    None
}
