use std::collections::{BTreeMap, BTreeSet};

use crate::error::GraphError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepNode {
    pub name: String,          // module name
    pub index: usize,          // definition order, for tie-breaking
    pub requires: Vec<String>, // names from `deps`
}

/// Names in `node.requires` that are not modules at all.
pub fn unknown_requires<'a>(node: &'a DepNode, known: &BTreeSet<&str>) -> Vec<&'a str> {
    node.requires
        .iter()
        .map(String::as_str)
        .filter(|r| !known.contains(r))
        .collect()
}

/// Order modules so each comes after everything in its `deps`.
/// - Unknown deps are ignored here; the caller reports them per module.
/// - Tie-break: definition order.
/// - Cycles => error naming every module left in the cycle.
pub fn topo_sort(nodes: Vec<DepNode>) -> Result<Vec<DepNode>, GraphError> {
    let mut map: BTreeMap<String, DepNode> = BTreeMap::new();
    for n in nodes {
        if map.contains_key(&n.name) {
            return Err(GraphError::DuplicateModule(n.name));
        }
        map.insert(n.name.clone(), n);
    }

    // Build indegree and outgoing edges
    let mut indeg: BTreeMap<&str, usize> = map.keys().map(|k| (k.as_str(), 0)).collect();
    let mut outgoing: BTreeMap<&str, Vec<&str>> =
        map.keys().map(|k| (k.as_str(), Vec::new())).collect();

    for (k, node) in map.iter() {
        let mut seen = BTreeSet::new();
        for dep in node.requires.iter() {
            if !map.contains_key(dep) || !seen.insert(dep.as_str()) {
                continue;
            }
            // edge dep -> k
            if let Some(out) = outgoing.get_mut(dep.as_str()) {
                out.push(k.as_str());
            }
            if let Some(d) = indeg.get_mut(k.as_str()) {
                *d += 1;
            }
        }
    }

    let mut ready: BTreeSet<(usize, &str)> = indeg
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(k, _)| (map[*k].index, *k))
        .collect();

    let mut ordered: Vec<&str> = Vec::with_capacity(map.len());

    while let Some((_, key)) = ready.pop_first() {
        ordered.push(key);

        for child in outgoing[key].iter() {
            if let Some(e) = indeg.get_mut(child) {
                *e -= 1;
                if *e == 0 {
                    ready.insert((map[*child].index, *child));
                }
            }
        }
    }

    if ordered.len() != map.len() {
        let stuck: Vec<String> = indeg
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|(k, _)| k.to_string())
            .collect();
        return Err(GraphError::DependencyCycle(stuck));
    }

    let ordered: Vec<String> = ordered.into_iter().map(str::to_string).collect();
    Ok(ordered
        .iter()
        .filter_map(|k| map.remove(k))
        .collect())
}
