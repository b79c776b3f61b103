// ── Dependency ordering ──
//
// Kahn's algorithm over instance addresses. Ties break on address order so
// plans are deterministic.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::InstanceAddress;

/// Directed graph: each node lists the nodes it depends on.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    deps: BTreeMap<InstanceAddress, BTreeSet<InstanceAddress>>,
}

/// A dependency cycle, listing the nodes that could not be ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle(pub Vec<InstanceAddress>);

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: InstanceAddress) {
        self.deps.entry(node).or_default();
    }

    /// Record that `node` depends on `dependency`. Edges to nodes outside the
    /// graph are ignored when ordering.
    pub fn add_edge(&mut self, node: InstanceAddress, dependency: InstanceAddress) {
        self.deps.entry(node).or_default().insert(dependency);
    }

    pub fn contains(&self, node: &InstanceAddress) -> bool {
        self.deps.contains_key(node)
    }

    /// Dependencies of `node` that are themselves nodes of this graph.
    pub fn dependencies<'a>(
        &'a self,
        node: &InstanceAddress,
    ) -> impl Iterator<Item = &'a InstanceAddress> + 'a {
        self.deps
            .get(node)
            .into_iter()
            .flatten()
            .filter(|dep| self.deps.contains_key(*dep))
    }

    /// Nodes within this graph that depend on `node`.
    pub fn dependents<'a>(
        &'a self,
        node: &'a InstanceAddress,
    ) -> impl Iterator<Item = &'a InstanceAddress> + 'a {
        self.deps
            .iter()
            .filter(move |(_, deps)| deps.contains(node))
            .map(|(n, _)| n)
    }

    /// Dependencies first.
    pub fn topological_order(&self) -> Result<Vec<InstanceAddress>, Cycle> {
        let mut pending: BTreeMap<&InstanceAddress, usize> = self
            .deps
            .keys()
            .map(|node| (node, self.dependencies(node).count()))
            .collect();
        let mut ready: BTreeSet<&InstanceAddress> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(self.deps.len());

        while let Some(node) = ready.pop_first() {
            pending.remove(node);
            order.push(node.clone());
            for dependent in self.dependents(node) {
                if let Some(count) = pending.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if pending.is_empty() {
            Ok(order)
        } else {
            Err(Cycle(pending.into_keys().cloned().collect()))
        }
    }

    /// Dependents first.
    pub fn reverse_topological_order(&self) -> Result<Vec<InstanceAddress>, Cycle> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;

    fn net(name: &str) -> InstanceAddress {
        InstanceAddress::new(ResourceKind::Network, name)
    }

    fn rule(name: &str) -> InstanceAddress {
        InstanceAddress::new(ResourceKind::FirewallRule, name)
    }

    #[test]
    fn dependencies_come_first() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(rule("a"), net("b"));
        graph.add_edge(rule("c"), rule("a"));
        graph.add_node(net("b"));

        assert_eq!(graph.topological_order().unwrap(), vec![net("b"), rule("a"), rule("c")]);
        assert_eq!(
            graph.reverse_topological_order().unwrap(),
            vec![rule("c"), rule("a"), net("b")]
        );
    }

    #[test]
    fn independent_nodes_keep_address_order() {
        let mut graph = DependencyGraph::new();
        graph.add_node(net("z"));
        graph.add_node(net("a"));
        assert_eq!(graph.topological_order().unwrap(), vec![net("a"), net("z")]);
    }

    #[test]
    fn edges_outside_the_graph_are_ignored() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(rule("a"), net("gone"));
        assert_eq!(graph.topological_order().unwrap(), vec![rule("a")]);
        assert_eq!(graph.dependencies(&rule("a")).count(), 0);
    }

    #[test]
    fn cycles_are_reported() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(net("a"), net("b"));
        graph.add_edge(net("b"), net("a"));
        graph.add_node(net("c"));

        let Cycle(nodes) = graph.topological_order().unwrap_err();
        assert_eq!(nodes, vec![net("a"), net("b")]);
    }
}
