//! Resource Dependency Tracking
//!
//! This module tracks the dependencies between declared resources. Edges are
//! derived from the references embedded in resource properties and from
//! explicit `depends_on` lists. This enables:
//!
//! - Declaration order (what the engine must create first)
//! - Impact analysis (what is affected if a resource is replaced)
//! - Dependency visualization
//! - Cycle detection

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use super::resource::{ResourceKind, StackKind};
use crate::error::{Error, Result};

/// A node in the dependency graph representing a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Logical resource name
    pub name: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Owning stack
    pub stack: StackKind,
    /// Declaration sequence number
    pub sequence: u64,
}

impl ResourceNode {
    /// Create a new resource node
    pub fn new(name: impl Into<String>, kind: ResourceKind, stack: StackKind) -> Self {
        Self {
            name: name.into(),
            kind,
            stack,
            sequence: 0,
        }
    }
}

/// Type of dependency between resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyType {
    /// A property of the dependent embeds an output of the dependency
    Reference,
    /// Listed in `depends_on`
    Explicit,
}

/// A dependency between two resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDependency {
    /// Resource that must exist first
    pub from: String,
    /// Resource that depends on it
    pub to: String,
    /// Type of dependency
    pub dependency_type: DependencyType,
    /// Referenced attributes, for reference dependencies
    pub attributes: Vec<String>,
}

impl ResourceDependency {
    /// Create a new dependency
    pub fn new(from: impl Into<String>, to: impl Into<String>, dep_type: DependencyType) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            dependency_type: dep_type,
            attributes: Vec::new(),
        }
    }

    /// Record the referenced attributes
    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// The dependency graph of declared resources
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    /// The underlying graph
    graph: DiGraph<ResourceNode, ResourceDependency>,
    /// Map from resource name to node index
    node_indices: HashMap<String, NodeIndex>,
    /// Next declaration sequence number
    sequence_counter: u64,
}

impl Default for ResourceGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_indices: HashMap::new(),
            sequence_counter: 0,
        }
    }

    /// Add a node to the graph. Fails if the name is already taken.
    pub fn add_node(&mut self, mut node: ResourceNode) -> Result<NodeIndex> {
        if self.node_indices.contains_key(&node.name) {
            return Err(Error::DuplicateResource(node.name));
        }

        node.sequence = self.sequence_counter;
        self.sequence_counter += 1;

        let name = node.name.clone();
        let idx = self.graph.add_node(node);
        self.node_indices.insert(name, idx);
        Ok(idx)
    }

    /// Add a dependency between two declared resources
    pub fn add_dependency(&mut self, dependency: ResourceDependency) -> Result<()> {
        let from_idx = *self.node_indices.get(&dependency.from).ok_or_else(|| {
            Error::UnresolvedReference {
                resource: dependency.to.clone(),
                reference: dependency.from.clone(),
            }
        })?;
        let to_idx = *self.node_indices.get(&dependency.to).ok_or_else(|| {
            Error::UnresolvedReference {
                resource: dependency.from.clone(),
                reference: dependency.to.clone(),
            }
        })?;

        self.graph.add_edge(from_idx, to_idx, dependency);
        Ok(())
    }

    /// Whether a resource with this name has been declared
    pub fn contains(&self, name: &str) -> bool {
        self.node_indices.contains_key(name)
    }

    /// Check for dependency cycles
    pub fn has_cycles(&self) -> bool {
        let sccs = tarjan_scc(&self.graph);
        sccs.iter().any(|scc| scc.len() > 1)
    }

    /// Get all cycles in the graph
    pub fn get_cycles(&self) -> Vec<Vec<String>> {
        let sccs = tarjan_scc(&self.graph);
        sccs.into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                scc.into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).map(|n| n.name.clone()))
                    .collect()
            })
            .collect()
    }

    /// Get a creation order that respects every dependency
    pub fn creation_order(&self) -> Result<Vec<String>> {
        match toposort(&self.graph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .filter_map(|idx| self.graph.node_weight(idx).map(|n| n.name.clone()))
                .collect()),
            Err(cycle) => {
                let name = self
                    .graph
                    .node_weight(cycle.node_id())
                    .map(|n| n.name.clone())
                    .unwrap_or_default();
                Err(Error::DependencyCycle(format!(
                    "cannot determine creation order, cycle through '{}'",
                    name
                )))
            }
        }
    }

    /// Get all resources that depend on a given resource (direct and transitive)
    pub fn get_dependents(&self, name: &str) -> Vec<String> {
        self.walk(name, Direction::Outgoing)
    }

    /// Get all resources that a given resource depends on (direct and transitive)
    pub fn get_dependencies(&self, name: &str) -> Vec<String> {
        self.walk(name, Direction::Incoming)
    }

    fn walk(&self, name: &str, direction: Direction) -> Vec<String> {
        let mut found = HashSet::new();
        let mut ordered = Vec::new();
        let mut queue = VecDeque::new();

        if let Some(&start_idx) = self.node_indices.get(name) {
            queue.push_back(start_idx);

            while let Some(current) = queue.pop_front() {
                for neighbor in self.graph.neighbors_directed(current, direction) {
                    if let Some(node) = self.graph.node_weight(neighbor) {
                        if found.insert(node.name.clone()) {
                            ordered.push(node.name.clone());
                            queue.push_back(neighbor);
                        }
                    }
                }
            }
        }

        ordered.sort();
        ordered
    }

    /// Get direct dependencies of a resource
    pub fn get_direct_dependencies(&self, name: &str) -> Vec<ResourceDependency> {
        self.node_indices
            .get(name)
            .map(|&idx| {
                self.graph
                    .edges_directed(idx, Direction::Incoming)
                    .map(|edge| edge.weight().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Impact analysis: what would be affected if a resource were replaced
    pub fn impact_analysis(&self, name: &str) -> ImpactAnalysis {
        let affected = self.get_dependents(name);
        let stacks = {
            let mut stacks: Vec<StackKind> = affected
                .iter()
                .filter_map(|n| self.get_node(n).map(|node| node.stack))
                .collect();
            stacks.sort();
            stacks.dedup();
            stacks
        };

        ImpactAnalysis {
            resource: name.to_string(),
            affected_resources: affected,
            affected_stacks: stacks,
            critical_path_length: self.get_critical_path_length(name),
        }
    }

    /// Length of the longest chain of dependents starting at a resource
    fn get_critical_path_length(&self, name: &str) -> usize {
        let mut max_depth = 0;

        if let Some(&start_idx) = self.node_indices.get(name) {
            let mut queue = VecDeque::new();
            queue.push_back((start_idx, 0));
            let mut visited = HashSet::new();

            while let Some((current, depth)) = queue.pop_front() {
                max_depth = max_depth.max(depth);

                for neighbor in self.graph.neighbors_directed(current, Direction::Outgoing) {
                    if visited.insert(neighbor) {
                        queue.push_back((neighbor, depth + 1));
                    }
                }
            }
        }

        max_depth
    }

    /// Get a node by name
    pub fn get_node(&self, name: &str) -> Option<&ResourceNode> {
        self.node_indices
            .get(name)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    /// Iterate over every dependency edge
    pub fn dependencies(&self) -> impl Iterator<Item = &ResourceDependency> {
        self.graph.edge_references().map(|edge| edge.weight())
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Generate a DOT format representation, one cluster per stack
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph resources {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box];\n\n");

        for (stack, names) in self.resources_by_stack() {
            output.push_str(&format!("  subgraph \"cluster_{}\" {{\n", stack));
            output.push_str(&format!("    label=\"{}\";\n", stack));
            for name in names {
                if let Some(node) = self.get_node(&name) {
                    let label = format!("{}\\n{}", node.name, node.kind.type_token());
                    output.push_str(&format!("    \"{}\" [label=\"{}\"];\n", node.name, label));
                }
            }
            output.push_str("  }\n");
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            let dep = edge.weight();
            let style = match dep.dependency_type {
                DependencyType::Reference => "solid",
                DependencyType::Explicit => "dashed",
            };

            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [style={}];\n",
                dep.from, dep.to, style
            ));
        }

        output.push_str("}\n");
        output
    }

    /// Resource names grouped by stack, in declaration order
    pub fn resources_by_stack(&self) -> Vec<(StackKind, Vec<String>)> {
        let mut by_stack: Vec<(StackKind, Vec<String>)> = Vec::new();

        let mut nodes: Vec<&ResourceNode> = self.graph.node_weights().collect();
        nodes.sort_by_key(|n| n.sequence);

        for node in nodes {
            match by_stack.iter_mut().find(|(stack, _)| *stack == node.stack) {
                Some((_, names)) => names.push(node.name.clone()),
                None => by_stack.push((node.stack, vec![node.name.clone()])),
            }
        }

        by_stack
    }
}

/// Result of an impact analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    /// Resource that was analyzed
    pub resource: String,
    /// Resources that depend on it, directly or transitively
    pub affected_resources: Vec<String>,
    /// Stacks owning affected resources
    pub affected_stacks: Vec<StackKind>,
    /// Length of the critical path
    pub critical_path_length: usize,
}

impl ImpactAnalysis {
    /// Get the number of affected resources
    pub fn affected_count(&self) -> usize {
        self.affected_resources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> ResourceNode {
        ResourceNode::new(name, ResourceKind::Subnet, StackKind::Network)
    }

    fn chain() -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph.add_node(node("vpc")).unwrap();
        graph.add_node(node("subnet")).unwrap();
        graph.add_node(node("nat")).unwrap();
        graph
            .add_dependency(ResourceDependency::new("vpc", "subnet", DependencyType::Reference))
            .unwrap();
        graph
            .add_dependency(ResourceDependency::new("subnet", "nat", DependencyType::Reference))
            .unwrap();
        graph
    }

    #[test]
    fn test_graph_creation() {
        let graph = ResourceGraph::new();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = ResourceGraph::new();
        graph.add_node(node("vpc")).unwrap();
        let err = graph.add_node(node("vpc")).unwrap_err();
        assert!(matches!(err, Error::DuplicateResource(name) if name == "vpc"));
    }

    #[test]
    fn test_dependency_on_unknown_resource() {
        let mut graph = ResourceGraph::new();
        graph.add_node(node("subnet")).unwrap();
        let err = graph
            .add_dependency(ResourceDependency::new("vpc", "subnet", DependencyType::Reference))
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { .. }));
    }

    #[test]
    fn test_get_dependents_and_dependencies() {
        let graph = chain();
        assert_eq!(graph.get_dependents("vpc"), vec!["nat", "subnet"]);
        assert_eq!(graph.get_dependencies("nat"), vec!["subnet", "vpc"]);
        assert!(graph.get_dependents("nat").is_empty());
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = chain();
        assert!(!graph.has_cycles());

        graph
            .add_dependency(ResourceDependency::new("nat", "vpc", DependencyType::Explicit))
            .unwrap();

        assert!(graph.has_cycles());
        assert_eq!(graph.get_cycles().len(), 1);
        assert!(matches!(
            graph.creation_order(),
            Err(Error::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_creation_order() {
        let graph = chain();
        let order = graph.creation_order().unwrap();
        assert_eq!(order, vec!["vpc", "subnet", "nat"]);
    }

    #[test]
    fn test_impact_analysis() {
        let graph = chain();
        let impact = graph.impact_analysis("vpc");
        assert_eq!(impact.affected_count(), 2);
        assert_eq!(impact.critical_path_length, 2);
        assert_eq!(impact.affected_stacks, vec![StackKind::Network]);
    }

    #[test]
    fn test_to_dot() {
        let graph = chain();
        let dot = graph.to_dot();
        assert!(dot.contains("digraph resources"));
        assert!(dot.contains("cluster_network"));
        assert!(dot.contains("\"vpc\" -> \"subnet\""));
    }

    #[test]
    fn test_resources_by_stack() {
        let mut graph = chain();
        graph
            .add_node(ResourceNode::new("key", ResourceKind::KmsKey, StackKind::Security))
            .unwrap();
        let by_stack = graph.resources_by_stack();
        assert_eq!(by_stack.len(), 2);
        assert_eq!(by_stack[0].0, StackKind::Network);
        assert_eq!(by_stack[0].1.len(), 3);
        assert_eq!(by_stack[1].1, vec!["key"]);
    }
}
