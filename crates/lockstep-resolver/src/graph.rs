//! Dependency graph of a resolution, for display and path queries.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use lockstep_core::dependency::Dependency;
use lockstep_core::package::PackageVersion;
use lockstep_core::platform::Platform;
use lockstep_core::requirement::Requirement;

use crate::spec_set::ResolutionSet;

/// A node in the resolved dependency graph.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ResolvedNode {
    pub name: String,
    /// Empty for the project root.
    pub version: String,
    pub platform: Platform,
}

impl ResolvedNode {
    fn project(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: String::new(),
            platform: Platform::Pure,
        }
    }

    fn from_spec(spec: &PackageVersion) -> Self {
        Self {
            name: spec.name.clone(),
            version: spec.version.to_string(),
            platform: spec.platform.clone(),
        }
    }
}

impl fmt::Display for ResolvedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            return f.write_str(&self.name);
        }
        write!(f, "{} {}", self.name, self.version)?;
        if !self.platform.is_pure() {
            write!(f, " ({})", self.platform)?;
        }
        Ok(())
    }
}

/// Edge label: the requirement and the group it was declared in.
#[derive(Debug, Clone)]
pub struct DepEdge {
    pub requirement: Requirement,
    pub group: String,
}

/// A resolved dependency graph for one target platform.
pub struct DependencyGraph {
    graph: DiGraph<ResolvedNode, DepEdge>,
    /// Lookup from package name to node index.
    index: HashMap<String, NodeIndex>,
    pub root: Option<NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            root: None,
        }
    }

    /// Build the graph reachable from `declared` on `platform`.
    pub fn from_resolution(
        project: &str,
        resolution: &ResolutionSet,
        declared: &[Dependency],
        platform: &Platform,
    ) -> Self {
        let mut graph = Self::new();
        let root = graph.graph.add_node(ResolvedNode::project(project));
        graph.set_root(root);

        let mut queue: VecDeque<Arc<PackageVersion>> = VecDeque::new();
        for dep in declared
            .iter()
            .filter(|d| d.is_runtime() && d.applies_to(platform))
        {
            let Some(spec) = resolution.best(&dep.name, platform) else {
                continue;
            };
            let (idx, fresh) = graph.add_node(ResolvedNode::from_spec(spec));
            let group = dep.group_names()[0].to_string();
            graph.add_edge(
                root,
                idx,
                DepEdge {
                    requirement: dep.requirement.clone(),
                    group,
                },
            );
            if fresh {
                queue.push_back(Arc::clone(spec));
            }
        }

        while let Some(spec) = queue.pop_front() {
            let Some(from) = graph.find(&spec.name) else {
                continue;
            };
            for dep in spec.runtime_dependencies(platform) {
                let Some(child) = resolution.best(&dep.name, platform) else {
                    continue;
                };
                let (to, fresh) = graph.add_node(ResolvedNode::from_spec(child));
                graph.add_edge(
                    from,
                    to,
                    DepEdge {
                        requirement: dep.requirement.clone(),
                        group: "default".to_string(),
                    },
                );
                if fresh {
                    queue.push_back(Arc::clone(child));
                }
            }
        }
        graph
    }

    /// Add a node unless one with the same name exists. Returns the index and
    /// whether the node is new.
    pub fn add_node(&mut self, node: ResolvedNode) -> (NodeIndex, bool) {
        if let Some(&idx) = self.index.get(&node.name) {
            return (idx, false);
        }
        let name = node.name.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(name, idx);
        (idx, true)
    }

    pub fn set_root(&mut self, idx: NodeIndex) {
        self.root = Some(idx);
    }

    /// Add a dependency edge from `from` to `to`.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: DepEdge) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, edge);
        }
    }

    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &ResolvedNode {
        &self.graph[idx]
    }

    /// Direct dependencies of a node, ordered by name.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        let mut deps: Vec<(NodeIndex, &DepEdge)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect();
        deps.sort_by(|a, b| self.graph[a.0].name.cmp(&self.graph[b.0].name));
        deps
    }

    /// Reverse dependencies (who depends on this node), ordered by name.
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        let mut deps: Vec<(NodeIndex, &DepEdge)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect();
        deps.sort_by(|a, b| self.graph[a.0].name.cmp(&self.graph[b.0].name));
        deps
    }

    /// Render the tree, with a header per declaration group when there is
    /// more than the default one.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = String::new();
        let Some(root) = self.root else {
            return output;
        };
        output.push_str(&format!("{}\n", self.graph[root]));

        let mut sections: BTreeMap<&str, Vec<NodeIndex>> = BTreeMap::new();
        for (idx, edge) in self.dependencies_of(root) {
            sections.entry(edge.group.as_str()).or_default().push(idx);
        }
        let show_headers = sections.len() > 1 || !sections.contains_key("default");

        let mut visited = HashSet::new();
        visited.insert(root);
        let total = sections.len();
        for (n, (group, nodes)) in sections.iter().enumerate() {
            if show_headers {
                output.push_str(&format!("[{group}]\n"));
            }
            let last_section = n + 1 == total;
            for (i, idx) in nodes.iter().enumerate() {
                let is_last = i + 1 == nodes.len() && last_section;
                self.print_subtree(&mut output, *idx, "", is_last, 1, max_depth, &mut visited);
            }
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}\n", self.graph[idx]));

        if max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, (child, _)) in deps.iter().enumerate() {
            self.print_subtree(
                output,
                *child,
                &child_prefix,
                i + 1 == count,
                depth + 1,
                max_depth,
                visited,
            );
        }
        visited.remove(&idx);
    }

    /// The path from the root to `name`, if it is reachable.
    pub fn find_path(&self, name: &str) -> Option<Vec<&ResolvedNode>> {
        let root = self.root?;
        let target = self.find(name)?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.dfs_path(root, target, &mut path, &mut visited) {
            Some(path.iter().map(|&idx| &self.graph[idx]).collect())
        } else {
            None
        }
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        for (child, _) in self.dependencies_of(current) {
            if self.dfs_path(child, target, path, visited) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Render everything that depends on `name`, back to the root.
    pub fn print_inverted_tree(&self, name: &str) -> String {
        let mut output = String::new();
        let Some(idx) = self.find(name) else {
            return output;
        };
        output.push_str(&format!("{}\n", self.graph[idx]));

        let mut visited = HashSet::new();
        visited.insert(idx);
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, edge)) in dependents.iter().enumerate() {
            self.print_inverted_subtree(&mut output, *dep_idx, edge, "", i + 1 == count, &mut visited);
        }
        output
    }

    fn print_inverted_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        edge: &DepEdge,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!(
            "{prefix}{connector}{} requires {}\n",
            self.graph[idx], edge.requirement
        ));
        if !visited.insert(idx) {
            return;
        }
        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, next)) in dependents.iter().enumerate() {
            self.print_inverted_subtree(output, *dep_idx, next, &child_prefix, i + 1 == count, visited);
        }
        visited.remove(&idx);
    }

    /// Groups of packages that depend on each other in a loop, each sorted
    /// by name.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1
                    || scc
                        .first()
                        .is_some_and(|&n| self.graph.edges(n).any(|e| e.target() == n))
            })
            .map(|scc| {
                let mut names: Vec<String> =
                    scc.iter().map(|&n| self.graph[n].name.clone()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Number of nodes (excluding root).
    pub fn len(&self) -> usize {
        let total = self.graph.node_count();
        if self.root.is_some() {
            total.saturating_sub(1)
        } else {
            total
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
