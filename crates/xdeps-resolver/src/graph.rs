//! Dependency graph construction and traversal.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use xdeps_core::PackageId;

use crate::cache::PackageCache;

/// Edge label in the dependency graph: the constraint that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepEdge {
    pub constraint: String,
}

impl fmt::Display for DepEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.constraint)
    }
}

/// A resolved dependency graph backed by petgraph.
pub struct DependencyGraph {
    graph: DiGraph<PackageId, DepEdge>,
    index: HashMap<PackageId, NodeIndex>,
    roots: Vec<NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Build the graph of every cached package, with one edge per
    /// (declared dependency, satisfying package) pair.
    ///
    /// The cache's roots become the graph roots. Without recorded roots,
    /// packages nothing depends on are used instead.
    pub fn from_cache(cache: &PackageCache) -> Self {
        let mut graph = Self::new();
        for package in cache.iter() {
            graph.add_node(package.id());
        }
        for package in cache.iter() {
            let from = graph.add_node(package.id());
            for dep in package.dependencies() {
                for target in cache.matching(dep) {
                    let to = graph.add_node(target.id());
                    graph.add_edge(
                        from,
                        to,
                        DepEdge {
                            constraint: dep.constraint().to_string(),
                        },
                    );
                }
            }
        }

        for id in cache.roots() {
            if let Some(idx) = graph.find(id) {
                graph.add_root(idx);
            }
        }
        if graph.roots.is_empty() {
            let orphans: Vec<NodeIndex> = graph
                .graph
                .node_indices()
                .filter(|&idx| graph.dependents_of(idx).is_empty())
                .collect();
            for idx in orphans {
                graph.add_root(idx);
            }
        }
        graph
    }

    /// Add or retrieve a node. If the package already exists, returns the existing index.
    pub fn add_node(&mut self, id: PackageId) -> NodeIndex {
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.index.insert(id, idx);
        idx
    }

    pub fn add_root(&mut self, idx: NodeIndex) {
        if !self.roots.contains(&idx) {
            self.roots.push(idx);
        }
    }

    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    /// Add a dependency edge from `from` to `to`.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: DepEdge) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, edge);
        }
    }

    pub fn find(&self, id: &PackageId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// Get the package identity for an index.
    pub fn node(&self, idx: NodeIndex) -> &PackageId {
        &self.graph[idx]
    }

    /// Direct dependencies of a node, ordered by package identity.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        let mut deps: Vec<(NodeIndex, &DepEdge)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect();
        deps.sort_by(|a, b| self.graph[a.0].cmp(&self.graph[b.0]));
        deps
    }

    /// Reverse dependencies (who depends on this node).
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        let mut deps: Vec<(NodeIndex, &DepEdge)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect();
        deps.sort_by(|a, b| self.graph[a.0].cmp(&self.graph[b.0]));
        deps
    }

    /// Print the dependency tree below every root.
    ///
    /// A package already on the current path is printed but not expanded
    /// again, so cycles render finitely.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = String::new();
        for &root in &self.roots {
            output.push_str(&format!("{}\n", self.graph[root]));
            let mut visited = HashSet::new();
            visited.insert(root);
            let deps = self.dependencies_of(root);
            let count = deps.len();
            for (i, (idx, edge)) in deps.iter().enumerate() {
                let is_last = i == count - 1;
                self.print_subtree(&mut output, *idx, edge, "", is_last, 1, max_depth, &mut visited);
            }
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        edge: &DepEdge,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        if edge.constraint == "*" {
            output.push_str(&format!("{prefix}{connector}{node}\n"));
        } else {
            output.push_str(&format!("{prefix}{connector}{node} ({edge})\n"));
        }

        if let Some(max) = max_depth {
            if depth >= max {
                return;
            }
        }

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, (child, child_edge)) in deps.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(
                output,
                *child,
                child_edge,
                &child_prefix,
                is_last,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&idx);
    }

    /// Find the path from a root to a specific package.
    ///
    /// Accepts `source:name` or just `name`.
    pub fn find_path(&self, target_key: &str) -> Option<Vec<&PackageId>> {
        let target = self.resolve_key(target_key)?;
        for &root in &self.roots {
            let mut path = Vec::new();
            let mut visited = HashSet::new();
            if self.dfs_path(root, target, &mut path, &mut visited) {
                return Some(path.iter().map(|&idx| &self.graph[idx]).collect());
            }
        }
        None
    }

    /// Resolve a user-provided key to a node index, in node insertion order.
    fn resolve_key(&self, key: &str) -> Option<NodeIndex> {
        let (source, name) = match key.split_once(':') {
            Some((source, name)) => (Some(source), name),
            None => (None, key),
        };
        self.graph.node_indices().find(|&idx| {
            let id = &self.graph[idx];
            id.name == name && source.map_or(true, |s| id.source == s)
        })
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

    /// Render the graph in Graphviz DOT format.
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.graph))
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
