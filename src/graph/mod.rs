//! Asset dependency graph.
//!
//! ```text
//! entry ──▶ Builder ──▶ BuildGraph (arena)
//!              │            ├── nodes: Vec<AssetNode>    addressed by NodeIndex
//!              │            ├── index: path → NodeIndex
//!              │            └── dependents (reverse edges)
//!              └── Registry (which chain declares references)
//! ```
//!
//! # Invariants
//! - Acyclic; the builder rejects cycles.
//! - Every reference resolves to exactly one node.
//! - Node order is discovery order (breadth-first from the entry, references
//!   in source order), so indices are stable for a given filesystem state.
//! - The graph is read-only during a generation. Watch mode swaps in a new
//!   node value for a changed file ([`BuildGraph::supersede`]) between
//!   generations.

mod builder;
mod error;
mod resolve;


use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::freshness::ContentHash;
use crate::transform::Selection;

pub use builder::{GraphBuilder, Reload};
pub use error::GraphError;
pub use resolve::Resolver;

/// Index of a node in its [`BuildGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(u32);

impl NodeIndex {
    #[inline]
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reference exactly as written, with the node it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub specifier: String,
    pub target: NodeIndex,
}

/// One discovered asset.
#[derive(Debug, Clone)]
pub struct AssetNode {
    /// Canonical absolute path; the node's identity.
    pub path: PathBuf,
    pub source: Arc<[u8]>,
    /// blake3 of `source`.
    pub fingerprint: ContentHash,
    /// Rule that processes this asset.
    pub selection: Selection,
    /// References in source order.
    pub references: Vec<Reference>,
    /// Distinct reference targets, in first-seen order.
    pub dependencies: Vec<NodeIndex>,
}

impl AssetNode {
    pub fn new(
        path: PathBuf,
        source: Arc<[u8]>,
        selection: Selection,
        references: Vec<Reference>,
    ) -> Self {
        let fingerprint = ContentHash::of(&source);
        let mut dependencies: Vec<NodeIndex> = Vec::with_capacity(references.len());
        for reference in &references {
            if !dependencies.contains(&reference.target) {
                dependencies.push(reference.target);
            }
        }
        Self {
            path,
            source,
            fingerprint,
            selection,
            references,
            dependencies,
        }
    }
}

/// Arena of asset nodes with precomputed reverse edges.
#[derive(Debug, Clone)]
pub struct BuildGraph {
    nodes: Vec<AssetNode>,
    index: FxHashMap<PathBuf, NodeIndex>,
    dependents: Vec<Vec<NodeIndex>>,
    entry: NodeIndex,
}

impl BuildGraph {
    /// Assemble a graph from nodes in discovery order.
    ///
    /// Callers guarantee every reference target is in range; cycles are
    /// checked separately with [`BuildGraph::find_cycle`].
    pub fn from_nodes(nodes: Vec<AssetNode>, entry: NodeIndex) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.path.clone(), NodeIndex::new(i)))
            .collect();

        let mut dependents = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for dep in &node.dependencies {
                dependents[dep.index()].push(NodeIndex::new(i));
            }
        }

        Self {
            nodes,
            index,
            dependents,
            entry,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn entry(&self) -> NodeIndex {
        self.entry
    }

    #[inline]
    pub fn node(&self, index: NodeIndex) -> &AssetNode {
        &self.nodes[index.index()]
    }

    pub fn nodes(&self) -> impl ExactSizeIterator<Item = (NodeIndex, &AssetNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeIndex::new(i), node))
    }

    pub fn indices(&self) -> impl ExactSizeIterator<Item = NodeIndex> + use<> {
        (0..self.nodes.len()).map(NodeIndex::new)
    }

    pub fn lookup(&self, path: &Path) -> Option<NodeIndex> {
        self.index.get(path).copied()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    /// Nodes that reference `index` directly.
    #[inline]
    pub fn dependents(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.dependents[index.index()]
    }

    /// `seeds` plus everything that transitively depends on them, sorted.
    pub fn dependents_closure(&self, seeds: impl IntoIterator<Item = NodeIndex>) -> Vec<NodeIndex> {
        let mut marked = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeIndex> = Vec::new();
        for seed in seeds {
            if !marked[seed.index()] {
                marked[seed.index()] = true;
                stack.push(seed);
            }
        }
        while let Some(node) = stack.pop() {
            for &dependent in self.dependents(node) {
                if !marked[dependent.index()] {
                    marked[dependent.index()] = true;
                    stack.push(dependent);
                }
            }
        }
        marked
            .iter()
            .enumerate()
            .filter(|(_, m)| **m)
            .map(|(i, _)| NodeIndex::new(i))
            .collect()
    }

    /// Replace a node's value in place. The reference targets must be
    /// unchanged, otherwise the reverse edges would be stale.
    pub fn supersede(&mut self, index: NodeIndex, node: AssetNode) {
        debug_assert_eq!(self.nodes[index.index()].dependencies, node.dependencies);
        self.nodes[index.index()] = node;
    }

    /// First dependency cycle found, as nodes in cycle order.
    ///
    /// Iterative depth-first walk with an in-progress marker, so deep chains
    /// cannot overflow the stack.
    pub fn find_cycle(nodes: &[AssetNode]) -> Option<Vec<NodeIndex>> {
        const NEW: u8 = 0;
        const ACTIVE: u8 = 1;
        const DONE: u8 = 2;

        let mut state = vec![NEW; nodes.len()];
        for start in 0..nodes.len() {
            if state[start] != NEW {
                continue;
            }
            state[start] = ACTIVE;
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

            while let Some(top) = stack.last_mut() {
                let (node, next) = *top;
                let deps = &nodes[node].dependencies;
                if next == deps.len() {
                    state[node] = DONE;
                    stack.pop();
                    continue;
                }
                top.1 += 1;

                let dep = deps[next].index();
                match state[dep] {
                    NEW => {
                        state[dep] = ACTIVE;
                        stack.push((dep, 0));
                    }
                    ACTIVE => {
                        let from = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                        return Some(stack[from..].iter().map(|&(n, _)| NodeIndex::new(n)).collect());
                    }
                    _ => {}
                }
            }
        }
        None
    }
}
