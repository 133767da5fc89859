//! Graph construction by breadth-first discovery from the entry.
//!
//! Each wave's files are read, hashed, scanned and resolved in parallel.
//! The visited map is only touched between waves, in wave order, so node
//! indices do not depend on thread timing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::{AssetNode, BuildGraph, GraphError, NodeIndex, Reference, Resolver};
use crate::debug;
use crate::freshness::ContentHash;
use crate::transform::{Selection, TransformRegistry};
use crate::utils::path::normalize_path;

/// A file read and scanned, with references resolved to paths.
struct Loaded {
    path: PathBuf,
    source: Arc<[u8]>,
    selection: Selection,
    resolved: Vec<(String, PathBuf)>,
}

/// Result of re-reading changed files between generations.
#[derive(Debug)]
pub enum Reload {
    /// Nodes whose content changed while their reference targets did not.
    /// Their values were replaced in the graph.
    Superseded(Vec<NodeIndex>),
    /// References changed (or a file vanished); the graph must be rebuilt.
    Restructured,
}

pub struct GraphBuilder<'a> {
    registry: &'a TransformRegistry,
    resolver: Resolver,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(registry: &'a TransformRegistry, resolver: Resolver) -> Self {
        Self { registry, resolver }
    }

    /// Discover every asset reachable from `entry`.
    pub fn build(&self, entry: &Path) -> Result<BuildGraph, GraphError> {
        self.build_with_roots(entry, &[])
    }

    /// Discover every asset reachable from `entry` or from one of `roots`.
    ///
    /// Roots are files referenced from outside the graph, such as the html
    /// template's images. They follow the entry in node order.
    pub fn build_with_roots(&self, entry: &Path, roots: &[PathBuf]) -> Result<BuildGraph, GraphError> {
        if !entry.is_file() {
            return Err(GraphError::MissingEntry(entry.to_path_buf()));
        }
        let entry = normalize_path(entry);

        let mut index: FxHashMap<PathBuf, NodeIndex> = FxHashMap::default();
        index.insert(entry.clone(), NodeIndex::new(0));
        let mut wave = vec![entry];
        for root in roots {
            let root = normalize_path(root);
            if !index.contains_key(&root) {
                index.insert(root.clone(), NodeIndex::new(index.len()));
                wave.push(root);
            }
        }
        let mut loaded: Vec<Loaded> = Vec::new();

        while !wave.is_empty() {
            let results: Vec<Result<Loaded, GraphError>> =
                wave.par_iter().map(|path| self.load(path)).collect();

            let mut next = Vec::new();
            for result in results {
                let file = result?;
                for (_, target) in &file.resolved {
                    if !index.contains_key(target) {
                        index.insert(target.clone(), NodeIndex::new(index.len()));
                        next.push(target.clone());
                    }
                }
                loaded.push(file);
            }
            debug!("graph"; "discovered {} new asset(s)", next.len());
            wave = next;
        }

        let nodes: Vec<AssetNode> = loaded
            .into_iter()
            .map(|file| Self::into_node(file, &index))
            .collect();

        if let Some(cycle) = BuildGraph::find_cycle(&nodes) {
            return Err(GraphError::Cycle {
                path: cycle.into_iter().map(|i| nodes[i.index()].path.clone()).collect(),
            });
        }

        Ok(BuildGraph::from_nodes(nodes, NodeIndex::new(0)))
    }

    /// Re-read `changed` files that belong to `graph`.
    ///
    /// Files whose bytes are unchanged are ignored. If any changed file now
    /// references a different set of targets, nothing is modified and
    /// [`Reload::Restructured`] is returned.
    pub fn reload(&self, graph: &mut BuildGraph, changed: &[PathBuf]) -> Result<Reload, GraphError> {
        let targets: Vec<NodeIndex> = changed
            .iter()
            .filter_map(|path| graph.lookup(&normalize_path(path)))
            .collect();

        let results: Vec<(NodeIndex, Result<Loaded, GraphError>)> = targets
            .par_iter()
            .map(|&i| (i, self.load(&graph.node(i).path)))
            .collect();

        let mut replacements = Vec::new();
        for (i, result) in results {
            let file = match result {
                Ok(file) => file,
                Err(GraphError::Read { .. } | GraphError::UnresolvedReference { .. }) => {
                    return Ok(Reload::Restructured);
                }
                Err(e) => return Err(e),
            };
            if ContentHash::of(&file.source) == graph.node(i).fingerprint {
                continue;
            }

            let mut references = Vec::with_capacity(file.resolved.len());
            for (specifier, target) in &file.resolved {
                let Some(target) = graph.lookup(target) else {
                    return Ok(Reload::Restructured);
                };
                references.push(Reference {
                    specifier: specifier.clone(),
                    target,
                });
            }
            let node = AssetNode::new(file.path, file.source, file.selection, references);
            if node.dependencies != graph.node(i).dependencies {
                return Ok(Reload::Restructured);
            }
            replacements.push((i, node));
        }

        let superseded = replacements.iter().map(|(i, _)| *i).collect();
        for (i, node) in replacements {
            graph.supersede(i, node);
        }
        Ok(Reload::Superseded(superseded))
    }

    /// Read, select, scan and resolve one file.
    fn load(&self, path: &Path) -> Result<Loaded, GraphError> {
        let source: Arc<[u8]> = fs::read(path)
            .map_err(|source| GraphError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .into();

        let selection = self.registry.lookup(path);
        let specifiers = self.registry.chain(selection).references(&source);

        let resolved = specifiers
            .into_iter()
            .map(|specifier| match self.resolver.resolve(path, &specifier) {
                Some(target) => Ok((specifier, target)),
                None => Err(GraphError::UnresolvedReference {
                    referrer: path.to_path_buf(),
                    specifier,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Loaded {
            path: path.to_path_buf(),
            source,
            selection,
            resolved,
        })
    }

    fn into_node(file: Loaded, index: &FxHashMap<PathBuf, NodeIndex>) -> AssetNode {
        let references = file
            .resolved
            .into_iter()
            .filter_map(|(specifier, target)| {
                index.get(&target).map(|&target| Reference { specifier, target })
            })
            .collect();
        AssetNode::new(file.path, file.source, file.selection, references)
    }
}
