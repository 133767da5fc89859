//! Build scheduler: runs transform chains over the graph in dependency order.
//!
//! ```text
//!              ┌───────────── ready queue (crossbeam) ◀────────────┐
//!              ▼                                                   │
//!   worker ── process(node) ── cache.get_or_compute ── emit ── release dependents
//!   worker ──    ...                                      (pending counter hits 0)
//! ```
//!
//! Each node has an atomic count of unfinished in-scope dependencies; a node
//! is queued when that count reaches zero, so along every edge the producer
//! finishes before the consumer starts. Workers block on the queue and stop
//! when the last in-scope node has an outcome.
//!
//! A failed node does not stop independent subtrees. Its dependents are
//! skipped with the failing node as root cause, and every failure ends up in
//! one [`BuildError`].

mod outcome;
mod state;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};

use crate::cache::{CacheEntry, CacheKey, IncrementalCache, Lookup};
use crate::core::CancelToken;
use crate::emit::naming::{NameParts, path_token};
use crate::emit::{Artifact, OutputEmitter};
use crate::freshness::ContentHash;
use crate::graph::{AssetNode, BuildGraph, NodeIndex};
use crate::logger::ProgressLine;
use crate::transform::{Asset, AssetMeta, ResolvedReference, TransformRegistry};
use crate::utils::path::diff_slash;

pub use outcome::{
    BuildError, FailureKind, Generation, GenerationStats, NodeFailure, NodeOutcome, Status,
};
use state::RunState;

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Worker threads; 0 means available parallelism.
    pub jobs: usize,
    /// Stop starting nodes after the first failure.
    pub fail_fast: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            jobs: 0,
            fail_fast: false,
        }
    }
}

impl SchedulerOptions {
    fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            std::thread::available_parallelism().map_or(4, |n| n.get())
        }
    }
}

enum Job {
    Run(NodeIndex),
    Stop,
}

// =============================================================================
// Scheduler
// =============================================================================

/// One generation's executor. Borrowed state is read-only except for the
/// cache and the emitter, which are safe to share between workers.
pub struct Scheduler<'a> {
    graph: &'a BuildGraph,
    registry: &'a TransformRegistry,
    cache: &'a IncrementalCache,
    emitter: &'a OutputEmitter,
    options: SchedulerOptions,
    cancel: CancelToken,
    progress: Option<&'a ProgressLine>,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        graph: &'a BuildGraph,
        registry: &'a TransformRegistry,
        cache: &'a IncrementalCache,
        emitter: &'a OutputEmitter,
    ) -> Self {
        Self {
            graph,
            registry,
            cache,
            emitter,
            options: SchedulerOptions::default(),
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: &'a ProgressLine) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Process every node of the graph.
    pub fn run(&self) -> Result<Generation, BuildError> {
        let state = RunState::new(self.graph, vec![true; self.graph.len()]);
        self.execute(state)
    }

    /// Re-run after `changed` nodes were superseded in place.
    ///
    /// The scope is `changed`, every node that did not complete in
    /// `previous`, and all of their transitive dependents. Nodes outside the
    /// scope keep their previous output without a cache lookup. `previous`
    /// must come from a graph with the same structure.
    pub fn run_scoped(
        &self,
        previous: &Generation,
        changed: &[NodeIndex],
    ) -> Result<Generation, BuildError> {
        debug_assert_eq!(previous.outcomes.len(), self.graph.len());

        let seeds = changed.iter().copied().chain(
            self.graph
                .indices()
                .filter(|&i| !previous.outcomes.get(i.index()).is_some_and(NodeOutcome::is_completed)),
        );
        let mut in_scope = vec![false; self.graph.len()];
        for index in self.graph.dependents_closure(seeds) {
            in_scope[index.index()] = true;
        }

        let state = RunState::new(self.graph, in_scope);
        for index in self.graph.indices().filter(|&i| !state.in_scope(i)) {
            state.prefill(index, self.reuse(index, previous.outcome(index)));
        }
        crate::debug!("build"; "scoped run: {} of {} assets", state.scope_len(), self.graph.len());

        self.execute(state)
    }

    fn reuse(&self, index: NodeIndex, previous: &NodeOutcome) -> NodeOutcome {
        let Some(entry) = previous.entry() else {
            return NodeOutcome::Cancelled;
        };
        let node = self.graph.node(index);
        match self.emitter.claim(&node.path, &entry.output) {
            Ok(()) => NodeOutcome::Completed {
                entry: Arc::clone(entry),
                status: Status::Reused,
            },
            Err(e) => NodeOutcome::Failed(FailureKind::Emit(Arc::new(e))),
        }
    }

    fn execute(&self, state: RunState) -> Result<Generation, BuildError> {
        let scope = state.scope_len();
        if scope > 0 {
            let (tx, rx) = channel::unbounded();
            for index in state.initially_ready() {
                let _ = tx.send(Job::Run(index));
            }

            let workers = self.options.worker_count().clamp(1, scope);
            std::thread::scope(|s| {
                for _ in 0..workers {
                    let (tx, rx) = (tx.clone(), rx.clone());
                    let state = &state;
                    s.spawn(move || self.worker(state, &rx, &tx, workers));
                }
            });
        }

        self.finish(state)
    }

    fn worker(&self, state: &RunState, rx: &Receiver<Job>, tx: &Sender<Job>, workers: usize) {
        while let Ok(Job::Run(index)) = rx.recv() {
            let outcome = self.process(state, index);
            if matches!(outcome, NodeOutcome::Failed(_)) && self.options.fail_fast {
                state.halt();
            }
            if let Some(progress) = self.progress {
                progress.inc("assets");
            }

            let last = state.record(index, outcome);
            for &dependent in self.graph.dependents(index) {
                if state.in_scope(dependent) && state.release(dependent) {
                    let _ = tx.send(Job::Run(dependent));
                }
            }
            if last {
                for _ in 0..workers {
                    let _ = tx.send(Job::Stop);
                }
            }
        }
    }

    fn process(&self, state: &RunState, index: NodeIndex) -> NodeOutcome {
        let node = self.graph.node(index);

        for &dep in &node.dependencies {
            match state.outcome(dep) {
                Some(NodeOutcome::Completed { .. }) => {}
                Some(NodeOutcome::Failed(_)) => {
                    return NodeOutcome::Skipped {
                        dependency: dep,
                        root_cause: dep,
                    };
                }
                Some(NodeOutcome::Skipped { root_cause, .. }) => {
                    return NodeOutcome::Skipped {
                        dependency: dep,
                        root_cause: *root_cause,
                    };
                }
                Some(NodeOutcome::Cancelled) | None => return NodeOutcome::Cancelled,
            }
        }

        if self.cancel.is_cancelled() || state.is_halted() {
            return NodeOutcome::Cancelled;
        }

        match self.build_node(state, index, node) {
            Ok((entry, status)) => {
                crate::debug!("build"; "{} -> {} ({:?})", node.path.display(), entry.output, status);
                NodeOutcome::Completed { entry, status }
            }
            Err(kind) => NodeOutcome::Failed(kind),
        }
    }

    fn build_node(
        &self,
        state: &RunState,
        index: NodeIndex,
        node: &AssetNode,
    ) -> Result<(Arc<CacheEntry>, Status), FailureKind> {
        let is_entry = index == self.graph.entry();

        let deps: Vec<(&str, &Arc<CacheEntry>)> = node
            .references
            .iter()
            .filter_map(|r| Some((r.specifier.as_str(), state.entry(r.target)?)))
            .collect();
        let digest = CacheKey::dependency_digest(
            deps.iter()
                .map(|(specifier, entry)| (*specifier, entry.url.as_str(), entry.digest)),
        );
        let key = CacheKey::new(
            node.path.clone(),
            node.fingerprint,
            self.registry.identity(node.selection, is_entry),
            digest,
        );

        let (entry, lookup) = self
            .cache
            .get_or_compute(&key, || {
                let mut meta = AssetMeta::new(&node.path, self.registry.mode());
                meta.references = deps
                    .iter()
                    .map(|(specifier, entry)| ResolvedReference {
                        specifier: (*specifier).to_string(),
                        url: entry.url.clone(),
                    })
                    .collect();
                let asset = self
                    .registry
                    .chain(node.selection)
                    .apply(Asset::new(node.source.to_vec(), meta))?;
                Ok(self.locate(node, is_entry, asset))
            })
            .map_err(FailureKind::Transform)?;

        let artifact = Artifact::new(node.path.clone(), entry.output.clone(), Arc::clone(&entry.content));
        self.emitter
            .emit(&artifact)
            .map_err(|e| FailureKind::Emit(Arc::new(e)))?;

        let status = match lookup {
            Lookup::Hit => {
                if let Some(progress) = self.progress {
                    progress.inc("cached");
                }
                Status::Cached
            }
            Lookup::Computed | Lookup::Shared => Status::Transformed,
        };
        Ok((entry, status))
    }

    /// Name a transformed asset and build its cache entry.
    fn locate(&self, node: &AssetNode, is_entry: bool, asset: Asset) -> CacheEntry {
        let digest = ContentHash::of(&asset.content);
        let stem = node
            .path
            .file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        let dir = path_token(&diff_slash(
            node.path.parent().unwrap_or(Path::new("")),
            self.entry_dir(),
        ));

        let parts = NameParts {
            stem: &stem,
            extension: &asset.meta.extension,
            dir: &dir,
            hash: digest,
        };
        let located = self
            .registry
            .naming(node.selection, is_entry)
            .locate(&parts, self.registry.public_path());

        CacheEntry {
            content: asset.content.into(),
            output: located.output,
            url: located.url,
            digest,
            extension: asset.meta.extension,
        }
    }

    fn entry_dir(&self) -> &Path {
        self.graph
            .node(self.graph.entry())
            .path
            .parent()
            .unwrap_or(Path::new(""))
    }

    fn finish(&self, state: RunState) -> Result<Generation, BuildError> {
        let outcomes = state.into_outcomes();
        let path = |i: NodeIndex| self.graph.node(i).path.clone();

        let mut failures = Vec::new();
        let mut skips = Vec::new();
        for (index, outcome) in self.graph.indices().zip(&outcomes) {
            match outcome {
                NodeOutcome::Failed(kind) => failures.push(NodeFailure {
                    asset: path(index),
                    kind: kind.clone(),
                }),
                NodeOutcome::Skipped {
                    dependency,
                    root_cause,
                } => skips.push(NodeFailure {
                    asset: path(index),
                    kind: FailureKind::SkippedDueToDependencyFailure {
                        dependency: path(*dependency),
                        root_cause: path(*root_cause),
                    },
                }),
                NodeOutcome::Completed { .. } | NodeOutcome::Cancelled => {}
            }
        }
        failures.append(&mut skips);

        let stats = GenerationStats::from_outcomes(&outcomes);
        let generation = Generation {
            manifest: self.emitter.manifest(),
            outcomes,
            stats,
        };
        let cancelled = stats.cancelled > 0;

        if failures.is_empty() && !cancelled {
            Ok(generation)
        } else {
            Err(BuildError {
                failures,
                cancelled,
                generation,
            })
        }
    }
}
