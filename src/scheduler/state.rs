//! Shared per-generation bookkeeping.
//!
//! Every field is written without locks: pending counters and the remaining
//! count are atomics, outcomes are write-once cells. A node's outcome is set
//! before its dependents are released, so a worker that picks up a node
//! always sees the outcomes of all of its dependencies.

use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::outcome::NodeOutcome;
use crate::cache::CacheEntry;
use crate::graph::{BuildGraph, NodeIndex};

pub(super) struct RunState {
    /// In-scope dependencies that have not finished yet.
    pending: Vec<AtomicUsize>,
    outcomes: Vec<OnceLock<NodeOutcome>>,
    in_scope: Vec<bool>,
    /// In-scope nodes without an outcome.
    remaining: AtomicUsize,
    /// Set after the first failure when failing fast.
    halted: AtomicBool,
}

impl RunState {
    /// Nodes outside `in_scope` must be given an outcome with
    /// [`RunState::prefill`] before any worker starts.
    pub fn new(graph: &BuildGraph, in_scope: Vec<bool>) -> Self {
        let pending = graph
            .nodes()
            .map(|(_, node)| {
                let deps = node
                    .dependencies
                    .iter()
                    .filter(|dep| in_scope[dep.index()])
                    .count();
                AtomicUsize::new(deps)
            })
            .collect();
        let remaining = in_scope.iter().filter(|s| **s).count();

        Self {
            pending,
            outcomes: (0..graph.len()).map(|_| OnceLock::new()).collect(),
            in_scope,
            remaining: AtomicUsize::new(remaining),
            halted: AtomicBool::new(false),
        }
    }

    pub fn prefill(&self, index: NodeIndex, outcome: NodeOutcome) {
        debug_assert!(!self.in_scope(index));
        let _ = self.outcomes[index.index()].set(outcome);
    }

    #[inline]
    pub fn in_scope(&self, index: NodeIndex) -> bool {
        self.in_scope[index.index()]
    }

    pub fn scope_len(&self) -> usize {
        self.in_scope.iter().filter(|s| **s).count()
    }

    /// In-scope nodes whose dependencies are all outside the scope, in
    /// index order.
    pub fn initially_ready(&self) -> Vec<NodeIndex> {
        self.pending
            .iter()
            .enumerate()
            .filter(|(i, count)| self.in_scope[*i] && count.load(Ordering::Acquire) == 0)
            .map(|(i, _)| NodeIndex::new(i))
            .collect()
    }

    pub fn outcome(&self, index: NodeIndex) -> Option<&NodeOutcome> {
        self.outcomes[index.index()].get()
    }

    pub fn entry(&self, index: NodeIndex) -> Option<&Arc<CacheEntry>> {
        self.outcome(index).and_then(NodeOutcome::entry)
    }

    /// Store a node's outcome. Returns `true` when it was the last
    /// in-scope node.
    pub fn record(&self, index: NodeIndex, outcome: NodeOutcome) -> bool {
        if self.outcomes[index.index()].set(outcome).is_err() {
            return false;
        }
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Mark one dependency of `index` as finished. Returns `true` when that
    /// was the last one and the node is ready.
    pub fn release(&self, index: NodeIndex) -> bool {
        self.pending[index.index()].fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    /// Final outcomes in index order. Nodes never reached are cancelled.
    pub fn into_outcomes(self) -> Vec<NodeOutcome> {
        self.outcomes
            .into_iter()
            .map(|cell| cell.into_inner().unwrap_or(NodeOutcome::Cancelled))
            .collect()
    }
}
