//! Per-node outcomes, generation results and the aggregated build error.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::CacheEntry;
use crate::emit::{EmitError, Manifest};
use crate::graph::NodeIndex;
use crate::transform::TransformError;

/// How a completed node got its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The chain ran in this generation.
    Transformed,
    /// Served from the cache.
    Cached,
    /// Outside the scope of a watch re-run; previous outcome kept.
    Reused,
}

#[derive(Debug, Clone)]
pub enum NodeOutcome {
    Completed {
        entry: Arc<CacheEntry>,
        status: Status,
    },
    Failed(FailureKind),
    /// A dependency did not complete. `dependency` is the direct dependency
    /// that blocked this node, `root_cause` the node that actually failed.
    Skipped {
        dependency: NodeIndex,
        root_cause: NodeIndex,
    },
    Cancelled,
}

impl NodeOutcome {
    pub fn entry(&self) -> Option<&Arc<CacheEntry>> {
        match self {
            Self::Completed { entry, .. } => Some(entry),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Why a node did not produce output.
#[derive(Debug, Clone)]
pub enum FailureKind {
    Transform(TransformError),
    Emit(Arc<EmitError>),
    SkippedDueToDependencyFailure {
        dependency: PathBuf,
        root_cause: PathBuf,
    },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transform(e) => write!(f, "{e}"),
            Self::Emit(e) => write!(f, "{e}"),
            Self::SkippedDueToDependencyFailure {
                dependency,
                root_cause,
            } if dependency == root_cause => {
                write!(f, "skipped: dependency `{}` failed", dependency.display())
            }
            Self::SkippedDueToDependencyFailure {
                dependency,
                root_cause,
            } => write!(
                f,
                "skipped: dependency `{}` was skipped because `{}` failed",
                dependency.display(),
                root_cause.display()
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeFailure {
    pub asset: PathBuf,
    pub kind: FailureKind,
}

impl NodeFailure {
    pub fn is_skip(&self) -> bool {
        matches!(self.kind, FailureKind::SkippedDueToDependencyFailure { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationStats {
    pub transformed: usize,
    pub cached: usize,
    pub reused: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl GenerationStats {
    pub fn from_outcomes(outcomes: &[NodeOutcome]) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            match outcome {
                NodeOutcome::Completed { status: Status::Transformed, .. } => stats.transformed += 1,
                NodeOutcome::Completed { status: Status::Cached, .. } => stats.cached += 1,
                NodeOutcome::Completed { status: Status::Reused, .. } => stats.reused += 1,
                NodeOutcome::Failed(_) => stats.failed += 1,
                NodeOutcome::Skipped { .. } => stats.skipped += 1,
                NodeOutcome::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub fn completed(&self) -> usize {
        self.transformed + self.cached + self.reused
    }
}

/// Result of one scheduler run, indexed like the graph.
#[derive(Debug, Clone)]
pub struct Generation {
    pub manifest: Manifest,
    pub outcomes: Vec<NodeOutcome>,
    pub stats: GenerationStats,
}

impl Generation {
    pub fn outcome(&self, index: NodeIndex) -> &NodeOutcome {
        &self.outcomes[index.index()]
    }

    pub fn is_healthy(&self) -> bool {
        self.outcomes.iter().all(NodeOutcome::is_completed)
    }
}

/// Every node failure of a generation, with the partial result.
#[derive(Debug)]
pub struct BuildError {
    /// Real failures first, then skips, each in graph order.
    pub failures: Vec<NodeFailure>,
    pub cancelled: bool,
    /// Outputs that were produced; their files are written.
    pub generation: Generation,
}

impl BuildError {
    pub fn failed(&self) -> impl Iterator<Item = &NodeFailure> {
        self.failures.iter().filter(|f| !f.is_skip())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &NodeFailure> {
        self.failures.iter().filter(|f| f.is_skip())
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failed().count();
        let skipped = self.skipped().count();
        if self.cancelled {
            write!(f, "build cancelled")?;
            if failed + skipped > 0 {
                write!(f, " after {failed} failure(s)")?;
            }
        } else {
            write!(f, "{failed} asset(s) failed, {skipped} skipped")?;
        }
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.asset.display(), failure.kind)?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildError {}
