//! Transforms: content-rewriting steps applied to assets.
//!
//! A [`Transform`] is a pure function `(content, metadata) -> (content', metadata')`.
//! Transforms are grouped into an ordered [`TransformChain`] and bound to a
//! file pattern in the [`TransformRegistry`]. Steps run left to right, in the
//! order they are written in `kiln.toml`.
//!
//! A transform that understands a file type may also declare the references
//! an asset makes to other assets ([`Transform::references`]); the graph
//! builder follows them.

pub mod builtin;
pub mod extract;
mod pattern;
mod registry;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::core::BuildMode;
use crate::freshness::{ContentHash, Fingerprinter};

pub use pattern::Pattern;
pub use registry::{Rule, RuleId, Selection, TransformRegistry};

// ============================================================================
// Asset + metadata
// ============================================================================

/// A dependency reference resolved to the URL its output is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    /// Specifier exactly as written in the source (`./logo.png`).
    pub specifier: String,
    /// Public URL of the dependency's emitted output (`/assets/images/logo.png`).
    pub url: String,
}

/// Metadata flowing through a transform chain alongside the content.
#[derive(Debug, Clone)]
pub struct AssetMeta {
    /// Absolute source path.
    pub source: PathBuf,
    /// Output extension without the dot. Transforms that change the output
    /// type (e.g. CSS emitted as a JS module) update it.
    pub extension: String,
    pub mode: BuildMode,
    /// Resolved dependencies of this asset, in reference order.
    pub references: Vec<ResolvedReference>,
}

impl AssetMeta {
    pub fn new(source: &Path, mode: BuildMode) -> Self {
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();
        Self {
            source: source.to_path_buf(),
            extension,
            mode,
            references: Vec::new(),
        }
    }

    /// Public URL a specifier resolves to, if it is a known dependency.
    pub fn url_for(&self, specifier: &str) -> Option<&str> {
        self.references
            .iter()
            .find(|r| r.specifier == specifier)
            .map(|r| r.url.as_str())
    }
}

/// Content plus metadata, the unit a transform consumes and produces.
#[derive(Debug, Clone)]
pub struct Asset {
    pub content: Vec<u8>,
    pub meta: AssetMeta,
}

impl Asset {
    pub fn new(content: Vec<u8>, meta: AssetMeta) -> Self {
        Self { content, meta }
    }

    /// Borrow the content as UTF-8 text.
    pub fn text(&self) -> anyhow::Result<&str> {
        std::str::from_utf8(&self.content).map_err(|e| {
            anyhow::anyhow!("{} is not valid UTF-8: {}", self.meta.source.display(), e)
        })
    }

    /// Replace the content with new text.
    pub fn with_text(mut self, text: String) -> Self {
        self.content = text.into_bytes();
        self
    }
}

// ============================================================================
// Transform trait
// ============================================================================

/// A single content-rewriting step.
pub trait Transform: Send + Sync {
    /// Name used in `chain = [...]` and in error messages.
    fn name(&self) -> &str;

    /// Identity of this step's configuration; part of the cache key.
    fn fingerprint(&self) -> String {
        self.name().to_string()
    }

    /// Specifiers of the assets this content references.
    fn references(&self, _content: &[u8]) -> Vec<String> {
        Vec::new()
    }

    fn apply(&self, asset: Asset) -> anyhow::Result<Asset>;
}

type ApplyFn = dyn Fn(Asset) -> anyhow::Result<Asset> + Send + Sync;
type ExtractFn = dyn Fn(&[u8]) -> Vec<String> + Send + Sync;

/// Transform backed by closures, for programmatic registration.
pub struct FnTransform {
    name: String,
    apply: Box<ApplyFn>,
    extract: Option<Box<ExtractFn>>,
}

impl FnTransform {
    pub fn new(
        name: impl Into<String>,
        apply: impl Fn(Asset) -> anyhow::Result<Asset> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            apply: Box::new(apply),
            extract: None,
        }
    }

    /// Declare how this transform finds references in an asset.
    pub fn with_references(
        mut self,
        extract: impl Fn(&[u8]) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.extract = Some(Box::new(extract));
        self
    }
}

impl Transform for FnTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn references(&self, content: &[u8]) -> Vec<String> {
        self.extract.as_ref().map_or_else(Vec::new, |f| f(content))
    }

    fn apply(&self, asset: Asset) -> anyhow::Result<Asset> {
        (self.apply)(asset)
    }
}

impl fmt::Debug for FnTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform").field("name", &self.name).finish()
    }
}

// ============================================================================
// Chain
// ============================================================================

/// A transform failure on one asset. The underlying cause is kept intact.
#[derive(Debug, Clone, Error)]
#[error("transform `{step}` failed: {cause:#}")]
pub struct TransformError {
    pub step: String,
    pub cause: Arc<anyhow::Error>,
}

impl TransformError {
    pub fn new(step: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            step: step.into(),
            cause: Arc::new(cause),
        }
    }
}

/// Ordered, immutable sequence of transforms.
#[derive(Clone, Default)]
pub struct TransformChain {
    steps: Vec<Arc<dyn Transform>>,
}

impl TransformChain {
    pub fn new(steps: Vec<Arc<dyn Transform>>) -> Self {
        Self { steps }
    }

    /// Return a new chain with `step` appended.
    pub fn then(&self, step: Arc<dyn Transform>) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Identity of the chain: the ordered step fingerprints.
    pub fn fingerprint(&self) -> ContentHash {
        self.steps
            .iter()
            .fold(Fingerprinter::new().str("chain"), |fp, step| fp.str(&step.fingerprint()))
            .finish()
    }

    /// References declared by any step, deduplicated, in first-seen order.
    pub fn references(&self, content: &[u8]) -> Vec<String> {
        let mut seen = Vec::new();
        for step in &self.steps {
            for specifier in step.references(content) {
                if !seen.contains(&specifier) {
                    seen.push(specifier);
                }
            }
        }
        seen
    }

    /// Run every step in order. A panicking step is reported as a failure
    /// of that step.
    pub fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        for step in &self.steps {
            asset = panic::catch_unwind(AssertUnwindSafe(|| step.apply(asset)))
                .unwrap_or_else(|payload| {
                    Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())))
                })
                .map_err(|cause| TransformError::new(step.name(), cause))?;
        }
        Ok(asset)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

impl fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
