use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::freshness::{ContentHash, Fingerprinter};

/// Everything an asset's output depends on.
///
/// Two generations produce the same output for an asset exactly when their
/// keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Asset identity (canonical path).
    pub asset: PathBuf,
    /// Source bytes.
    pub content: ContentHash,
    /// Chain steps, naming policy, public path and mode.
    pub chain: ContentHash,
    /// Resolved dependencies: specifier, URL and output digest of each.
    pub dependencies: ContentHash,
}

impl CacheKey {
    pub fn new(
        asset: PathBuf,
        content: ContentHash,
        chain: ContentHash,
        dependencies: ContentHash,
    ) -> Self {
        Self {
            asset,
            content,
            chain,
            dependencies,
        }
    }

    /// Digest of `(specifier, url, output digest)` triples, in order.
    ///
    /// A dependency whose output changes changes this digest, which
    /// invalidates the dependent and, through its own digest, every asset
    /// further up.
    pub fn dependency_digest<'a>(
        dependencies: impl IntoIterator<Item = (&'a str, &'a str, ContentHash)>,
    ) -> ContentHash {
        dependencies
            .into_iter()
            .fold(Fingerprinter::new().str("deps"), |fp, (specifier, url, digest)| {
                fp.str(specifier).str(url).hash(&digest)
            })
            .finish()
    }
}
