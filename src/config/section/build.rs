//! `[build]` and `[resolve]` sections.
//!
//! # Example
//!
//! ```toml
//! [build]
//! jobs = 0              # Worker threads (0 = available parallelism)
//! fail_fast = false     # Stop scheduling after the first failure
//! cache_dir = ".kiln"   # Persistent cache location
//!
//! [resolve]
//! extensions = [".js", ".mjs"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub jobs: usize,
    pub fail_fast: bool,
    pub cache_dir: PathBuf,

    /// Clear output and cache before building (CLI `--clean`).
    #[serde(skip)]
    pub clean: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            fail_fast: false,
            cache_dir: ".kiln".into(),
            clean: false,
        }
    }
}

impl BuildConfig {
    /// Effective worker count.
    pub fn worker_count(&self) -> usize {
        match self.jobs {
            0 => std::thread::available_parallelism().map_or(4, |n| n.get()),
            n => n,
        }
    }
}

/// Module resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Extensions tried, in order, when a specifier has no exact match.
    pub extensions: Vec<String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            extensions: vec![".js".into(), ".mjs".into()],
        }
    }
}
