//! Output emission with collision detection.
//!
//! Every output path is claimed before it is written. Two different sources
//! claiming the same path is an [`EmitError::OutputCollision`]; the same
//! source claiming its own path again is a no-op. Claims are kept in a
//! `DashMap` (entry API), so emission is safe from any number of workers.

mod manifest;
pub mod naming;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rayon::prelude::*;
use thiserror::Error;

use crate::utils::path::{join_slash, relative_slash};

pub use manifest::Manifest;

/// A file to write into the output directory.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Source that produced the file (asset path or plugin input).
    pub source: PathBuf,
    /// `/`-separated path relative to the output directory.
    pub output: String,
    pub content: Arc<[u8]>,
}

impl Artifact {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<String>, content: impl Into<Arc<[u8]>>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            content: content.into(),
        }
    }
}

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub source: String,
    pub output: String,
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error(
        "output `{output}` is produced by both `{}` and `{}`",
        .first.display(),
        .second.display()
    )]
    OutputCollision {
        output: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("failed to write `{}`", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes artifacts for one generation.
pub struct OutputEmitter {
    out_dir: PathBuf,
    root: PathBuf,
    claims: DashMap<String, PathBuf>,
    written: AtomicUsize,
}

impl OutputEmitter {
    /// `root` is the project root, used for manifest keys.
    pub fn new(out_dir: &Path, root: &Path) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            root: root.to_path_buf(),
            claims: DashMap::new(),
            written: AtomicUsize::new(0),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Register `source` as the producer of `output` without writing.
    pub fn claim(&self, source: &Path, output: &str) -> Result<(), EmitError> {
        match self.claims.entry(output.to_string()) {
            Entry::Occupied(existing) if existing.get() != source => {
                Err(EmitError::OutputCollision {
                    output: output.to_string(),
                    first: existing.get().clone(),
                    second: source.to_path_buf(),
                })
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(source.to_path_buf());
                Ok(())
            }
        }
    }

    /// Claim and write one artifact. Identical existing files are left alone.
    pub fn emit(&self, artifact: &Artifact) -> Result<ManifestEntry, EmitError> {
        self.claim(&artifact.source, &artifact.output)?;

        let path = join_slash(&self.out_dir, &artifact.output);
        if !file_matches(&path, &artifact.content) {
            write_file(&path, &artifact.content)
                .map_err(|source| EmitError::Write { path, source })?;
            self.written.fetch_add(1, Ordering::Relaxed);
        }

        Ok(ManifestEntry {
            source: relative_slash(&artifact.source, &self.root),
            output: artifact.output.clone(),
        })
    }

    /// Emit a batch in parallel and return the manifest of all claims so far.
    pub fn emit_all(&self, artifacts: &[Artifact]) -> Result<Manifest, EmitError> {
        artifacts
            .par_iter()
            .map(|artifact| self.emit(artifact).map(|_| ()))
            .collect::<Result<(), EmitError>>()?;
        Ok(self.manifest())
    }

    /// Manifest built from every claim of this generation.
    pub fn manifest(&self) -> Manifest {
        self.claims
            .iter()
            .map(|claim| (relative_slash(claim.value(), &self.root), claim.key().clone()))
            .collect()
    }

    /// Number of files actually written (unchanged files are skipped).
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }
}

fn file_matches(path: &Path, content: &[u8]) -> bool {
    fs::metadata(path).is_ok_and(|m| m.len() == content.len() as u64)
        && fs::read(path).is_ok_and(|existing| existing == content)
}

fn write_file(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, OutputEmitter) {
        let dir = TempDir::new().unwrap();
        let emitter = OutputEmitter::new(&dir.path().join("dist"), dir.path());
        (dir, emitter)
    }

    #[test]
    fn test_emit_writes_and_reports() {
        let (dir, emitter) = setup();
        let artifact = Artifact::new(dir.path().join("src/logo.png"), "assets/logo.png", &b"PNG"[..]);

        let entry = emitter.emit(&artifact).unwrap();
        assert_eq!(entry.source, "src/logo.png");
        assert_eq!(entry.output, "assets/logo.png");
        assert_eq!(fs::read(dir.path().join("dist/assets/logo.png")).unwrap(), b"PNG");
        assert_eq!(emitter.written(), 1);
    }

    #[test]
    fn test_unchanged_file_not_rewritten() {
        let (dir, _) = setup();
        let first = OutputEmitter::new(&dir.path().join("dist"), dir.path());
        let artifact = Artifact::new(dir.path().join("src/a.js"), "a.js", &b"x"[..]);
        first.emit(&artifact).unwrap();

        let second = OutputEmitter::new(&dir.path().join("dist"), dir.path());
        second.emit(&artifact).unwrap();
        assert_eq!(second.written(), 0);
    }

    #[test]
    fn test_collision_between_sources() {
        let (dir, emitter) = setup();
        let a = Artifact::new(dir.path().join("src/a/logo.png"), "logo.png", &b"A"[..]);
        let b = Artifact::new(dir.path().join("src/b/logo.png"), "logo.png", &b"B"[..]);

        emitter.emit(&a).unwrap();
        match emitter.emit(&b) {
            Err(EmitError::OutputCollision { output, first, second }) => {
                assert_eq!(output, "logo.png");
                assert_eq!(first, a.source);
                assert_eq!(second, b.source);
            }
            other => panic!("expected collision, got {other:?}"),
        }
        // The first writer's content is kept
        assert_eq!(fs::read(dir.path().join("dist/logo.png")).unwrap(), b"A");
    }

    #[test]
    fn test_same_source_reclaim_is_ok() {
        let (dir, emitter) = setup();
        let source = dir.path().join("src/a.js");
        emitter.claim(&source, "a.js").unwrap();
        emitter.claim(&source, "a.js").unwrap();
        assert_eq!(emitter.manifest().len(), 1);
    }

    #[test]
    fn test_emit_all_builds_manifest() {
        let (dir, emitter) = setup();
        let artifacts: Vec<Artifact> = (0..20)
            .map(|i| Artifact::new(dir.path().join(format!("src/{i}.js")), format!("{i}.js"), &b"x"[..]))
            .collect();

        let manifest = emitter.emit_all(&artifacts).unwrap();
        assert_eq!(manifest.len(), 20);
        assert_eq!(manifest.get("src/7.js"), Some("7.js"));
    }
}
