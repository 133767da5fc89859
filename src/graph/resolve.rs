//! Relative reference resolution.
//!
//! `./util` from `/p/src/index.js` tries, in order:
//!
//! ```text
//! /p/src/util
//! /p/src/util.js          (each [resolve] extension)
//! /p/src/util.mjs
//! /p/src/util/index.js    (index + each extension)
//! /p/src/util/index.mjs
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::transform::extract::split_suffix;
use crate::utils::path::{normalize_path, resolve_against};

#[derive(Debug, Clone)]
pub struct Resolver {
    extensions: Vec<String>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(vec![".js".into(), ".mjs".into()])
    }
}

impl Resolver {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    /// Canonical path of the file `specifier` refers to from `referrer`.
    pub fn resolve(&self, referrer: &Path, specifier: &str) -> Option<PathBuf> {
        let (path, _) = split_suffix(specifier);
        if path.is_empty() {
            return None;
        }
        let decoded = percent_decode_str(path).decode_utf8_lossy();
        let base = referrer.parent()?;
        let candidate = resolve_against(Path::new(decoded.as_ref()), base);

        if candidate.is_file() {
            return Some(normalize_path(&candidate));
        }
        for ext in &self.extensions {
            let mut with_ext = OsString::from(candidate.as_os_str());
            with_ext.push(ext);
            let with_ext = PathBuf::from(with_ext);
            if with_ext.is_file() {
                return Some(normalize_path(&with_ext));
            }
        }
        if candidate.is_dir() {
            for ext in &self.extensions {
                let index = candidate.join(format!("index{ext}"));
                if index.is_file() {
                    return Some(normalize_path(&index));
                }
            }
        }
        None
    }
}
