//! Path normalization utilities.
//!
//! Asset identity is the normalized absolute path; output paths and manifest
//! keys are `/`-separated strings so they are stable across platforms.

use std::path::{Component, Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to lexical cleanup of an absolute (or cwd-joined) path.
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        };
        clean_lexically(&absolute)
    })
}

/// Remove `.` components and fold `..` without touching the filesystem.
pub fn clean_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `path` against `base` unless it is already absolute.
#[inline]
pub fn resolve_against(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        clean_lexically(path)
    } else {
        clean_lexically(&base.join(path))
    }
}

/// Render a relative path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `path` relative to `root` with `/` separators, or the full path if it is
/// outside `root`.
pub fn relative_slash(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => to_slash(rel),
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}

/// `path` relative to `base` with `/` separators, walking up with `..`
/// when `path` is not below `base`.
pub fn diff_slash(path: &Path, base: &Path) -> String {
    let path: Vec<Component<'_>> = path.components().collect();
    let base: Vec<Component<'_>> = base.components().collect();
    let common = path
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();

    let ups = std::iter::repeat_n("..".to_string(), base.len() - common);
    let downs = path[common..]
        .iter()
        .map(|c| c.as_os_str().to_string_lossy().into_owned());
    ups.chain(downs).collect::<Vec<_>>().join("/")
}

/// Join a `/`-separated relative path onto a directory.
pub fn join_slash(dir: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .fold(dir.to_path_buf(), |acc, part| acc.join(part))
}
