//! URL to filesystem path resolution.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

/// Resolve a request URL to a file under `serve_root`.
///
/// Directories resolve to their `index.html`. Extensionless routes that
/// match nothing fall back to the root `index.html`, so client-side routes
/// load the page.
pub fn resolve_route(url: &str, serve_root: &Path) -> Option<PathBuf> {
    let clean = normalize_url(url)?;
    if let Some(path) = resolve_path(&clean, serve_root) {
        return Some(path);
    }

    let last = clean.rsplit('/').next().unwrap_or_default();
    if last.contains('.') {
        return None;
    }
    resolve_path("index.html", serve_root)
}

/// Resolve a cleaned relative path, rejecting anything outside `serve_root`.
fn resolve_path(clean: &str, serve_root: &Path) -> Option<PathBuf> {
    if clean.split('/').any(|segment| segment == "..") {
        return None;
    }

    // Canonicalize so symlinks cannot leave the root either
    let canonical = serve_root.join(clean).canonicalize().ok()?;
    let root = serve_root.canonicalize().ok()?;
    if !canonical.starts_with(&root) {
        return None;
    }

    if canonical.is_file() {
        return Some(canonical);
    }
    let index = canonical.join("index.html");
    (canonical.is_dir() && index.is_file()).then_some(index)
}

/// Strip query and fragment, decode, trim slashes. `None` for invalid UTF-8.
fn normalize_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let decoded = percent_decode_str(path).decode_utf8().ok()?.replace('\\', "/");
    Some(decoded.trim_matches('/').to_string())
}
