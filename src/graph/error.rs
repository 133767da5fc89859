use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop graph construction.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("entry `{}` not found", .0.display())]
    MissingEntry(PathBuf),

    #[error("failed to read `{}`", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot resolve `{specifier}` referenced from `{}`", .referrer.display())]
    UnresolvedReference { referrer: PathBuf, specifier: String },

    #[error("dependency cycle: {}", format_cycle(.path))]
    Cycle { path: Vec<PathBuf> },
}

/// `a -> b -> c -> a`
fn format_cycle(path: &[PathBuf]) -> String {
    let mut names: Vec<String> = path.iter().map(|p| p.display().to_string()).collect();
    if let Some(first) = names.first().cloned() {
        names.push(first);
    }
    names.join(" -> ")
}
