//! `kiln build [--watch]`.
//!
//! Build pipeline phases:
//! - **Clean** - `--clean` clears output and cache, the `clean` plugin empties output
//! - **Discover** - graph from the entry, references resolved
//! - **Schedule** - ready-queue workers, cache lookups, emission
//! - **Finalize** - `after_build` plugins, manifest, cache persistence
//!
//! With `--watch` the session stays alive and applies file changes as scoped
//! rebuilds until Ctrl+C.

mod pipeline;
mod recompile;
mod report;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};

use crate::config::KilnConfig;
use crate::core::{BuildMode, shutdown_token};
use crate::watch::Watcher;

pub use pipeline::{Session, Summary};
pub use report::{failure_report, print_failures, summary_line};

/// Run the build command. `Ok(false)` when assets failed.
pub fn build_command(config: KilnConfig, mode: BuildMode, watch: bool) -> Result<bool> {
    let cancel = shutdown_token();
    // Started first so edits made during the initial build are not lost
    let watcher = if watch { Some(watcher_for(&config)?) } else { None };

    crate::log!("build"; "{} mode, entry {}", mode, config.root_relative(&config.entry).display());
    let mut session = Session::new(config, mode)?.with_cancel(cancel.clone());
    let ok = initial_build(&mut session);

    match watcher {
        Some(mut watcher) => {
            crate::log!("watch"; "waiting for changes, Ctrl+C to stop");
            crate::cli::watch::run(&mut session, &mut watcher, &cancel);
            Ok(true)
        }
        None => Ok(ok),
    }
}

/// Build once and report. Returns whether every asset was produced.
pub fn initial_build(session: &mut Session) -> bool {
    match session.build() {
        Ok(summary) => {
            crate::log!("build"; "{}", summary_line(&summary));
            true
        }
        Err(err) => {
            print_failures(&err, &session.config().root);
            false
        }
    }
}

/// Watcher over the project root, ignoring build outputs.
pub fn watcher_for(config: &KilnConfig) -> Result<Watcher> {
    let ignored = vec![config.output_dir.clone(), config.build.cache_dir.clone()];
    Watcher::new(&config.root, ignored).context("failed to start file watcher")
}
