//! Terminal reporting of generation results.

use std::path::Path;

use super::pipeline::Summary;
use crate::scheduler::{BuildError, FailureKind, NodeFailure};
use crate::utils::path::relative_slash;
use crate::utils::plural_count;

/// `12 assets in 84ms (3 transformed, 9 cached)`
pub fn summary_line(summary: &Summary) -> String {
    let stats = &summary.stats;
    let mut parts = Vec::new();
    for (count, label) in [
        (stats.transformed, "transformed"),
        (stats.cached, "cached"),
        (stats.reused, "reused"),
    ] {
        if count > 0 {
            parts.push(format!("{count} {label}"));
        }
    }
    if summary.written > 0 {
        parts.push(format!("{} written", plural_count(summary.written, "file")));
    }

    let head = format!(
        "{} in {}ms",
        plural_count(summary.assets, "asset"),
        summary.elapsed.as_millis()
    );
    if parts.is_empty() {
        head
    } else {
        format!("{head} ({})", parts.join(", "))
    }
}

/// One-line summary and per-asset detail of a failed generation.
pub fn failure_report(err: &anyhow::Error, root: &Path) -> (String, String) {
    let Some(build) = err.downcast_ref::<BuildError>() else {
        return ("build failed".to_string(), format!("{err:#}"));
    };

    let failed = build.failed().count();
    let skipped = build.skipped().count();
    let summary = if build.cancelled {
        "build cancelled".to_string()
    } else if skipped > 0 {
        format!(
            "{} failed, {} skipped",
            plural_count(failed, "asset"),
            skipped
        )
    } else {
        format!("{} failed", plural_count(failed, "asset"))
    };

    let detail = build
        .failures
        .iter()
        .map(|failure| failure_line(failure, root))
        .collect::<Vec<_>>()
        .join("\n");
    (summary, detail)
}

/// Print every failure of a one-shot build.
pub fn print_failures(err: &anyhow::Error, root: &Path) {
    let Some(build) = err.downcast_ref::<BuildError>() else {
        crate::log!("error"; "{:#}", err);
        return;
    };
    for failure in &build.failures {
        let module = if failure.is_skip() { "skipped" } else { "failed" };
        crate::log!(module; "{}", failure_line(failure, root));
    }
    let (summary, _) = failure_report(err, root);
    crate::log!("build"; "{}", summary);
}

fn failure_line(failure: &NodeFailure, root: &Path) -> String {
    let asset = relative_slash(&failure.asset, root);
    match &failure.kind {
        FailureKind::SkippedDueToDependencyFailure {
            dependency,
            root_cause,
        } if dependency != root_cause => format!(
            "{asset}: dependency {} was skipped because {} failed",
            relative_slash(dependency, root),
            relative_slash(root_cause, root)
        ),
        FailureKind::SkippedDueToDependencyFailure { dependency, .. } => {
            format!("{asset}: dependency {} failed", relative_slash(dependency, root))
        }
        kind => format!("{asset}: {kind}"),
    }
}
