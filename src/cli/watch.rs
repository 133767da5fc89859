//! Watch loop shared by `build --watch` and `serve`.

use super::build::{Session, failure_report, summary_line};
use crate::core::CancelToken;
use crate::logger::{status_error, status_success, status_unchanged};
use crate::utils::plural_count;
use crate::watch::Watcher;

/// Apply debounced change batches to `session` until `cancel` fires.
pub fn run(session: &mut Session, watcher: &mut Watcher, cancel: &CancelToken) {
    while let Some(batch) = watcher.next_batch(cancel) {
        crate::debug!("watch"; "{}", plural_count(batch.len(), "change"));

        match session.rebuild(&batch) {
            Ok(Some(summary)) => status_success(&format!("rebuilt {}", summary_line(&summary))),
            Ok(None) => status_unchanged("no changes"),
            Err(_) if cancel.is_cancelled() => break,
            Err(err) => {
                let (summary, detail) = failure_report(&err, &session.config().root);
                status_error(&summary, &detail);
            }
        }
    }
    crate::debug!("watch"; "stopped");
}
