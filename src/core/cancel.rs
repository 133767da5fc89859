//! Cancellation for build generations.
//!
//! A generation owns one [`CancelToken`]. Workers check it before starting a
//! node; transforms already running are allowed to finish. Ctrl+C cancels the
//! process-wide token returned by [`shutdown_token`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    ///
    /// Relaxed is enough: at worst one more node starts before the flag is seen.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Process-wide token cancelled by Ctrl+C.
static SHUTDOWN: LazyLock<CancelToken> = LazyLock::new(CancelToken::new);

/// Token that is cancelled when the user presses Ctrl+C.
pub fn shutdown_token() -> CancelToken {
    SHUTDOWN.clone()
}

/// Setup the global Ctrl+C handler. Call once at program start.
///
/// The first Ctrl+C cancels the running generation; a second one exits
/// immediately.
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        if SHUTDOWN.is_cancelled() {
            std::process::exit(130);
        }
        crate::log!("kiln"; "cancelling, waiting for running transforms...");
        SHUTDOWN.cancel();
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}
