//! Core types shared across the pipeline.

mod cancel;
mod mode;

pub use cancel::{CancelToken, setup_shutdown_handler, shutdown_token};
pub use mode::BuildMode;
