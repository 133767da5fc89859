//! Configuration section definitions.

mod build;
mod html;
mod output;
mod serve;
mod transforms;

pub use build::{BuildConfig, ResolveConfig};
pub use html::{HtmlConfig, InjectPosition};
pub use output::OutputConfig;
pub use serve::DevServerConfig;
pub use transforms::{MatchSpec, TransformRuleConfig};
