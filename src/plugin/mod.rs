//! Build plugins.
//!
//! Plugins run around a generation: `before_build` ahead of graph
//! construction and `after_build` once every asset completed. Files a plugin
//! produces are returned as [`Artifact`]s and go through the same emitter as
//! assets, so they are collision checked and listed in the manifest.
//!
//! | Name    | Stage          | Effect                                        |
//! |---------|----------------|-----------------------------------------------|
//! | `clean` | before (full)  | Empties `output_dir`                          |
//! | `html`  | after          | Writes an HTML page that loads the entry and  |
//! |         |                | links the template's assets via the manifest  |

mod clean;
mod html;

use crate::config::KilnConfig;
use crate::core::BuildMode;
use crate::emit::{Artifact, Manifest};

pub use clean::CleanPlugin;
pub use html::{HtmlPlugin, template_assets};

/// Names accepted in `plugins = [...]`.
pub const NAMES: &[&str] = &["clean", "html"];

pub struct PluginContext<'a> {
    pub config: &'a KilnConfig,
    pub mode: BuildMode,
    /// A scoped watch rebuild rather than a full build.
    pub incremental: bool,
}

/// What a successful generation produced.
pub struct BuildOutput<'a> {
    /// Public URL of the entry's output.
    pub entry_url: &'a str,
    /// Every asset output of the generation, keyed by source.
    pub manifest: &'a Manifest,
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn before_build(&self, _ctx: &PluginContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_build(
        &self,
        _ctx: &PluginContext<'_>,
        _output: &BuildOutput<'_>,
    ) -> anyhow::Result<Vec<Artifact>> {
        Ok(Vec::new())
    }
}

pub fn create(name: &str) -> Option<Box<dyn Plugin>> {
    match name {
        "clean" => Some(Box::new(CleanPlugin)),
        "html" => Some(Box::new(HtmlPlugin)),
        _ => None,
    }
}

/// Plugins enabled in `config`, in configuration order. Unknown names were
/// rejected by validation and are skipped here.
pub fn from_config(config: &KilnConfig) -> Vec<Box<dyn Plugin>> {
    config.plugins.iter().filter_map(|name| create(name)).collect()
}
