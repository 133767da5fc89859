use std::fs;

use anyhow::Context;

use super::{Plugin, PluginContext};

/// Empties the output directory before every full build.
///
/// Watch rebuilds keep the directory: unchanged outputs are not rewritten
/// and would be lost otherwise.
pub struct CleanPlugin;

impl Plugin for CleanPlugin {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn before_build(&self, ctx: &PluginContext<'_>) -> anyhow::Result<()> {
        let output = &ctx.config.output_dir;
        if ctx.incremental || !output.exists() {
            return Ok(());
        }

        for entry in fs::read_dir(output)
            .with_context(|| format!("failed to read output directory {}", output.display()))?
        {
            let path = entry?.path();
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.with_context(|| format!("failed to remove {}", path.display()))?;
        }
        crate::debug!("clean"; "emptied {}", output.display());
        Ok(())
    }
}
