//! `[output]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [output]
//! filename = "bundle.js"      # Output name of the entry asset
//! public_path = "/"           # URL prefix of every emitted file
//! manifest = "manifest.json"  # Manifest file name inside output_dir
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Naming template of the entry asset (supports `[name]`, `[hash]`, ...).
    pub filename: String,

    /// URL prefix under which `output_dir` is served.
    pub public_path: String,

    /// Manifest file name, written into `output_dir`.
    pub manifest: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            filename: "bundle.js".into(),
            public_path: "/".into(),
            manifest: "manifest.json".into(),
        }
    }
}

impl OutputConfig {
    /// Public path with exactly one trailing slash.
    pub fn public_prefix(&self) -> String {
        format!("{}/", self.public_path.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_output_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.output.filename, "bundle.js");
        assert_eq!(config.output.manifest, "manifest.json");
        assert_eq!(config.output.public_prefix(), "/");
    }

    #[test]
    fn test_public_prefix_normalized() {
        let config = test_parse_config("[output]\npublic_path = \"/static\"");
        assert_eq!(config.output.public_prefix(), "/static/");

        let config = test_parse_config("[output]\npublic_path = \"https://cdn.example.com/app/\"");
        assert_eq!(config.output.public_prefix(), "https://cdn.example.com/app/");
    }
}
