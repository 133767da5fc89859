//! `[html]` section, used by the `html` plugin.
//!
//! # Example
//!
//! ```toml
//! [html]
//! template = "src/index.html"   # optional, a minimal page is used otherwise
//! title = "My App"
//! inject = "body"               # "body" or "head"
//! filename = "index.html"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the entry `<script>` tag is inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectPosition {
    #[default]
    Body,
    Head,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlConfig {
    pub template: Option<PathBuf>,
    pub title: String,
    pub inject: InjectPosition,
    pub filename: String,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            template: None,
            title: "Kiln App".into(),
            inject: InjectPosition::Body,
            filename: "index.html".into(),
        }
    }
}
