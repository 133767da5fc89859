//! `[[transforms]]` rules.
//!
//! Rules are matched in the order they are written; the first match wins.
//!
//! # Example
//!
//! ```toml
//! [[transforms]]
//! match = '\.css$'                    # regex over the `/`-separated path
//! chain = ["css", "style-inline"]     # steps, run left to right
//!
//! [[transforms]]
//! match = ["png", "jpg", "gif"]       # extension list, case-insensitive
//! filename = "[name][ext]"            # naming template
//! output_path = "assets/images/"      # directory prefix inside output_dir
//! public_path = "/assets/images/"     # URL prefix (defaults to output.public_path)
//! ```

use serde::{Deserialize, Serialize};

/// How a rule selects files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchSpec {
    /// File extensions without the dot.
    Extensions(Vec<String>),
    /// Regular expression over the `/`-separated path.
    Regex(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRuleConfig {
    #[serde(rename = "match")]
    pub pattern: MatchSpec,

    /// Transform names. Empty means copy verbatim.
    #[serde(default)]
    pub chain: Vec<String>,

    #[serde(default)]
    pub filename: Option<String>,

    #[serde(default)]
    pub output_path: Option<String>,

    #[serde(default)]
    pub public_path: Option<String>,
}
