//! File patterns that select a transform rule.

use std::fmt;
use std::path::Path;

use regex::Regex;

use crate::config::MatchSpec;

/// Selects assets by extension set or by regex over the `/`-separated path.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Lowercased extensions without the dot.
    Extensions(Vec<String>),
    Regex(Regex),
}

impl Pattern {
    pub fn extensions<I, S>(exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Extensions(
            exts.into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        )
    }

    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Self::Regex)
    }

    pub fn from_spec(spec: &MatchSpec) -> Result<Self, regex::Error> {
        match spec {
            MatchSpec::Extensions(exts) => Ok(Self::extensions(exts)),
            MatchSpec::Regex(source) => Self::regex(source),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        match self {
            Self::Extensions(exts) => path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| exts.iter().any(|e| e.eq_ignore_ascii_case(ext))),
            Self::Regex(re) => re.is_match(&path.to_string_lossy().replace('\\', "/")),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extensions(exts) => write!(f, "[{}]", exts.join(", ")),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}
