//! Build mode for development/production builds.

use std::fmt;

use clap::ValueEnum;

/// Build mode selected on the command line (`--mode dev|prod`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum BuildMode {
    /// Readable output names, no minification.
    #[value(name = "dev", alias = "development")]
    Development,
    /// Content-hashed names and minified scripts/styles.
    #[value(name = "prod", alias = "production")]
    Production,
}

impl BuildMode {
    /// Check if this is development mode.
    #[inline]
    pub const fn is_dev(self) -> bool {
        matches!(self, Self::Development)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "dev",
            Self::Production => "prod",
        }
    }

    /// Default file name template for assets without an explicit rule name.
    pub const fn default_asset_filename(self) -> &'static str {
        match self {
            Self::Development => "[path][name][ext]",
            Self::Production => "[path][name].[hash][ext]",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
