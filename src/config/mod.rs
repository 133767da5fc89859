//! Project configuration management for `kiln.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── build      # [build], [resolve]
//! │   ├── html       # [html]
//! │   ├── output     # [output]
//! │   ├── serve      # [dev_server]
//! │   └── transforms # [[transforms]]
//! ├── error          # ConfigError, ConfigDiagnostics
//! ├── validate       # semantic checks
//! └── mod.rs         # KilnConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section            | Purpose                                          |
//! |--------------------|--------------------------------------------------|
//! | top level          | `entry`, `output_dir`, `plugins`                 |
//! | `[output]`         | Entry file name, public path, manifest name      |
//! | `[[transforms]]`   | Ordered (pattern, chain, naming) rules           |
//! | `[resolve]`        | Extensions tried during reference resolution     |
//! | `[build]`          | Worker count, failure policy, cache location     |
//! | `[html]`           | Template and injection for the `html` plugin     |
//! | `[dev_server]`     | Static server for `kiln serve`                   |

mod error;
pub mod section;
mod util;
mod validate;

pub use error::{ConfigDiagnostic, ConfigDiagnostics, ConfigError, FieldPath};
pub use section::{
    BuildConfig, DevServerConfig, HtmlConfig, InjectPosition, MatchSpec, OutputConfig,
    ResolveConfig, TransformRuleConfig,
};
pub use util::{find_config_file, find_config_file_from};

use crate::cli::{BuildArgs, Cli, Commands};
use crate::log;
use crate::utils::path::normalize_path;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing kiln.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// Entry asset, relative to the project root.
    pub entry: PathBuf,

    /// Output directory, relative to the project root.
    pub output_dir: PathBuf,

    /// Plugin names, run in order (`clean`, `html`).
    pub plugins: Vec<String>,

    pub output: OutputConfig,
    pub transforms: Vec<TransformRuleConfig>,
    pub resolve: ResolveConfig,
    pub build: BuildConfig,
    pub html: HtmlConfig,
    pub dev_server: DevServerConfig,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            root: PathBuf::new(),
            entry: "src/index.js".into(),
            output_dir: "dist".into(),
            plugins: Vec::new(),
            output: OutputConfig::default(),
            transforms: Vec::new(),
            resolve: ResolveConfig::default(),
            build: BuildConfig::default(),
            html: HtmlConfig::default(),
            dev_server: DevServerConfig::default(),
        }
    }
}

impl KilnConfig {
    /// Load configuration for a CLI invocation.
    ///
    /// Searches upward from cwd for the config file; the project root is the
    /// config file's parent directory.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let config_path =
            find_config_file(&cli.config).ok_or_else(|| ConfigError::NotFound(cli.config.clone()))?;

        let mut config = Self::from_path(&config_path)?;
        config.apply_command_options(cli);
        config.validate()?;
        Ok(config)
    }

    /// Load, normalize and validate a config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (mut config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        let root = path.parent().unwrap_or(Path::new("."));
        config.config_path = normalize_path(path);
        config.normalize_paths(root);
        Ok(config)
    }

    /// Parse configuration from a TOML string, resolving paths against `root`.
    pub fn from_str(content: &str, root: &Path) -> Result<Self, ConfigError> {
        let (mut config, _) = Self::parse_with_ignored(content)?;
        config.config_path = root.join("kiln.toml");
        config.normalize_paths(root);
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    /// Apply command-specific configuration options.
    pub fn apply_command_options(&mut self, cli: &Cli) {
        match &cli.command {
            Commands::Build { build_args, .. } => {
                self.apply_build_args(build_args);
            }
            Commands::Serve {
                build_args,
                interface,
                port,
            } => {
                self.apply_build_args(build_args);
                Self::update_option(&mut self.dev_server.interface, interface.as_ref());
                Self::update_option(&mut self.dev_server.port, port.as_ref());
            }
        }
    }

    fn apply_build_args(&mut self, args: &BuildArgs) {
        crate::logger::set_verbose(args.verbose);

        Self::update_option(&mut self.build.jobs, args.jobs.as_ref());
        self.build.clean = args.clean;
        self.build.fail_fast |= args.fail_fast;
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // path normalization
    // ========================================================================

    /// Normalize all paths relative to root directory.
    fn normalize_paths(&mut self, root: &Path) {
        let root = normalize_path(root);

        self.entry = normalize_path(&root.join(&self.entry));
        self.output_dir = normalize_path(&root.join(&self.output_dir));
        self.build.cache_dir = normalize_path(&root.join(&self.build.cache_dir));

        if let Some(template) = self.html.template.take() {
            self.html.template = Some(normalize_path(&root.join(template)));
        }
        if let Some(dir) = self.dev_server.static_dir.take() {
            self.dev_server.static_dir = Some(normalize_path(&root.join(dir)));
        }

        self.root = root;
    }

    // ========================================================================
    // accessors
    // ========================================================================

    /// Get path relative to the project root
    pub fn root_relative(&self, path: impl AsRef<Path>) -> PathBuf {
        path.as_ref()
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.as_ref().to_path_buf())
    }

    /// Directory the dev server serves.
    pub fn static_dir(&self) -> PathBuf {
        self.dev_server
            .static_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.clone())
    }

    /// Location of the persisted cache.
    pub fn cache_path(&self) -> PathBuf {
        self.build.cache_dir.join("cache")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(&self.output.manifest)
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p == name)
    }
}

/// Parse a config rooted at `/project` (tests only).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> KilnConfig {
    KilnConfig::from_str(content, Path::new("/project")).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.root, PathBuf::from("/project"));
        assert_eq!(config.entry, PathBuf::from("/project/src/index.js"));
        assert_eq!(config.output_dir, PathBuf::from("/project/dist"));
        assert_eq!(config.cache_path(), PathBuf::from("/project/.kiln/cache"));
        assert_eq!(config.manifest_path(), PathBuf::from("/project/dist/manifest.json"));
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = test_parse_config(
            r#"
entry = "app/main.js"
output_dir = "build"
plugins = ["clean", "html"]

[output]
filename = "app.[hash].js"

[[transforms]]
match = '\.css$'
chain = ["css", "style-inline"]
"#,
        );
        assert_eq!(config.entry, PathBuf::from("/project/app/main.js"));
        assert_eq!(config.output_dir, PathBuf::from("/project/build"));
        assert!(config.has_plugin("html"));
        assert!(!config.has_plugin("lint"));
        assert_eq!(config.output.filename, "app.[hash].js");
        assert_eq!(config.transforms.len(), 1);
        assert_eq!(config.root_relative(&config.entry), PathBuf::from("app/main.js"));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let (config, ignored) =
            KilnConfig::parse_with_ignored("entry = \"a.js\"\nmystery = 1\n[build]\nturbo = true")
                .unwrap();
        assert_eq!(config.entry, PathBuf::from("a.js"));
        assert_eq!(ignored, vec!["mystery", "build.turbo"]);
    }

    #[test]
    fn test_invalid_toml() {
        let err = KilnConfig::from_str("entry = ", Path::new("/project")).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_from_path_roots_at_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kiln.toml");
        fs::write(&path, "output_dir = \"out\"").unwrap();

        let config = KilnConfig::from_path(&path).unwrap();
        let root = normalize_path(dir.path());
        assert_eq!(config.root, root);
        assert_eq!(config.output_dir, root.join("out"));
        assert_eq!(config.config_path, root.join("kiln.toml"));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = test_parse_config("[build]\njobs = 8");
        let cli = Cli::parse_from(["kiln", "serve", "--port", "3000", "-j", "2", "--clean"]);
        config.apply_command_options(&cli);
        assert_eq!(config.build.jobs, 2);
        assert!(config.build.clean);
        assert_eq!(config.dev_server.port, 3000);
    }
}
