//! Semantic validation of a parsed configuration.
//!
//! Every problem is collected into one [`ConfigDiagnostics`] report instead
//! of stopping at the first.

use super::{ConfigDiagnostics, ConfigError, FieldPath, KilnConfig, MatchSpec};
use crate::emit::naming;
use crate::plugin;
use crate::transform::builtin;

impl KilnConfig {
    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();

        self.validate_paths(&mut diag);
        self.validate_transforms(&mut diag);
        self.validate_plugins(&mut diag);

        if let Err(message) = naming::validate_template(&self.output.filename) {
            diag.error(FieldPath::new("output.filename"), message);
        }
        if self.output.manifest.is_empty() || self.output.manifest.contains(['/', '\\']) {
            diag.error(
                FieldPath::new("output.manifest"),
                "manifest must be a plain file name",
            );
        }

        diag.into_result()
    }

    fn validate_paths(&self, diag: &mut ConfigDiagnostics) {
        if self.output_dir == self.root {
            diag.error_with_hint(
                FieldPath::new("output_dir"),
                "output directory is the project root",
                "the `clean` plugin would delete your sources; use e.g. `dist`",
            );
        } else if self.root.starts_with(&self.output_dir) {
            diag.error(
                FieldPath::new("output_dir"),
                "output directory contains the project root",
            );
        }

        if self.entry.starts_with(&self.output_dir) {
            diag.error(
                FieldPath::new("entry"),
                format!(
                    "entry `{}` is inside the output directory",
                    self.root_relative(&self.entry).display()
                ),
            );
        }

        for (i, ext) in self.resolve.extensions.iter().enumerate() {
            if !ext.starts_with('.') || ext.len() < 2 {
                diag.error_with_hint(
                    FieldPath::indexed("resolve", i, "extensions"),
                    format!("invalid extension `{ext}`"),
                    "extensions start with a dot, e.g. \".js\"",
                );
            }
        }
    }

    fn validate_transforms(&self, diag: &mut ConfigDiagnostics) {
        for (i, rule) in self.transforms.iter().enumerate() {
            match &rule.pattern {
                MatchSpec::Regex(source) => {
                    if let Err(e) = regex::Regex::new(source) {
                        diag.error(
                            FieldPath::indexed("transforms", i, "match"),
                            format!("invalid regex `{source}`: {e}"),
                        );
                    }
                }
                MatchSpec::Extensions(exts) if exts.is_empty() => {
                    diag.error(
                        FieldPath::indexed("transforms", i, "match"),
                        "extension list is empty",
                    );
                }
                MatchSpec::Extensions(_) => {}
            }

            for name in &rule.chain {
                if !builtin::is_known(name) {
                    diag.error_with_hint(
                        FieldPath::indexed("transforms", i, "chain"),
                        format!("unknown transform `{name}`"),
                        format!("available: {}", builtin::NAMES.join(", ")),
                    );
                }
            }

            if let Some(template) = &rule.filename
                && let Err(message) = naming::validate_template(template)
            {
                diag.error(FieldPath::indexed("transforms", i, "filename"), message);
            }
            if let Some(prefix) = &rule.output_path
                && (prefix.starts_with('/') || prefix.split('/').any(|part| part == ".."))
            {
                diag.error(
                    FieldPath::indexed("transforms", i, "output_path"),
                    format!("`{prefix}` must stay inside the output directory"),
                );
            }
        }
    }

    fn validate_plugins(&self, diag: &mut ConfigDiagnostics) {
        for name in &self.plugins {
            if !plugin::NAMES.contains(&name.as_str()) {
                diag.error_with_hint(
                    FieldPath::new("plugins"),
                    format!("unknown plugin `{name}`"),
                    format!("available: {}", plugin::NAMES.join(", ")),
                );
            }
        }

        if self.has_plugin("html")
            && let Some(template) = &self.html.template
            && !template.is_file()
        {
            diag.error(
                FieldPath::new("html.template"),
                format!(
                    "template `{}` not found",
                    self.root_relative(template).display()
                ),
            );
        }
    }
}
