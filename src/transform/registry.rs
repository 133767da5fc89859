//! Ordered (pattern, chain, naming) rules.
//!
//! Rules are consulted in registration order and the **first match wins**.
//! Paths no rule matches are copied verbatim with the default naming policy.
//! The registry is built once per configuration and shared read-only.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};

use super::{Pattern, Transform, TransformChain, builtin};
use crate::config::KilnConfig;
use crate::core::BuildMode;
use crate::emit::naming::Naming;
use crate::freshness::{ContentHash, Fingerprinter};

/// Index of a rule in its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(usize);

/// Outcome of [`TransformRegistry::lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selection {
    Rule(RuleId),
    /// No rule matched: copy bytes unchanged.
    Verbatim,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub chain: Arc<TransformChain>,
    pub naming: Naming,
}

impl Rule {
    pub fn new(pattern: Pattern, chain: TransformChain, naming: Naming) -> Self {
        Self {
            pattern,
            chain: Arc::new(chain),
            naming,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformRegistry {
    rules: Vec<Rule>,
    mode: BuildMode,
    default_naming: Naming,
    entry_naming: Naming,
    public_path: String,
    empty: Arc<TransformChain>,
}

impl TransformRegistry {
    pub fn new(mode: BuildMode) -> Self {
        Self {
            rules: Vec::new(),
            mode,
            default_naming: Naming::new(mode.default_asset_filename()),
            entry_naming: Naming::new("bundle.js"),
            public_path: "/".into(),
            empty: Arc::new(TransformChain::default()),
        }
    }

    /// Build the registry described by `[[transforms]]`.
    ///
    /// A `script` rule for `.js`/`.mjs` follows the user rules, and in
    /// `prod` every non-empty chain ends with `minify`.
    pub fn from_config(config: &KilnConfig, mode: BuildMode) -> anyhow::Result<Self> {
        let mut registry = Self::new(mode)
            .with_entry_filename(&config.output.filename)
            .with_public_path(&config.output.public_prefix());

        for (i, rule) in config.transforms.iter().enumerate() {
            let pattern = Pattern::from_spec(&rule.pattern)
                .with_context(|| format!("transforms[{i}].match"))?;
            let steps = rule
                .chain
                .iter()
                .map(|name| {
                    builtin::create(name)
                        .ok_or_else(|| anyhow!("transforms[{i}].chain: unknown transform `{name}`"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let mut naming =
                Naming::new(rule.filename.as_deref().unwrap_or(mode.default_asset_filename()));
            if let Some(prefix) = &rule.output_path {
                naming = naming.with_output_path(prefix);
            }
            if let Some(prefix) = &rule.public_path {
                naming = naming.with_public_path(prefix);
            }

            registry.register_rule(Rule::new(pattern, TransformChain::new(steps), naming));
        }

        let script: Vec<Arc<dyn Transform>> = builtin::create("script").into_iter().collect();
        registry.register(Pattern::extensions(["js", "mjs"]), TransformChain::new(script));

        Ok(registry)
    }

    pub fn with_entry_filename(mut self, template: &str) -> Self {
        self.entry_naming = Naming::new(template);
        self
    }

    pub fn with_public_path(mut self, prefix: &str) -> Self {
        self.public_path = prefix.to_string();
        self
    }

    /// Append a rule with the mode's default naming policy.
    pub fn register(&mut self, pattern: Pattern, chain: TransformChain) -> RuleId {
        let naming = self.default_naming.clone();
        self.register_rule(Rule::new(pattern, chain, naming))
    }

    /// Append a fully specified rule.
    pub fn register_rule(&mut self, mut rule: Rule) -> RuleId {
        if !self.mode.is_dev()
            && !rule.chain.is_empty()
            && !rule.chain.names().ends_with(&["minify"])
            && let Some(minify) = builtin::create("minify")
        {
            rule.chain = Arc::new(rule.chain.then(minify));
        }
        self.rules.push(rule);
        RuleId(self.rules.len() - 1)
    }

    /// First rule whose pattern matches `path`.
    pub fn lookup(&self, path: &Path) -> Selection {
        self.rules
            .iter()
            .position(|rule| rule.pattern.matches(path))
            .map_or(Selection::Verbatim, |i| Selection::Rule(RuleId(i)))
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0]
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn public_path(&self) -> &str {
        &self.public_path
    }

    pub fn chain(&self, selection: Selection) -> &Arc<TransformChain> {
        match selection {
            Selection::Rule(id) => &self.rule(id).chain,
            Selection::Verbatim => &self.empty,
        }
    }

    /// Naming policy of an asset; the entry always uses `[output] filename`.
    pub fn naming(&self, selection: Selection, is_entry: bool) -> &Naming {
        if is_entry {
            return &self.entry_naming;
        }
        match selection {
            Selection::Rule(id) => &self.rule(id).naming,
            Selection::Verbatim => &self.default_naming,
        }
    }

    /// Identity of everything that shapes an asset's output besides its
    /// content and dependencies.
    pub fn identity(&self, selection: Selection, is_entry: bool) -> ContentHash {
        let fp = Fingerprinter::new()
            .hash(&self.chain(selection).fingerprint())
            .str(&self.public_path)
            .str(self.mode.as_str())
            .str(if is_entry { "entry" } else { "asset" });
        self.naming(selection, is_entry).fingerprint(fp).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;
    use crate::transform::FnTransform;

    fn noop(name: &'static str) -> TransformChain {
        TransformChain::new(vec![Arc::new(FnTransform::new(name, Ok))])
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = TransformRegistry::new(BuildMode::Development);
        let special = registry.register(Pattern::regex(r"special\.css$").unwrap(), noop("special"));
        let css = registry.register(Pattern::extensions(["css"]), noop("css"));

        assert_eq!(registry.lookup(Path::new("/p/special.css")), Selection::Rule(special));
        assert_eq!(registry.lookup(Path::new("/p/main.css")), Selection::Rule(css));
        assert_eq!(registry.lookup(Path::new("/p/logo.png")), Selection::Verbatim);
        assert!(registry.chain(Selection::Verbatim).is_empty());
    }

    #[test]
    fn test_from_config_appends_script_and_minify() {
        let config = test_parse_config(
            r#"
[[transforms]]
match = '\.css$'
chain = ["css", "style-inline"]

[[transforms]]
match = ["png"]
filename = "[name][ext]"
output_path = "assets/images/"
"#,
        );

        let prod = TransformRegistry::from_config(&config, BuildMode::Production).unwrap();
        assert_eq!(prod.rules().len(), 3);
        assert_eq!(prod.rules()[0].chain.names(), vec!["css", "style-inline", "minify"]);
        assert!(prod.rules()[1].chain.is_empty());
        assert_eq!(prod.rules()[2].chain.names(), vec!["script", "minify"]);

        let dev = TransformRegistry::from_config(&config, BuildMode::Development).unwrap();
        assert_eq!(dev.rules()[0].chain.names(), vec!["css", "style-inline"]);
        assert_eq!(dev.rules()[2].chain.names(), vec!["script"]);

        let png = dev.lookup(Path::new("/project/src/logo.png"));
        assert_eq!(dev.naming(png, false).filename(), "[name][ext]");
        assert_eq!(dev.naming(png, true).filename(), "bundle.js");
    }

    #[test]
    fn test_user_rule_overrides_default_script() {
        let config = test_parse_config("[[transforms]]\nmatch = [\"js\"]\nchain = []");
        let registry = TransformRegistry::from_config(&config, BuildMode::Development).unwrap();
        let selection = registry.lookup(Path::new("/project/src/index.js"));
        assert_eq!(selection, Selection::Rule(RuleId(0)));
        assert!(registry.chain(selection).is_empty());
    }

    #[test]
    fn test_identity_changes_with_mode_and_entry() {
        let config = test_parse_config("");
        let dev = TransformRegistry::from_config(&config, BuildMode::Development).unwrap();
        let prod = TransformRegistry::from_config(&config, BuildMode::Production).unwrap();
        let js = dev.lookup(Path::new("/project/src/a.js"));

        assert_ne!(dev.identity(js, false), prod.identity(js, false));
        assert_ne!(dev.identity(js, false), dev.identity(js, true));
        assert_eq!(dev.identity(js, false), dev.clone().identity(js, false));
    }
}
