//! `html` plugin: writes the page that loads the entry bundle.
//!
//! The page comes from `[html] template` or the embedded default. `{{ title }}`
//! placeholders are replaced with `[html] title`; a template without a
//! `<title>` element gets one in its head. The entry is loaded with
//! `<script src>` before `</body>`, or deferred before `</head>` when
//! `inject = "head"`.
//!
//! Local files the template loads (`<img src>`, `<link rel="icon" href>`,
//! ...) join the graph as extra roots, see [`template_assets`]. On the page
//! they are rewritten through the manifest to `public_path` + emitted path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context;
use regex::{NoExpand, Regex};
use rustc_hash::FxHashMap;

use super::{BuildOutput, Plugin, PluginContext};
use crate::config::{InjectPosition, KilnConfig};
use crate::embed::html::{DEFAULT_PAGE, PageVars};
use crate::emit::{Artifact, Manifest};
use crate::graph::{GraphError, Resolver};
use crate::transform::extract::{self, Syntax};
use crate::utils::html::{escape, escape_attr, insert_before_closing};
use crate::utils::path::relative_slash;

static TITLE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*title\s*\}\}").unwrap());

static TITLE_ELEMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<title[\s>]").unwrap());

pub struct HtmlPlugin;

impl Plugin for HtmlPlugin {
    fn name(&self) -> &'static str {
        "html"
    }

    fn after_build(
        &self,
        ctx: &PluginContext<'_>,
        output: &BuildOutput<'_>,
    ) -> anyhow::Result<Vec<Artifact>> {
        let html = &ctx.config.html;

        let (source, page) = match &html.template {
            Some(template) => {
                let text = fs::read_to_string(template)
                    .with_context(|| format!("failed to read html template {}", template.display()))?;
                let linked = link_assets(&text, template, ctx.config, output.manifest);
                (template.clone(), render_template(&linked, &html.title))
            }
            None => (
                ctx.config.root.join(&html.filename),
                DEFAULT_PAGE.render(&PageVars { title: &html.title }),
            ),
        };

        let page = inject_script(&page, output.entry_url, html.inject);
        crate::debug!("html"; "{} -> {}", source.display(), html.filename);
        Ok(vec![Artifact::new(source, html.filename.clone(), page.into_bytes())])
    }
}

/// Files the html template loads, resolved against its directory.
///
/// Empty without the `html` plugin or a template.
pub fn template_assets(config: &KilnConfig, resolver: &Resolver) -> Result<Vec<PathBuf>, GraphError> {
    let Some(template) = config.html.template.as_deref().filter(|_| config.has_plugin("html")) else {
        return Ok(Vec::new());
    };
    let text = fs::read_to_string(template).map_err(|source| GraphError::Read {
        path: template.to_path_buf(),
        source,
    })?;

    extract::specifiers(Syntax::Markup, &text)
        .into_iter()
        .map(|specifier| {
            resolver
                .resolve(template, &specifier)
                .ok_or_else(|| GraphError::UnresolvedReference {
                    referrer: template.to_path_buf(),
                    specifier,
                })
        })
        .collect()
}

/// Point the template's local references at their emitted files.
fn link_assets(text: &str, template: &Path, config: &KilnConfig, manifest: &Manifest) -> String {
    let resolver = Resolver::new(config.resolve.extensions.clone());
    let prefix = config.output.public_prefix();

    let urls: FxHashMap<String, String> = extract::specifiers(Syntax::Markup, text)
        .into_iter()
        .filter_map(|specifier| {
            let source = resolver.resolve(template, &specifier)?;
            let output = manifest.get(&relative_slash(&source, &config.root))?;
            Some((specifier, format!("{prefix}{output}")))
        })
        .collect();

    extract::rewrite(Syntax::Markup, text, |specifier| urls.get(specifier).map(String::as_str))
}

fn render_template(text: &str, title: &str) -> String {
    let title = escape(title);
    let page = TITLE_PLACEHOLDER
        .replace_all(text, NoExpand(&title))
        .into_owned();
    if TITLE_ELEMENT.is_match(&page) {
        return page;
    }
    let element = format!("<title>{title}</title>");
    insert_before_closing(&page, "head", &element).unwrap_or(page)
}

fn inject_script(page: &str, url: &str, position: InjectPosition) -> String {
    let url = escape_attr(url);
    match position {
        InjectPosition::Body => {
            let tag = format!("<script src=\"{url}\"></script>");
            insert_before_closing(page, "body", &tag).unwrap_or_else(|| format!("{page}{tag}"))
        }
        InjectPosition::Head => {
            let tag = format!("<script defer src=\"{url}\"></script>");
            insert_before_closing(page, "head", &tag).unwrap_or_else(|| format!("{tag}{page}"))
        }
    }
}
