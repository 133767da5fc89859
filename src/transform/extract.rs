//! Reference extraction and rewriting for scripts, stylesheets and markup.
//!
//! Extraction finds the specifiers an asset uses to refer to other local
//! files and rewrites them in place to public URLs:
//!
//! - scripts are parsed with oxc, so only real `import`/`export ... from`,
//!   `import()` and `require()` string literals count. Files the parser
//!   gives up on fall back to a regex scan with comments masked out
//! - stylesheets use `@import` and `url()`, outside `/* */` comments
//! - markup follows resource-loading attributes only: `src`/`srcset` of
//!   media and script elements, `poster`, and `<link href>` for stylesheets,
//!   icons, manifests and preloads. Navigation links (`<a href>`) are pages,
//!   not assets
//!
//! Anything that is not a local file reference is left alone:
//!
//! - URLs with a scheme (`https://`, `data:`, `mailto:`) and protocol-relative `//cdn`
//! - fragments (`#top`) and root-absolute paths (`/favicon.ico`)
//! - bare module names in scripts (`react`), which would need package resolution

use std::ops::Range;
use std::sync::LazyLock;

use oxc::allocator::Allocator;
use oxc::ast::ast::{
    Argument, CallExpression, ExportAllDeclaration, ExportNamedDeclaration, Expression,
    ImportDeclaration, ImportExpression, StringLiteral,
};
use oxc::ast_visit::{Visit, walk};
use oxc::parser::Parser;
use oxc::span::SourceType;
use regex::Regex;

/// Source syntax an extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Script,
    Style,
    Markup,
}

/// `import x from "./a"`, `export * from "./a"` (multi-line clauses included)
static JS_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:import|export)\b[^;'"`]*?\bfrom\s*["']([^"'\n]+)["']"#).unwrap()
});
/// `import "./side-effect.css"`
static JS_BARE_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bimport\s*["']([^"'\n]+)["']"#).unwrap());
/// `import("./lazy")`, `require("./cjs")`
static JS_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:import|require)\s*\(\s*["']([^"'\n]+)["']\s*\)"#).unwrap()
});
static JS_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/|(?m)^\s*//[^\n]*").unwrap());

/// `@import "x.css"`, `@import url(x.css)`
static CSS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"')\s;]+)["']?"#).unwrap()
});
/// `url(x.png)`, `url("x.png")`
static CSS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*["']?([^"')\s]+)["']?\s*\)"#).unwrap());
static CSS_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

/// Opening tags of elements that load a resource.
static HTML_ASSET_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(img|script|source|video|audio|track|embed|input|link)\b[^>]*>").unwrap()
});
/// `src="..."`, `srcset='...'`, `href="..."` inside one tag
static HTML_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s(src|srcset|poster|href)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});
static HTML_REL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\srel\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});
static HTML_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static SCRIPT_PATTERNS: [&LazyLock<Regex>; 3] = [&JS_FROM, &JS_BARE_IMPORT, &JS_CALL];
static STYLE_PATTERNS: [&LazyLock<Regex>; 2] = [&CSS_IMPORT, &CSS_URL];

/// `<link rel>` values whose `href` is loaded by the page.
const LINK_RELS: &[&str] = &[
    "stylesheet",
    "icon",
    "apple-touch-icon",
    "mask-icon",
    "manifest",
    "preload",
    "modulepreload",
    "prefetch",
];

/// Whether a specifier names a local file.
pub fn is_local(syntax: Syntax, specifier: &str) -> bool {
    let specifier = specifier.trim();
    if specifier.is_empty()
        || specifier.starts_with('#')
        || specifier.starts_with('/')
        || specifier.contains("://")
        || specifier.contains("${")
        || has_scheme(specifier)
    {
        return false;
    }
    match syntax {
        Syntax::Script => specifier.starts_with("./") || specifier.starts_with("../"),
        Syntax::Style | Syntax::Markup => true,
    }
}

/// `data:`, `mailto:`, `javascript:` and friends.
fn has_scheme(specifier: &str) -> bool {
    specifier.split_once(':').is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Split `path?query#frag` into the path and the suffix.
pub fn split_suffix(specifier: &str) -> (&str, &str) {
    match specifier.find(['?', '#']) {
        Some(i) => specifier.split_at(i),
        None => (specifier, ""),
    }
}

/// Byte ranges of every local specifier, in source order, without overlaps.
fn spans(syntax: Syntax, text: &str) -> Vec<Range<usize>> {
    let candidates = match syntax {
        Syntax::Script => script_spans(text)
            .unwrap_or_else(|| regex_spans(&SCRIPT_PATTERNS, &JS_COMMENT, text)),
        Syntax::Style => regex_spans(&STYLE_PATTERNS, &CSS_COMMENT, text),
        Syntax::Markup => markup_spans(text),
    };

    let mut spans: Vec<Range<usize>> = candidates
        .into_iter()
        .filter(|span| is_local(syntax, &text[span.clone()]))
        .collect();
    spans.sort_by_key(|r| (r.start, r.end));
    spans.dedup_by(|next, prev| next.start < prev.end);
    spans
}

/// First capture group of every match outside `comments`.
fn regex_spans(patterns: &[&LazyLock<Regex>], comments: &Regex, text: &str) -> Vec<Range<usize>> {
    let masked: Vec<Range<usize>> = comments.find_iter(text).map(|m| m.range()).collect();
    patterns
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.range())
        .filter(|span| !masked.iter().any(|c| c.start <= span.start && span.end <= c.end))
        .collect()
}

/// Specifier literals of a module, or `None` when it does not parse.
fn script_spans(text: &str) -> Option<Vec<Range<usize>>> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, text, SourceType::mjs()).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return None;
    }
    let mut collector = SpecifierCollector {
        text,
        spans: Vec::new(),
    };
    collector.visit_program(&parsed.program);
    Some(collector.spans)
}

struct SpecifierCollector<'t> {
    text: &'t str,
    spans: Vec<Range<usize>>,
}

impl SpecifierCollector<'_> {
    /// Record the literal's contents, without quotes.
    fn push(&mut self, literal: &StringLiteral<'_>) {
        let start = literal.span.start as usize + 1;
        let end = (literal.span.end as usize).saturating_sub(1);
        // Escaped literals cannot be rewritten in place
        if start <= end && self.text.get(start..end) == Some(literal.value.as_str()) {
            self.spans.push(start..end);
        }
    }
}

impl<'a> Visit<'a> for SpecifierCollector<'_> {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        self.push(&decl.source);
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        self.push(&decl.source);
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            self.push(source);
        }
        walk::walk_export_named_declaration(self, decl);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Expression::StringLiteral(source) = &expr.source {
            self.push(source);
        }
        walk::walk_import_expression(self, expr);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if call.callee.is_specific_id("require")
            && call.arguments.len() == 1
            && let Some(Argument::StringLiteral(source)) = call.arguments.first()
        {
            self.push(source);
        }
        walk::walk_call_expression(self, call);
    }
}

/// Resource-loading attribute values of `text`, outside `<!-- -->`.
fn markup_spans(text: &str) -> Vec<Range<usize>> {
    let masked: Vec<Range<usize>> = HTML_COMMENT.find_iter(text).map(|m| m.range()).collect();
    let mut out = Vec::new();

    for caps in HTML_ASSET_TAG.captures_iter(text) {
        let (Some(tag), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if masked.iter().any(|c| c.start <= tag.start() && tag.start() < c.end) {
            continue;
        }
        let is_link = name.as_str().eq_ignore_ascii_case("link");
        if is_link && !loads_resource(tag.as_str()) {
            continue;
        }

        for attr in HTML_ATTR.captures_iter(tag.as_str()) {
            let (Some(key), Some(value)) = (attr.get(1), attr.get(2).or_else(|| attr.get(3)))
            else {
                continue;
            };
            let key = key.as_str().to_ascii_lowercase();
            let offset = tag.start() + value.start();
            match key.as_str() {
                "href" if is_link => out.push(offset..offset + value.len()),
                "src" | "poster" if !is_link => out.push(offset..offset + value.len()),
                "srcset" if !is_link => srcset_spans(value.as_str(), offset, &mut out),
                _ => {}
            }
        }
    }
    out
}

/// Whether a `<link>` tag's `rel` names something the page loads.
fn loads_resource(tag: &str) -> bool {
    HTML_REL.captures(tag).is_some_and(|caps| {
        let rel = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3));
        rel.is_some_and(|rel| {
            rel.as_str()
                .split_ascii_whitespace()
                .any(|token| LINK_RELS.iter().any(|r| r.eq_ignore_ascii_case(token)))
        })
    })
}

/// URLs of a `srcset` list (`a.png 1x, b.png 2x`).
fn srcset_spans(value: &str, offset: usize, out: &mut Vec<Range<usize>>) {
    let mut start = 0;
    for candidate in value.split(',') {
        let trimmed = candidate.trim_start();
        let lead = candidate.len() - trimmed.len();
        if let Some(url) = trimmed.split_ascii_whitespace().next() {
            let at = offset + start + lead;
            out.push(at..at + url.len());
        }
        start += candidate.len() + 1;
    }
}

/// Local specifiers referenced by `text`, deduplicated, in source order.
pub fn specifiers(syntax: Syntax, text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for span in spans(syntax, text) {
        let specifier = &text[span];
        if !out.iter().any(|s| s == specifier) {
            out.push(specifier.to_string());
        }
    }
    out
}

/// Replace each local specifier with the URL returned by `resolve`.
///
/// A `?query` or `#fragment` on the original specifier is kept on the URL.
/// Specifiers `resolve` does not know are left untouched.
pub fn rewrite<'a>(
    syntax: Syntax,
    text: &str,
    resolve: impl Fn(&str) -> Option<&'a str>,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for span in spans(syntax, text) {
        let specifier = &text[span.clone()];
        let Some(url) = resolve(specifier) else {
            continue;
        };
        let (_, suffix) = split_suffix(specifier);
        out.push_str(&text[last..span.start]);
        out.push_str(url);
        out.push_str(suffix);
        last = span.end;
    }
    out.push_str(&text[last..]);
    out
}
