//! Minification for JS and CSS outputs.
//!
//! Uses oxc for JavaScript and lightningcss for CSS. Other output types pass
//! through unchanged.

use anyhow::anyhow;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use crate::transform::{Asset, Transform};

/// Minify JavaScript source code.
pub fn minify_js(source: &str) -> anyhow::Result<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if let Some(error) = ret.errors.first() {
        return Err(anyhow!("parse error: {error}"));
    }
    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;
    Ok(code)
}

/// Minify CSS source code.
pub fn minify_css(source: &str) -> anyhow::Result<String> {
    let stylesheet = StyleSheet::parse(source, ParserOptions::default())
        .map_err(|e| anyhow!("parse error: {e}"))?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("print error: {e}"))?;
    Ok(result.code)
}

/// Minifies by output extension; appended to every non-empty chain in `prod`.
#[derive(Debug, Clone, Copy)]
pub struct MinifyTransform;

impl Transform for MinifyTransform {
    fn name(&self) -> &str {
        "minify"
    }

    fn apply(&self, asset: Asset) -> anyhow::Result<Asset> {
        let minified = match asset.meta.extension.as_str() {
            "js" | "mjs" => minify_js(asset.text()?)?,
            "css" => minify_css(asset.text()?)?,
            _ => return Ok(asset),
        };
        Ok(asset.with_text(minified))
    }
}
