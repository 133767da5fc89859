//! Stylesheet transforms.

use crate::transform::extract::{self, Syntax};
use crate::transform::{Asset, Transform};

/// Follows `@import` and `url()` references and rewrites them to URLs.
#[derive(Debug, Clone, Copy)]
pub struct CssTransform;

impl Transform for CssTransform {
    fn name(&self) -> &str {
        "css"
    }

    fn references(&self, content: &[u8]) -> Vec<String> {
        std::str::from_utf8(content)
            .map(|text| extract::specifiers(Syntax::Style, text))
            .unwrap_or_default()
    }

    fn apply(&self, asset: Asset) -> anyhow::Result<Asset> {
        let text = extract::rewrite(Syntax::Style, asset.text()?, |spec| {
            asset.meta.url_for(spec)
        });
        Ok(asset.with_text(text))
    }
}

/// Emits a stylesheet as a JS module that injects it into the page.
///
/// The output extension becomes `js`, so importing `./style.css` from a
/// script resolves to a module the browser can load.
#[derive(Debug, Clone, Copy)]
pub struct StyleInlineTransform;

impl Transform for StyleInlineTransform {
    fn name(&self) -> &str {
        "style-inline"
    }

    fn apply(&self, mut asset: Asset) -> anyhow::Result<Asset> {
        let css = serde_json::to_string(asset.text()?)?;
        let id = serde_json::to_string(
            &asset
                .meta
                .source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )?;

        let module = format!(
            "const css = {css};\n\
             const style = document.createElement(\"style\");\n\
             style.setAttribute(\"data-kiln\", {id});\n\
             style.textContent = css;\n\
             document.head.appendChild(style);\n\
             export default css;\n"
        );

        asset.meta.extension = "js".into();
        Ok(asset.with_text(module))
    }
}
