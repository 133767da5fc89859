use crate::transform::extract::{self, Syntax};
use crate::transform::{Asset, Transform};

/// Follows resource-loading attributes (`src`, `srcset`, `<link href>`) and
/// rewrites them to URLs.
#[derive(Debug, Clone, Copy)]
pub struct HtmlTransform;

impl Transform for HtmlTransform {
    fn name(&self) -> &str {
        "html"
    }

    fn references(&self, content: &[u8]) -> Vec<String> {
        std::str::from_utf8(content)
            .map(|text| extract::specifiers(Syntax::Markup, text))
            .unwrap_or_default()
    }

    fn apply(&self, asset: Asset) -> anyhow::Result<Asset> {
        let text = extract::rewrite(Syntax::Markup, asset.text()?, |spec| {
            asset.meta.url_for(spec)
        });
        Ok(asset.with_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BuildMode;
    use crate::transform::{AssetMeta, ResolvedReference};
    use std::path::Path;

    #[test]
    fn test_rewrites_attributes() {
        let mut meta = AssetMeta::new(Path::new("/p/src/about.html"), BuildMode::Production);
        meta.references.push(ResolvedReference {
            specifier: "images/team.jpg".into(),
            url: "/assets/images/team.jpg".into(),
        });
        let html = r#"<img src="images/team.jpg"><a href="https://example.com">x</a>"#;
        let asset = Asset::new(html.as_bytes().to_vec(), meta);

        assert_eq!(HtmlTransform.references(&asset.content), vec!["images/team.jpg"]);
        let out = HtmlTransform.apply(asset).unwrap();
        assert_eq!(
            out.text().unwrap(),
            r#"<img src="/assets/images/team.jpg"><a href="https://example.com">x</a>"#
        );
    }
}
