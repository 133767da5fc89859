use crate::transform::extract::{self, Syntax};
use crate::transform::{Asset, Transform};

/// Rewrites relative module specifiers to the URLs of their outputs.
#[derive(Debug, Clone, Copy)]
pub struct ScriptTransform;

impl Transform for ScriptTransform {
    fn name(&self) -> &str {
        "script"
    }

    fn references(&self, content: &[u8]) -> Vec<String> {
        std::str::from_utf8(content)
            .map(|text| extract::specifiers(Syntax::Script, text))
            .unwrap_or_default()
    }

    fn apply(&self, asset: Asset) -> anyhow::Result<Asset> {
        let text = extract::rewrite(Syntax::Script, asset.text()?, |spec| {
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
    fn test_rewrites_known_specifiers() {
        let mut meta = AssetMeta::new(Path::new("/p/src/index.js"), BuildMode::Development);
        meta.references.push(ResolvedReference {
            specifier: "./util".into(),
            url: "/util.js".into(),
        });
        let asset = Asset::new(
            b"import { f } from './util';\nimport x from 'lodash';\n".to_vec(),
            meta,
        );

        assert_eq!(ScriptTransform.references(&asset.content), vec!["./util"]);
        let out = ScriptTransform.apply(asset).unwrap();
        assert_eq!(
            out.text().unwrap(),
            "import { f } from '/util.js';\nimport x from 'lodash';\n"
        );
        assert_eq!(out.meta.extension, "js");
    }
}
