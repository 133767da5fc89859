//! Built-in transforms, addressed by name in `chain = [...]`.
//!
//! | Name           | Effect                                                       |
//! |----------------|--------------------------------------------------------------|
//! | `script`       | follow `import`/`require` specifiers, rewrite them to URLs   |
//! | `css`          | follow `@import`/`url()` references, rewrite them to URLs    |
//! | `style-inline` | wrap a stylesheet in a JS module that injects a `<style>`    |
//! | `html`         | follow `src`/`srcset`/`<link href>`, rewrite them to URLs    |
//! | `minify`       | minify JS (oxc) and CSS (lightningcss), pass through others  |

mod markup;
mod minify;
mod script;
mod style;

use std::sync::Arc;

use super::Transform;

pub use markup::HtmlTransform;
pub use minify::{MinifyTransform, minify_css, minify_js};
pub use script::ScriptTransform;
pub use style::{CssTransform, StyleInlineTransform};

/// Every name accepted in a transform chain.
pub const NAMES: &[&str] = &["script", "css", "style-inline", "html", "minify"];

pub fn is_known(name: &str) -> bool {
    NAMES.contains(&name)
}

/// Instantiate a built-in transform by name.
pub fn create(name: &str) -> Option<Arc<dyn Transform>> {
    let transform: Arc<dyn Transform> = match name {
        "script" => Arc::new(ScriptTransform),
        "css" => Arc::new(CssTransform),
        "style-inline" => Arc::new(StyleInlineTransform),
        "html" => Arc::new(HtmlTransform),
        "minify" => Arc::new(MinifyTransform),
        _ => return None,
    };
    Some(transform)
}
