//! Embedded static resources.
//!
//! - `template` - Template types for typed variable injection
//! - `html` - Page used by the `html` plugin when no template is configured

mod template;

pub use template::{Template, TemplateVars};

pub mod html {
    use super::{Template, TemplateVars};

    /// Variables of [`DEFAULT_PAGE`].
    pub struct PageVars<'a> {
        pub title: &'a str,
    }

    impl TemplateVars for PageVars<'_> {
        fn apply(&self, content: &str) -> String {
            content.replace("__KILN_TITLE__", &crate::utils::html::escape(self.title))
        }
    }

    /// Minimal HTML page; the entry script is injected afterwards.
    pub const DEFAULT_PAGE: Template<PageVars<'static>> =
        Template::new(include_str!("html/index.html"));
}
