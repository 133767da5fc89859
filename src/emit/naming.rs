//! Output naming templates.
//!
//! | Token        | Expands to                                               |
//! |--------------|----------------------------------------------------------|
//! | `[name]`     | source file stem                                         |
//! | `[ext]`      | output extension with the dot (`.js`)                    |
//! | `[path]`     | source directory relative to the entry's directory, `/`-terminated |
//! | `[hash]`     | first 8 hex chars of the output content hash             |
//! | `[hash:N]`   | first N hex chars (1..=64)                               |
//!
//! `[contenthash]` is accepted as an alias of `[hash]`.

use crate::freshness::{ContentHash, Fingerprinter};

const DEFAULT_HASH_LEN: usize = 8;

/// One parsed template piece.
#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Literal(&'a str),
    Name,
    Ext,
    Path,
    Hash(usize),
}

fn parse(template: &str) -> Result<Vec<Token<'_>>, String> {
    let mut tokens = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        if open > 0 {
            tokens.push(Token::Literal(&rest[..open]));
        }
        let Some(close) = rest[open..].find(']') else {
            return Err(format!("unclosed `[` in naming template `{template}`"));
        };
        let inner = &rest[open + 1..open + close];
        tokens.push(parse_token(inner).ok_or_else(|| {
            format!("unknown token `[{inner}]` in naming template `{template}`")
        })?);
        rest = &rest[open + close + 1..];
    }
    if !rest.is_empty() {
        tokens.push(Token::Literal(rest));
    }
    Ok(tokens)
}

fn parse_token(inner: &str) -> Option<Token<'static>> {
    match inner {
        "name" => Some(Token::Name),
        "ext" => Some(Token::Ext),
        "path" => Some(Token::Path),
        "hash" | "contenthash" => Some(Token::Hash(DEFAULT_HASH_LEN)),
        _ => {
            let (key, len) = inner.split_once(':')?;
            let len: usize = len.parse().ok()?;
            (matches!(key, "hash" | "contenthash") && (1..=64).contains(&len))
                .then_some(Token::Hash(len))
        }
    }
}

/// Check a template for unknown tokens and unsafe output locations.
pub fn validate_template(template: &str) -> Result<(), String> {
    if template.trim().is_empty() {
        return Err("naming template is empty".into());
    }
    if template.starts_with('/') || template.split('/').any(|part| part == "..") {
        return Err(format!(
            "naming template `{template}` must stay inside the output directory"
        ));
    }
    parse(template).map(|_| ())
}

/// Inputs of a rendered name.
#[derive(Debug, Clone, Copy)]
pub struct NameParts<'a> {
    pub stem: &'a str,
    /// Output extension without the dot.
    pub extension: &'a str,
    /// `""` or a `/`-terminated relative directory.
    pub dir: &'a str,
    pub hash: ContentHash,
}

/// Where an output lands and how it is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// `/`-separated path relative to the output directory.
    pub output: String,
    /// Public URL.
    pub url: String,
}

/// Naming policy of a transform rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    filename: String,
    output_path: String,
    public_path: Option<String>,
}

impl Naming {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            output_path: String::new(),
            public_path: None,
        }
    }

    /// Directory prefix inside the output directory.
    pub fn with_output_path(mut self, prefix: &str) -> Self {
        self.output_path = slash_terminated(prefix.trim_start_matches("./"));
        self
    }

    /// URL prefix that replaces the global public path for this rule.
    pub fn with_public_path(mut self, prefix: &str) -> Self {
        self.public_path = Some(slash_terminated(prefix));
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Whether the name depends on the output content.
    pub fn uses_hash(&self) -> bool {
        parse(&self.filename).is_ok_and(|tokens| tokens.iter().any(|t| matches!(t, Token::Hash(_))))
    }

    /// Expand the filename template. Unknown tokens are kept literally.
    pub fn render(&self, parts: &NameParts<'_>) -> String {
        let Ok(tokens) = parse(&self.filename) else {
            return self.filename.clone();
        };

        let mut out = String::with_capacity(self.filename.len() + 16);
        for token in tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Name => out.push_str(parts.stem),
                Token::Ext if parts.extension.is_empty() => {}
                Token::Ext => {
                    out.push('.');
                    out.push_str(parts.extension);
                }
                Token::Path => out.push_str(parts.dir),
                Token::Hash(len) => out.push_str(&parts.hash.short(len)),
            }
        }
        out
    }

    /// Output location and public URL for an asset.
    pub fn locate(&self, parts: &NameParts<'_>, default_public: &str) -> Located {
        let filename = self.render(parts);
        let output = format!("{}{}", self.output_path, filename);
        let url = match &self.public_path {
            Some(prefix) => format!("{prefix}{filename}"),
            None => format!("{}{}", slash_terminated(default_public), output),
        };
        Located { output, url }
    }

    pub fn fingerprint(&self, fp: Fingerprinter) -> Fingerprinter {
        fp.str(&self.filename)
            .str(&self.output_path)
            .str(self.public_path.as_deref().unwrap_or(""))
    }
}

fn slash_terminated(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// Value of `[path]`: the source directory relative to `base`.
///
/// Parent segments are replaced by `_` so outputs never escape the output
/// directory.
pub fn path_token(relative_dir: &str) -> String {
    let parts: Vec<&str> = relative_dir
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .map(|p| if p == ".." { "_" } else { p })
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("{}/", parts.join("/"))
    }
}
