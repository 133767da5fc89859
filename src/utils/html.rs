//! HTML text helpers: entity escaping and tag-relative insertion.

use std::borrow::Cow;

/// Characters that require HTML escaping.
const ESCAPE_CHARS: [char; 5] = ['<', '>', '&', '"', '\''];

#[inline]
fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '&' => Some("&amp;"),
        '"' => Some("&quot;"),
        '\'' => Some("&#39;"),
        _ => None,
    }
}

/// Escape HTML special characters in text content.
///
/// Uses `Cow` to avoid allocation when no escaping is needed.
#[inline]
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(ESCAPE_CHARS) {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match escape_char(c) {
            Some(entity) => result.push_str(entity),
            None => result.push(c),
        }
    }
    Cow::Owned(result)
}

/// Escape an attribute value. Same set as [`escape`].
#[inline]
pub fn escape_attr(s: &str) -> Cow<'_, str> {
    escape(s)
}

/// Byte offset of the last `</tag>` (ASCII case-insensitive).
fn find_closing(html: &str, tag: &str) -> Option<usize> {
    let needle = format!("</{tag}");
    let lower = html.to_ascii_lowercase();
    lower.rfind(&needle).filter(|&at| {
        matches!(lower.as_bytes().get(at + needle.len()), Some(b'>' | b' ' | b'\t' | b'\n' | b'\r'))
    })
}

/// Insert `snippet` right before the last `</tag>`.
///
/// Returns `None` when the document has no such closing tag.
pub fn insert_before_closing(html: &str, tag: &str, snippet: &str) -> Option<String> {
    let at = find_closing(html, tag)?;
    let mut out = String::with_capacity(html.len() + snippet.len());
    out.push_str(&html[..at]);
    out.push_str(snippet);
    out.push_str(&html[at..]);
    Some(out)
}
