use std::collections::HashSet;

use anyhow::Result;
use regex::Regex;
use scraper::Html;

/// HTML cleanup for article fields.
pub struct Sanitizer {
    style: Regex,
    script: Regex,
}

impl Sanitizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            style: Regex::new(r"(?i)<style[\s\S]*?</style\s*>")?,
            script: Regex::new(r"(?i)<script[\s\S]*?</script\s*>")?,
        })
    }

    /// Plain text with every tag removed and entities decoded.
    pub fn strip_markup(&self, raw: &str) -> String {
        if raw.is_empty() { return String::new(); }
        let frag = Html::parse_fragment(raw);
        frag.root_element().text().collect::<String>().trim().to_string()
    }

    /// Allowlist-sanitized body. Drops iframes and friends and every global attribute like `id` or `class`.
    pub fn sanitize_body(&self, raw: &str) -> String {
        if raw.is_empty() { return String::new(); }
        // the tag stripper would otherwise leave the css/js text behind
        let text = self.style.replace_all(raw, "");
        let text = self.script.replace_all(&text, "");

        ammonia::Builder::default()
            .generic_attributes(HashSet::new())
            .clean(&text)
            .to_string()
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_markup_keeps_only_text() {
        let s = Sanitizer::new().unwrap();
        assert_eq!(s.strip_markup("<b>Hello</b> <i>world</i>"), "Hello world");
        assert_eq!(s.strip_markup("  Tom &amp; Jerry \n"), "Tom & Jerry");
        assert_eq!(s.strip_markup(""), "");
    }

    #[test]
    fn body_loses_style_script_and_global_attributes() {
        let s = Sanitizer::new().unwrap();
        let raw = r#"<p class="lead" id="x">Hi</p><style type="text/css">p { color: red }</style><SCRIPT>alert(1)</SCRIPT>"#;
        assert_eq!(s.sanitize_body(raw), "<p>Hi</p>");
    }

    #[test]
    fn body_drops_disallowed_elements() {
        let s = Sanitizer::new().unwrap();
        let out = s.sanitize_body(r#"<iframe src="https://evil.example"></iframe><p>ok <em>fine</em></p>"#);
        assert_eq!(out, "<p>ok <em>fine</em></p>");
    }
}
