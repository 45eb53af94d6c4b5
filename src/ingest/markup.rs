use regex::Regex;
use std::sync::OnceLock;

use crate::util::{collapse_whitespace, decode_html_entities, strip_control_chars};

fn hidden_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>|<!--.*?-->")
            .expect("hidden block pattern is valid")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"))
}

/// Reduce an HTML description to plain text.
///
/// Scripts, styles and comments are dropped with their content, remaining
/// tags are replaced by a space, character references are decoded, control
/// characters are removed and whitespace is folded.
///
/// # Examples
///
/// ```
/// use reaper::ingest::strip_markup;
///
/// assert_eq!(
///     strip_markup("<p>Fish &amp; <b>chips</b></p><script>x()</script>"),
///     "Fish & chips"
/// );
/// ```
pub fn strip_markup(html: &str) -> String {
    let without_blocks = hidden_block_regex().replace_all(html, " ");
    let without_tags = tag_regex().replace_all(&without_blocks, " ");
    let decoded = decode_html_entities(&without_tags);
    let clean = strip_control_chars(&decoded);
    collapse_whitespace(&clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(strip_markup("Just words."), "Just words.");
    }

    #[test]
    fn test_tags_become_word_breaks() {
        assert_eq!(
            strip_markup("<p>First</p><p>Second<br/>Third</p>"),
            "First Second Third"
        );
    }

    #[test]
    fn test_attributes_with_urls_removed() {
        assert_eq!(
            strip_markup(r#"Look <img src="https://cdn.example/a.jpg" alt="x"> here"#),
            "Look here"
        );
        assert_eq!(
            strip_markup(r#"<a href="https://example.com">link</a> text"#),
            "link text"
        );
    }

    #[test]
    fn test_script_style_and_comments_dropped() {
        assert_eq!(
            strip_markup("a<style>p{color:red}</style>b<!-- hidden -->c<SCRIPT type=x>alert(1)</script>d"),
            "a b c d"
        );
    }

    #[test]
    fn test_entities_decoded_after_tags_removed() {
        // An encoded tag is text, not markup
        assert_eq!(strip_markup("&lt;b&gt;bold&lt;/b&gt;"), "<b>bold</b>");
    }

    proptest! {
        #[test]
        fn prop_output_has_no_tags_or_runs_of_space(s in "[a-z <>/=\"]{0,64}") {
            let out = strip_markup(&s);
            prop_assert!(!tag_regex().is_match(&out));
            prop_assert!(!out.contains("  "));
            prop_assert_eq!(out.trim(), out.as_str());
        }
    }
}
