use std::borrow::Cow;

/// Literal entity artifact that feed generators leave at the edges of descriptions.
const NBSP_ENTITY: &str = "&nbsp;";

/// Placeholder stored when a feed entry carries no usable description.
pub const EMPTY_DESCRIPTION: &str = "...";

/// Replaces double quotes with single quotes.
///
/// Titles and descriptions end up inside quoted attributes and JSON strings
/// further downstream, so a bare `"` is normalised away at ingestion time.
///
/// Returns `Cow::Borrowed` when the input contains no double quotes.
///
/// # Examples
///
/// ```
/// use feedsync::util::normalize_quotes;
///
/// assert_eq!(normalize_quotes(r#"The "new" release"#), "The 'new' release");
/// assert_eq!(normalize_quotes("plain"), "plain");
/// ```
pub fn normalize_quotes(s: &str) -> Cow<'_, str> {
    if s.contains('"') {
        Cow::Owned(s.replace('"', "'"))
    } else {
        Cow::Borrowed(s)
    }
}

/// Removes every `<...>` markup tag from the input.
///
/// This is a lexical strip, not an HTML parser: anything between a `<` and
/// the next `>` is dropped. An unterminated `<` is kept verbatim along with
/// the rest of the text.
///
/// # Examples
///
/// ```
/// use feedsync::util::strip_html_tags;
///
/// assert_eq!(strip_html_tags("<p>Hello <b>world</b></p>"), "Hello world");
/// assert_eq!(strip_html_tags("a < b"), "a < b");
/// ```
pub fn strip_html_tags(s: &str) -> Cow<'_, str> {
    if !s.contains('<') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open..];
        match after_open.find('>') {
            Some(close) if close > 1 => rest = &after_open[close + 1..],
            _ => {
                // Not a tag ("<" with no ">" or "<>"), keep the bracket
                out.push('<');
                rest = &after_open[1..];
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Produces the stored description for a raw feed description.
///
/// Strips markup tags, trims leading/trailing `&nbsp;` artifacts and
/// whitespace, and normalises double quotes. Falls back to
/// [`EMPTY_DESCRIPTION`] when nothing is left.
pub fn clean_description(raw: &str) -> String {
    let stripped = strip_html_tags(raw);

    let mut trimmed: &str = stripped.trim();
    loop {
        let before = trimmed.len();
        trimmed = trimmed
            .trim_start_matches(NBSP_ENTITY)
            .trim_end_matches(NBSP_ENTITY)
            .trim();
        if trimmed.len() == before {
            break;
        }
    }

    if trimmed.is_empty() {
        return EMPTY_DESCRIPTION.to_string();
    }

    normalize_quotes(trimmed).into_owned()
}

/// Trims `text` from the end until its UTF-8 encoding fits in `max_bytes`.
///
/// Characters are removed one at a time and the byte length is re-measured
/// after each removal, so a multi-byte character at the boundary is dropped
/// whole instead of being split.
///
/// # Examples
///
/// ```
/// use feedsync::util::truncate_to_byte_budget;
///
/// let mut text = String::from("héllo");
/// truncate_to_byte_budget(&mut text, 2);
/// assert_eq!(text, "h"); // "é" is two bytes and would not fit
/// ```
pub fn truncate_to_byte_budget(text: &mut String, max_bytes: usize) {
    while text.len() > max_bytes {
        if text.pop().is_none() {
            break;
        }
    }
}

/// Joins feed category terms with `", "`, or returns `"none"` when there are none.
pub fn join_terms(terms: &[String]) -> String {
    if terms.is_empty() {
        "none".to_string()
    } else {
        terms.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_quotes_borrowed_when_clean() {
        let result = normalize_quotes("nothing to change");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_quotes_replaces_all() {
        assert_eq!(normalize_quotes(r#""a" "b""#), "'a' 'b'");
    }

    #[test]
    fn test_strip_html_nested_tags() {
        let input = r#"<div class="x"><p>Hi <a href="/y">there</a></p></div>"#;
        assert_eq!(strip_html_tags(input), "Hi there");
    }

    #[test]
    fn test_strip_html_unterminated_bracket_kept() {
        assert_eq!(strip_html_tags("1 < 2 and <b>bold"), "1 < 2 and bold");
        assert_eq!(strip_html_tags("trailing <"), "trailing <");
        assert_eq!(strip_html_tags("<>"), "<>");
    }

    #[test]
    fn test_strip_html_no_tags_borrowed() {
        assert!(matches!(strip_html_tags("plain text"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_clean_description_nbsp_and_quotes() {
        let raw = "&nbsp;<p>Say \"hello\"</p>&nbsp;&nbsp;\n";
        assert_eq!(clean_description(raw), "Say 'hello'");
    }

    #[test]
    fn test_clean_description_keeps_inner_nbsp() {
        assert_eq!(clean_description("a&nbsp;b"), "a&nbsp;b");
    }

    #[test]
    fn test_clean_description_empty_uses_placeholder() {
        assert_eq!(clean_description(""), EMPTY_DESCRIPTION);
        assert_eq!(clean_description("<img src=\"x.png\"/>&nbsp;"), EMPTY_DESCRIPTION);
    }

    #[test]
    fn test_truncate_ascii() {
        let mut text = "abcdef".to_string();
        truncate_to_byte_budget(&mut text, 4);
        assert_eq!(text, "abcd");
    }

    #[test]
    fn test_truncate_multibyte_boundary() {
        // "日" is 3 bytes; budget 7 fits two chars (6 bytes) but not a third
        let mut text = "日本語".to_string();
        truncate_to_byte_budget(&mut text, 7);
        assert_eq!(text, "日本");
        assert!(text.len() <= 7);
    }

    #[test]
    fn test_truncate_under_budget_untouched() {
        let mut text = "short".to_string();
        truncate_to_byte_budget(&mut text, 5000);
        assert_eq!(text, "short");
    }

    #[test]
    fn test_join_terms() {
        assert_eq!(join_terms(&[]), "none");
        assert_eq!(
            join_terms(&["aws".to_string(), "lambda".to_string()]),
            "aws, lambda"
        );
    }
}
