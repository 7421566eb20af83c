//! Plain text to HTML for the info panels.

/// Escape `&`, `<`, `>`, `"` and `'`.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// Render text as a `<p>` with one `<br>` per line break.
pub fn plaintext_to_html(text: &str, classname: Option<&str>) -> String {
    let content = text
        .split('\n')
        .map(escape)
        .collect::<Vec<_>>()
        .join("<br>\n");

    match classname {
        Some(class) => format!("<p class='{class}'>{content}</p>"),
        None => format!("<p>{content}</p>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_and_breaks_lines() {
        assert_eq!(
            plaintext_to_html("a <b>\nSteps: 20", None),
            "<p>a &lt;b&gt;<br>\nSteps: 20</p>"
        );
    }

    #[test]
    fn adds_class() {
        assert_eq!(
            plaintext_to_html("", Some("comments")),
            "<p class='comments'></p>"
        );
    }

    #[test]
    fn escapes_quotes() {
        assert_eq!(escape(r#"'x' & "y""#), "&#x27;x&#x27; &amp; &quot;y&quot;");
    }
}
