/// Walk `text` tracking whether the scanner is currently inside a JSON
/// string literal and whether the previous character was a backslash.
/// Inside a string, a raw (unescaped-as-JSON) newline/carriage-return/tab
/// byte is replaced with its two-character escape; everything else is
/// copied through unchanged. This recovers JSON that an LLM emitted with
/// literal control characters embedded in a string value, which
/// `serde_json` correctly refuses to parse as-is.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut prev_was_backslash = false;

    for ch in text.chars() {
        if in_string {
            match ch {
                '\n' if !prev_was_backslash => {
                    out.push_str("\\n");
                    prev_was_backslash = false;
                    continue;
                }
                '\r' if !prev_was_backslash => {
                    out.push_str("\\r");
                    prev_was_backslash = false;
                    continue;
                }
                '\t' if !prev_was_backslash => {
                    out.push_str("\\t");
                    prev_was_backslash = false;
                    continue;
                }
                '"' if !prev_was_backslash => {
                    in_string = false;
                }
                _ => {}
            }
        } else if ch == '"' {
            in_string = true;
        }

        prev_was_backslash = ch == '\\' && !prev_was_backslash;
        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_is_identity_on_already_valid_json() {
        let input = r#"{"a": "b\nc", "d": 1}"#;
        assert_eq!(sanitize(input), input);
        serde_json::from_str::<serde_json::Value>(&sanitize(input)).unwrap();
    }

    #[test]
    fn sanitize_escapes_literal_newline_inside_string() {
        let input = "{\"message\": \"has a\nliteral newline\"}";
        let sanitized = sanitize(input);
        assert!(serde_json::from_str::<serde_json::Value>(&sanitized).is_ok());
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&sanitized).unwrap()["message"],
            "has a\nliteral newline"
        );
    }

    #[test]
    fn sanitize_escapes_tab_and_carriage_return() {
        let input = "{\"x\": \"a\tb\rc\"}";
        let sanitized = sanitize(input);
        let parsed: serde_json::Value = serde_json::from_str(&sanitized).unwrap();
        assert_eq!(parsed["x"], "a\tb\rc");
    }

    #[test]
    fn sanitize_leaves_structural_whitespace_outside_strings_untouched() {
        let input = "{\n  \"a\": 1\n}";
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn sanitize_does_not_double_escape_existing_escapes() {
        let input = r#"{"a": "already\nescaped"}"#;
        assert_eq!(sanitize(input), input);
    }
}
