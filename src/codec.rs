//! Escape table for text fields embedded in a serialized entry line.
//!
//! | raw       | encoded |
//! |-----------|---------|
//! | `\`       | `\\`    |
//! | `"`       | `\"`    |
//! | tab       | `\t`    |
//! | `@`       | `@@`    |
//! | newline   | `\n`    |
//!
//! Decoding is a single left-to-right pass, so `decode(encode(s)) == s` for
//! every string. Escape sequences that the encoder never produces (e.g. `\x`)
//! pass through untouched.

/// Escape-encode a text field.
pub fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 8);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\t' => out.push_str("\\t"),
            '@' => out.push_str("@@"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`encode`].
pub fn decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.peek() {
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                Some('"') => {
                    chars.next();
                    out.push('"');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                _ => out.push('\\'),
            },
            '@' if chars.peek() == Some(&'@') => {
                chars.next();
                out.push('@');
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_applies_every_mapping() {
        assert_eq!(
            encode("a\\b\"c\td@e\nf"),
            "a\\\\b\\\"c\\td@@e\\nf"
        );
    }

    #[test]
    fn encoded_text_has_no_raw_newlines_or_tabs() {
        let e = encode("line one\nline\ttwo\n");
        assert!(!e.contains('\n'));
        assert!(!e.contains('\t'));
    }

    #[test]
    fn roundtrip_user_text() {
        for s in [
            "",
            "Looks flaky",
            "see [ABC-12@jira]; rerun tomorrow",
            "multi\nline\n\ncomment",
            "quote \"this\" and \\ that",
            "@@@ triple at",
            "trailing backslash \\",
            "looks like an escape: \\n but literal",
            "unicode: å ß 漢字",
        ] {
            assert_eq!(decode(&encode(s)), s, "roundtrip failed for {s:?}");
        }
    }

    #[test]
    fn decode_leaves_unknown_escapes_alone() {
        assert_eq!(decode("a\\xb"), "a\\xb");
        assert_eq!(decode("lone @ sign"), "lone @ sign");
        assert_eq!(decode("ends with \\"), "ends with \\");
    }
}
