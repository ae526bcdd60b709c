//! Cleanup of raw extracted text before chunking

use once_cell::sync::Lazy;
use regex::Regex;

static HYPHENATED_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w)-\n(\w)").expect("static pattern compiles"));
static NEWLINE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n+").expect("static pattern compiles"));
static SPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" {2,}").expect("static pattern compiles"));

const SOFT_HYPHEN: char = '\u{ad}';

/// Normalize extracted text for chunking and display
///
/// - NUL characters become spaces
/// - words hyphenated across a line break are re-joined
/// - a single line break inside a paragraph becomes a space
/// - two or more line breaks collapse to one paragraph break (`\n\n`)
/// - tabs become spaces and runs of spaces collapse to one
/// - soft hyphens are removed and the result is trimmed
pub fn normalize_text(text: &str) -> String {
    let text = text.replace('\0', " ");
    let text = HYPHENATED_BREAK.replace_all(&text, "${1}${2}");
    let text = NEWLINE_RUN.replace_all(&text, |caps: &regex::Captures<'_>| {
        if caps[0].len() == 1 {
            " "
        } else {
            "\n\n"
        }
    });
    let text = text.replace('\t', " ");
    let text = SPACE_RUN.replace_all(&text, " ");
    let text: String = text.chars().filter(|&c| c != SOFT_HYPHEN).collect();

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejoins_hyphenated_words() {
        assert_eq!(normalize_text("convers-\nation starts"), "conversation starts");
    }

    #[test]
    fn test_joins_lines_within_paragraph() {
        assert_eq!(normalize_text("line one\nline two"), "line one line two");
    }

    #[test]
    fn test_collapses_paragraph_breaks() {
        assert_eq!(
            normalize_text("para one\n\n\n\npara two"),
            "para one\n\npara two"
        );
    }

    #[test]
    fn test_whitespace_cleanup() {
        assert_eq!(normalize_text("  a\tb   c  "), "a b c");
        assert_eq!(normalize_text("nul\0byte"), "nul byte");
        assert_eq!(normalize_text("soft\u{ad}hyphen"), "softhyphen");
    }

    #[test]
    fn test_empty_and_blank_input() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text(" \n\t\0 "), "");
    }
}
