//! Output normalization and comparison for the judge-core library.
//!
//! Judged programs routinely emit a harmless extra trailing newline or
//! trailing whitespace on a line; [`normalize`] strips that noise before
//! comparison so such programs are not marked Wrong Answer for formatting
//! alone. [`strict_mode`] submissions bypass normalization entirely for
//! problems where output format is itself part of the judged behavior.

/// Canonicalize a string for comparison.
///
/// Algorithm: strip leading/trailing whitespace of the whole buffer, split on
/// `\n`, strip trailing whitespace from each line, drop empty trailing
/// lines, rejoin with single `\n`.
pub fn normalize(s: &str) -> String {
    let trimmed = s.trim();
    let mut lines: Vec<&str> = trimmed.split('\n').map(|line| line.trim_end()).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Compare two outputs, normalizing both unless `strict` is set.
pub fn outputs_match(actual: &str, expected: &str, strict: bool) -> bool {
    if strict {
        actual == expected
    } else {
        normalize(actual) == normalize(expected)
    }
}

/// Format up to `max_lines` line-pairs from `actual` and `expected`, marking
/// the first divergent line. Used for error messages only — never affects
/// correctness.
pub fn diff_preview(actual: &str, expected: &str, max_lines: usize) -> String {
    let actual_lines: Vec<&str> = actual.split('\n').take(max_lines).collect();
    let expected_lines: Vec<&str> = expected.split('\n').take(max_lines).collect();
    let total = actual_lines.len().max(expected_lines.len());

    let mut out = String::new();
    for i in 0..total {
        let a = actual_lines.get(i).copied().unwrap_or("<missing>");
        let e = expected_lines.get(i).copied().unwrap_or("<missing>");
        if a != e {
            out.push_str(&format!("Line {}:\n", i + 1));
            out.push_str(&format!("  Expected: {e:?}\n"));
            out.push_str(&format!("  Actual:   {a:?}\n"));
        }
    }

    let actual_total = actual.split('\n').count();
    let expected_total = expected.split('\n').count();
    if actual_total > max_lines || expected_total > max_lines {
        out.push_str(&format!("... (truncated, showing first {max_lines} lines)\n"));
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let samples = ["hello\nworld", "  padded  \n\n", "", "a\n\n\nb\n\n  \n"];
        for s in samples {
            let once = normalize(s);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn normalize_ignores_trailing_whitespace_and_blank_lines() {
        let s = "6";
        assert_eq!(normalize(&format!("{s}\n\n  \n")), normalize(s));
    }

    #[test]
    fn normalize_strips_trailing_whitespace_per_line() {
        assert_eq!(normalize("6  \n7\t\n"), "6\n7");
    }

    #[test]
    fn normalize_strips_leading_and_trailing_buffer_whitespace() {
        assert_eq!(normalize("\n\n  6\n7  \n\n"), "6\n7");
    }

    #[test]
    fn outputs_match_tolerant_mode_ignores_trailing_newline() {
        assert!(outputs_match("6\n", "6", false));
    }

    #[test]
    fn outputs_match_strict_mode_requires_exact_match() {
        assert!(!outputs_match("6\n", "6", true));
        assert!(outputs_match("6", "6", true));
    }

    #[test]
    fn diff_preview_marks_first_divergent_line() {
        let diff = diff_preview("1\n2\n3", "1\n9\n3", 10);
        assert!(diff.contains("Line 2:"));
        assert!(diff.contains("Expected: \"9\""));
        assert!(diff.contains("Actual:   \"2\""));
    }

    #[test]
    fn diff_preview_notes_truncation() {
        let actual = (0..20).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let diff = diff_preview(&actual, &actual, 5);
        assert!(diff.contains("truncated"));
    }

    #[test]
    fn diff_preview_empty_when_equal_and_short() {
        assert_eq!(diff_preview("a\nb", "a\nb", 10), "");
    }
}
