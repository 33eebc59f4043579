//! Text normalization pipeline applied to every source document.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! The pipeline normalizes line endings, invisible characters, trailing
//! whitespace and blank-line runs.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full normalization pipeline on raw markdown text.
pub fn normalize(md: &str) -> String {
    let mut result = normalize_line_endings(md);

    result = strip_invisible(&result);
    result = trim_trailing_whitespace(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Line endings
// ---------------------------------------------------------------------------

/// Convert `\r\n` and lone `\r` to `\n`.
fn normalize_line_endings(md: &str) -> String {
    md.replace("\r\n", "\n").replace('\r', "\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Invisible characters
// ---------------------------------------------------------------------------

/// Remove zero-width and formatting characters; non-breaking spaces become
/// plain spaces.
fn strip_invisible(md: &str) -> String {
    md.chars()
        .filter_map(|c| match c {
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}' => None,
            '\u{00A0}' | '\u{202F}' => Some(' '),
            other => Some(other),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Pass 3: Trailing whitespace
// ---------------------------------------------------------------------------

fn trim_trailing_whitespace(md: &str) -> String {
    md.split('\n')
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Blank-line runs
// ---------------------------------------------------------------------------

/// Collapse runs of 3+ blank lines into exactly 2.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Trailing newline
// ---------------------------------------------------------------------------

/// Ensure non-empty text ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

/// Trim leading and trailing blank lines from a buffer.
pub fn trim_blank_lines(text: &str) -> &str {
    let lines: Vec<&str> = text.split('\n').collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => {
            let start: usize = lines[..first].iter().map(|l| l.len() + 1).sum();
            let end: usize = start + lines[first..=last].iter().map(|l| l.len() + 1).sum::<usize>() - 1;
            &text[start..end]
        }
        _ => "",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
