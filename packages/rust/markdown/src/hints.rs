//! Heading keyword hints that map a heading to an output section.
//!
//! One table serves both the per-document consolidation pass and the
//! aggregator's fallback bucketing, so the two can never disagree.

use std::sync::LazyLock;

use regex::Regex;

use notefold_shared::Section;

/// Keyword → section, checked in table order.
pub const SECTION_HINTS: &[(&str, Section)] = &[
    ("summary", Section::Summary),
    ("overview", Section::Summary),
    ("tldr", Section::Summary),
    ("notes", Section::RawNotes),
    ("journal", Section::RawNotes),
    ("log", Section::RawNotes),
    ("attachments", Section::Attachments),
];

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})\s+(.*?)\s*#*\s*$").expect("valid regex"));

/// Parse an ATX heading into `(level, text)`.
pub fn heading(line: &str) -> Option<(usize, &str)> {
    let caps = HEADING_RE.captures(line)?;
    let level = caps.get(1)?.as_str().len();
    let text = caps.get(2)?.as_str();
    Some((level, text))
}

/// Section hinted by a heading's text, if any keyword matches.
pub fn section_hint(heading_text: &str) -> Option<Section> {
    let lowered = heading_text.to_lowercase();
    let words: Vec<String> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != ';')
        .map(|w| w.replace(';', ""))
        .filter(|w| !w.is_empty())
        .collect();

    SECTION_HINTS
        .iter()
        .find(|(keyword, _)| words.iter().any(|w| w == keyword))
        .map(|&(_, section)| section)
}

/// Section hinted by a line, when the line is a heading.
pub fn line_hint(line: &str) -> Option<Section> {
    heading(line).and_then(|(_, text)| section_hint(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_atx_headings() {
        assert_eq!(heading("## Meeting Notes ##"), Some((2, "Meeting Notes")));
        assert_eq!(heading("#hashtag"), None);
        assert_eq!(heading("    # indented code"), None);
    }

    #[test]
    fn keyword_hints() {
        assert_eq!(section_hint("Executive Summary"), Some(Section::Summary));
        assert_eq!(section_hint("Project overview"), Some(Section::Summary));
        assert_eq!(section_hint("TL;DR"), Some(Section::Summary));
        assert_eq!(section_hint("Daily journal"), Some(Section::RawNotes));
        assert_eq!(section_hint("Attachments"), Some(Section::Attachments));
        assert_eq!(section_hint("Notebook setup"), None);
    }

    #[test]
    fn table_order_breaks_ties() {
        assert_eq!(section_hint("Notes summary"), Some(Section::Summary));
    }

    #[test]
    fn line_hint_requires_heading() {
        assert_eq!(line_hint("# Summary"), Some(Section::Summary));
        assert_eq!(line_hint("summary of the week"), None);
    }
}
