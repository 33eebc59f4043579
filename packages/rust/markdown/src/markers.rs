//! Marker Codec: the in-band syntax that carries attachment blocks and
//! section boundaries inside plain markdown.
//!
//! ```text
//! --==ATTACHMENT_BLOCK: {filename}==--
//! body
//! --==ATTACHMENT_BLOCK_END==--
//! ```
//!
//! Markers are recognized only at the start of a line. Body lines that would
//! themselves read as markers are escaped with a leading `\` by [`wrap`] and
//! unescaped by [`scan`], so any body survives a round trip.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use notefold_shared::{Section, is_document_name, is_external_target, short_hash};

use crate::fence::FenceTracker;

/// Prefix of an attachment start marker.
pub const BLOCK_START_PREFIX: &str = "--==ATTACHMENT_BLOCK: ";
/// Suffix shared by all markers.
pub const MARKER_SUFFIX: &str = "==--";
/// Attachment end marker.
pub const BLOCK_END: &str = "--==ATTACHMENT_BLOCK_END==--";
pub const SUMMARY_MARKER: &str = "--==SUMMARY==--";
pub const RAW_NOTES_MARKER: &str = "--==RAW_NOTES==--";
/// Alternate spelling accepted on input, never emitted.
pub const RAW_NOTES_MARKER_ALT: &str = "--==RAW NOTES==--";
pub const ATTACHMENTS_MARKER: &str = "--==ATTACHMENTS==--";

const ESCAPE: char = '\\';
const MARKER_LEAD: &str = "--==";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A decoded attachment block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentBlock {
    pub filename: String,
    pub body: String,
    /// Byte offset of the start marker line.
    pub start: usize,
    /// Byte offset just past the end marker (excluding its newline).
    pub end: usize,
}

/// A single recognized marker line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker<'a> {
    BlockStart(&'a str),
    BlockEnd,
    Section(Section),
}

/// A recoverable marker problem, located by zero-based line index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerIssue {
    pub line: usize,
    pub message: String,
}

/// Output of [`scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub blocks: Vec<AttachmentBlock>,
    /// Start markers abandoned by a nested start or end of input.
    pub issues: Vec<MarkerIssue>,
    /// Line indexes of end markers seen outside any block.
    pub stray_ends: Vec<usize>,
}

impl ScanResult {
    pub fn is_balanced(&self) -> bool {
        self.issues.is_empty() && self.stray_ends.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Marker lines
// ---------------------------------------------------------------------------

/// Recognize a canonical marker line. Trailing whitespace is ignored.
pub fn parse_marker(line: &str) -> Option<Marker<'_>> {
    let line = line.trim_end();
    if !line.starts_with(MARKER_LEAD) {
        return None;
    }
    if line == BLOCK_END {
        return Some(Marker::BlockEnd);
    }
    if let Some(section) = parse_section_marker(line) {
        return Some(Marker::Section(section));
    }
    let name = line
        .strip_prefix(BLOCK_START_PREFIX)?
        .strip_suffix(MARKER_SUFFIX)?;
    (!name.trim().is_empty()).then_some(Marker::BlockStart(name))
}

/// Recognize a canonical section marker.
pub fn parse_section_marker(line: &str) -> Option<Section> {
    match line.trim_end() {
        SUMMARY_MARKER => Some(Section::Summary),
        RAW_NOTES_MARKER | RAW_NOTES_MARKER_ALT => Some(Section::RawNotes),
        ATTACHMENTS_MARKER => Some(Section::Attachments),
        _ => None,
    }
}

/// Recognize a hand-typed section marker with loose spacing, case or
/// separators (`-- == Raw-Notes == --`).
pub fn parse_section_marker_loose(line: &str) -> Option<Section> {
    static LOOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^\s*-{2,}\s*=+\s*(summary|raw[\s_-]*notes|attachments)\s*=+\s*-{2,}\s*$")
            .expect("valid regex")
    });

    let caps = LOOSE_RE.captures(line)?;
    let word = caps[1].to_ascii_lowercase();
    Some(match word.as_str() {
        "summary" => Section::Summary,
        "attachments" => Section::Attachments,
        _ => Section::RawNotes,
    })
}

/// Canonical spelling of a section marker.
pub fn section_marker(section: Section) -> &'static str {
    match section {
        Section::Summary => SUMMARY_MARKER,
        Section::RawNotes => RAW_NOTES_MARKER,
        Section::Attachments => ATTACHMENTS_MARKER,
    }
}

/// Start marker line for a filename, kept verbatim apart from line breaks,
/// which become spaces. The filename must not be blank; see [`block_name`].
pub fn start_marker(filename: &str) -> String {
    let name = filename.replace(['\r', '\n'], " ");
    format!("{BLOCK_START_PREFIX}{name}{MARKER_SUFFIX}")
}

/// Filename [`wrap`] writes for `filename`: line breaks become spaces and a
/// blank name falls back to [`derived_filename`].
pub fn block_name(filename: &str, body: &str) -> String {
    let name = filename.replace(['\r', '\n'], " ");
    if name.trim().is_empty() {
        derived_filename(body)
    } else {
        name
    }
}

/// Count canonical start and end marker lines.
pub fn count_markers(text: &str) -> (usize, usize) {
    let mut starts = 0;
    let mut ends = 0;
    for line in text.split('\n') {
        match parse_marker(line) {
            Some(Marker::BlockStart(_)) => starts += 1,
            Some(Marker::BlockEnd) => ends += 1,
            _ => {}
        }
    }
    (starts, ends)
}

fn escape_line(line: &str) -> String {
    if line.trim_start_matches(ESCAPE).starts_with(MARKER_LEAD) {
        format!("{ESCAPE}{line}")
    } else {
        line.to_string()
    }
}

fn unescape_line(line: &str) -> &str {
    match line.strip_prefix(ESCAPE) {
        Some(rest) if rest.trim_start_matches(ESCAPE).starts_with(MARKER_LEAD) => rest,
        _ => line,
    }
}

// ---------------------------------------------------------------------------
// wrap / scan
// ---------------------------------------------------------------------------

/// Encode a body as an attachment block.
///
/// [`scan`] returns the block with this body and [`block_name`] as its
/// filename, which is `filename` itself for any non-blank single-line name.
pub fn wrap(filename: &str, body: &str) -> String {
    let mut out = start_marker(&block_name(filename, body));
    out.push('\n');
    let escaped: Vec<String> = body.split('\n').map(escape_line).collect();
    out.push_str(&escaped.join("\n"));
    out.push('\n');
    out.push_str(BLOCK_END);
    out
}

struct OpenBlock<'a> {
    filename: &'a str,
    start: usize,
    line: usize,
    body: Vec<&'a str>,
}

impl<'a> OpenBlock<'a> {
    fn new(filename: &'a str, start: usize, line: usize) -> Self {
        Self {
            filename,
            start,
            line,
            body: Vec::new(),
        }
    }

    fn close(self, end: usize) -> AttachmentBlock {
        let body: Vec<&str> = self.body.into_iter().map(unescape_line).collect();
        AttachmentBlock {
            filename: self.filename.to_string(),
            body: body.join("\n"),
            start: self.start,
            end,
        }
    }
}

/// Decode every attachment block in `text`.
///
/// Single-level state machine: a start while a block is open abandons the
/// open block (recorded in [`ScanResult::issues`]) and opens the new one; an
/// end outside a block is discarded.
pub fn scan(text: &str) -> ScanResult {
    let mut result = ScanResult::default();
    let mut open: Option<OpenBlock<'_>> = None;
    let mut offset = 0;

    for (index, line) in text.split('\n').enumerate() {
        let line_start = offset;
        offset += line.len() + 1;

        match (open.take(), parse_marker(line)) {
            (None, Some(Marker::BlockStart(name))) => {
                open = Some(OpenBlock::new(name, line_start, index));
            }
            (None, Some(Marker::BlockEnd)) => {
                debug!(line = index + 1, "discarding stray attachment end marker");
                result.stray_ends.push(index);
            }
            (None, _) => {}
            (Some(abandoned), Some(Marker::BlockStart(name))) => {
                result.issues.push(MarkerIssue {
                    line: abandoned.line,
                    message: format!(
                        "attachment block '{}' opened at line {} is not closed before line {}",
                        abandoned.filename,
                        abandoned.line + 1,
                        index + 1
                    ),
                });
                open = Some(OpenBlock::new(name, line_start, index));
            }
            (Some(block), Some(Marker::BlockEnd)) => {
                result.blocks.push(block.close(line_start + line.len()));
            }
            (Some(mut block), _) => {
                block.body.push(line);
                open = Some(block);
            }
        }
    }

    if let Some(abandoned) = open {
        result.issues.push(MarkerIssue {
            line: abandoned.line,
            message: format!(
                "attachment block '{}' opened at line {} is never closed",
                abandoned.filename,
                abandoned.line + 1
            ),
        });
    }

    result
}

/// Drop the marker lines of unbalanced blocks and stray end markers, keeping
/// any text they enclosed. Returns the repaired text and one issue per
/// dropped marker.
pub fn repair(text: &str) -> (String, Vec<MarkerIssue>) {
    let scanned = scan(text);
    if scanned.is_balanced() {
        return (text.to_string(), Vec::new());
    }

    let mut drop: HashSet<usize> = scanned.issues.iter().map(|i| i.line).collect();
    drop.extend(scanned.stray_ends.iter().copied());

    let kept: Vec<&str> = text
        .split('\n')
        .enumerate()
        .filter(|(i, _)| !drop.contains(i))
        .map(|(_, line)| line)
        .collect();

    let mut issues = scanned.issues;
    issues.extend(scanned.stray_ends.iter().map(|&line| MarkerIssue {
        line,
        message: format!("stray attachment end marker at line {} discarded", line + 1),
    }));
    issues.sort_by_key(|i| i.line);

    (kept.join("\n"), issues)
}

// ---------------------------------------------------------------------------
// unify
// ---------------------------------------------------------------------------

static BEGIN_BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\[\s*begin\s+attachment\s*(?::\s*([^\]]*?))?\s*\]\s*$")
        .expect("valid regex")
});

static END_BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\[\s*end\s+attachment\s*\]\s*$").expect("valid regex")
});

static BEGIN_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*<!--\s*(?:begin\s+)?attachment\s*(?::\s*(.*?))?\s*-->\s*$")
        .expect("valid regex")
});

static END_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*<!--\s*(?:end\s+attachment|/\s*attachment)\s*-->\s*$")
        .expect("valid regex")
});

static STANDALONE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(!?)\[[^\]]*\]\(\s*<?([^)>\s]+)>?(?:\s+"[^"]*")?\s*\)\s*$"#)
        .expect("valid regex")
});

static STANDALONE_EMBED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*!\[\[([^\]|]+)(?:\|[^\]]*)?\]\]\s*$").expect("valid regex")
});

/// Filename for a block whose source carried none.
pub fn derived_filename(body: &str) -> String {
    format!("attachment-{}", short_hash(body))
}

/// Index of the end marker closing a canonical block opened before `from`.
fn canonical_block_end(lines: &[&str], from: usize) -> Option<usize> {
    for (offset, line) in lines[from..].iter().enumerate() {
        match parse_marker(line) {
            Some(Marker::BlockEnd) => return Some(from + offset),
            Some(Marker::BlockStart(_)) => return None,
            _ => {}
        }
    }
    None
}

/// A legacy `[Begin Attachment]` or HTML-comment block starting at `index`.
/// Returns the extracted name (if any) and the closing line index.
fn legacy_block(lines: &[&str], index: usize) -> Option<(Option<String>, usize)> {
    let line = lines[index];
    let (caps, end_re) = if let Some(caps) = BEGIN_BRACKET_RE.captures(line) {
        (caps, &*END_BRACKET_RE)
    } else if let Some(caps) = BEGIN_COMMENT_RE.captures(line) {
        (caps, &*END_COMMENT_RE)
    } else {
        return None;
    };

    let name = caps
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|n| !n.is_empty());

    let end = lines[index + 1..]
        .iter()
        .position(|l| end_re.is_match(l))
        .map(|p| index + 1 + p)?;
    Some((name, end))
}

/// A line consisting solely of an image, embed, or document link.
/// Returns the attachment filename derived from the link target.
fn standalone_attachment(line: &str) -> Option<String> {
    if let Some(caps) = STANDALONE_EMBED_RE.captures(line) {
        return Some(caps[1].trim().to_string());
    }
    let caps = STANDALONE_LINK_RE.captures(line)?;
    let is_image = !caps[1].is_empty();
    let target = caps[2].split(['?', '#']).next().unwrap_or_default();
    if target.is_empty() || is_external_target(target) {
        return None;
    }
    (is_image || is_document_name(target)).then(|| target.to_string())
}

/// Rewrite legacy attachment spellings into canonical blocks.
///
/// Handles `[Begin Attachment: name]` … `[End Attachment]`,
/// `<!-- attachment: name -->` … `<!-- end attachment -->`, and lines that
/// hold nothing but an image, embed, or document link. Blocks without a name
/// get [`derived_filename`]. Later blocks reusing a filename are dropped.
/// Fenced code is left alone, and already-canonical text is returned unchanged.
pub fn unify(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut seen: HashSet<String> = HashSet::new();
    let mut fence = FenceTracker::new();
    let mut changed = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if fence.observe(line) {
            out.push(line.to_string());
            i += 1;
            continue;
        }

        if let Some(Marker::BlockStart(name)) = parse_marker(line) {
            if let Some(end) = canonical_block_end(&lines, i + 1) {
                if seen.insert(name.to_string()) {
                    out.extend(lines[i..=end].iter().map(|l| l.to_string()));
                } else {
                    debug!(filename = name, "dropping duplicate attachment block");
                    changed = true;
                }
                i = end + 1;
                continue;
            }
            out.push(line.to_string());
            i += 1;
            continue;
        }

        if let Some((name, end)) = legacy_block(&lines, i) {
            let body = lines[i + 1..end].join("\n");
            let filename = name.unwrap_or_else(|| derived_filename(&body));
            if seen.insert(filename.clone()) {
                out.push(wrap(&filename, &body));
            }
            changed = true;
            i = end + 1;
            continue;
        }

        if let Some(filename) = standalone_attachment(line) {
            if seen.insert(filename.clone()) {
                out.push(wrap(&filename, line.trim()));
            }
            changed = true;
            i += 1;
            continue;
        }

        out.push(line.to_string());
        i += 1;
    }

    if changed { out.join("\n") } else { text.to_string() }
}
