//! Corpus splitter: one left-to-right scan into the three output files.
//!
//! A section marker moves the cursor; an attachment block is copied verbatim
//! (markers included) to the attachments buffer and the cursor then returns
//! to the section it was in. Lines before the first marker belong to the
//! summary. Markers inside fenced code are content. Leading YAML front
//! matter is skipped.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use notefold_markdown::{FenceTracker, Marker, parse_marker, trim_blank_lines};
use notefold_shared::{NotefoldError, Result, RetryConfig, Section, retry_io, write_atomic};

/// The three split buffers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitOutput {
    pub summary: String,
    pub raw_notes: String,
    pub attachments: String,
}

impl SplitOutput {
    pub fn get(&self, section: Section) -> &str {
        match section {
            Section::Summary => &self.summary,
            Section::RawNotes => &self.raw_notes,
            Section::Attachments => &self.attachments,
        }
    }

    fn buffer(&mut self, section: Section) -> &mut String {
        match section {
            Section::Summary => &mut self.summary,
            Section::RawNotes => &mut self.raw_notes,
            Section::Attachments => &mut self.attachments,
        }
    }
}

/// One written output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub section: Section,
    pub path: PathBuf,
    pub sha256: String,
}

/// Byte offset where the body starts, past any leading `---` front matter.
fn body_start(corpus: &str) -> usize {
    let mut lines = corpus.split_inclusive('\n');
    let mut offset = match lines.next() {
        Some(first) if first.trim_end() == "---" => first.len(),
        _ => return 0,
    };

    for line in lines {
        offset += line.len();
        if line.trim_end() == "---" {
            return offset;
        }
    }
    // unterminated front matter is treated as body
    0
}

/// Partition a corpus into the three section buffers.
///
/// Each buffer is trimmed of leading and trailing blank lines and ends with a
/// single newline unless empty.
pub fn split(corpus: &str) -> SplitOutput {
    let mut out = SplitOutput::default();
    let mut cursor = Section::Summary;
    let mut in_block = false;
    let mut fence = FenceTracker::new();

    let body = &corpus[body_start(corpus)..];
    for line in body.split('\n') {
        if in_block {
            push_line(out.buffer(Section::Attachments), line);
            if matches!(parse_marker(line), Some(Marker::BlockEnd)) {
                in_block = false;
            }
            continue;
        }
        if fence.observe(line) {
            push_line(out.buffer(cursor), line);
            continue;
        }

        match parse_marker(line) {
            Some(Marker::Section(section)) => cursor = section,
            Some(Marker::BlockStart(_)) => {
                in_block = true;
                push_line(out.buffer(Section::Attachments), line);
            }
            Some(Marker::BlockEnd) => debug!("dropping stray attachment end marker"),
            None => push_line(out.buffer(cursor), line),
        }
    }

    for section in Section::ALL {
        let buffer = out.buffer(section);
        let trimmed = trim_blank_lines(buffer);
        *buffer = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}\n")
        };
    }
    out
}

fn push_line(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    buffer.push('\n');
}

/// Write the three buffers into `dir`, fully replacing previous files.
///
/// Every file is attempted; the first failure is returned after the rest
/// have been written.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn write_outputs(output: &SplitOutput, dir: &Path, retry: &RetryConfig) -> Result<Vec<WrittenFile>> {
    let mut written = Vec::new();
    let mut first_error: Option<NotefoldError> = None;

    for section in Section::ALL {
        let path = dir.join(section.file_name());
        match write_atomic(&path, output.get(section).as_bytes(), retry) {
            Ok(sha256) => {
                debug!(file = section.file_name(), bytes = output.get(section).len(), "wrote output");
                written.push(WrittenFile {
                    section,
                    path,
                    sha256,
                });
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            info!(files = written.len(), "split outputs written");
            Ok(written)
        }
    }
}

/// Split an existing corpus file into `dir`.
pub fn split_file(corpus_path: &Path, dir: &Path, retry: &RetryConfig) -> Result<Vec<WrittenFile>> {
    let bytes = retry_io(retry, "read", corpus_path, || std::fs::read(corpus_path))?;
    let corpus = String::from_utf8(bytes)
        .map_err(|e| NotefoldError::parse(format!("{}: {e}", corpus_path.display())))?;
    write_outputs(&split(&corpus), dir, retry)
}
