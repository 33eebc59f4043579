//! Corpus aggregation: merge every consolidated document into one corpus.
//!
//! Documents are ordered by date, then path. Attachment blocks go to the
//! attachments section (first filename wins corpus-wide). Everything else is
//! split into text blocks, deduplicated by normalized header or
//! whitespace-insensitive content hash, and placed by the nearest section
//! marker. Unmarked text falls back to heading hints, then the classifier.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, info, instrument};

use notefold_discovery::decode_target;
use notefold_markdown::{
    AttachmentBlock, ClassificationResult, FenceTracker, classify, heading, parse_section_marker,
    repair, scan, section_hint, section_marker, wrap,
};
use notefold_shared::paths::normalize_lexically;
use notefold_shared::{
    ContentType, IssueKind, Processed, RelationKind, Relationship, Report, RunConfig, Section,
    is_external_target, is_image_name, is_markdown_name, normalize_whitespace, relative_path,
    stable_hash, to_slash,
};

use crate::consolidator::ConsolidatedDocument;

/// Value of the `generator` front-matter key.
pub const GENERATOR: &str = concat!("notefold ", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Paths and thresholds the aggregator needs.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Input root; document paths are relative to it.
    pub input_dir: PathBuf,
    /// Directory the corpus is written to; links are rewritten relative to it.
    pub output_dir: PathBuf,
    /// Classifier confidence needed to place unmarked text in the summary.
    pub min_summary_confidence: f64,
}

impl From<&RunConfig> for AggregateOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            input_dir: config.input_dir.clone(),
            output_dir: config.output_dir.clone(),
            min_summary_confidence: config.min_summary_confidence,
        }
    }
}

/// One entry in the corpus document list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusDocument {
    pub path: String,
    pub date: String,
}

/// How many items were dropped as duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub headers: usize,
    pub blocks: usize,
    pub attachments: usize,
}

/// The merged corpus.
#[derive(Debug, Clone)]
pub struct Corpus {
    /// Documents in corpus order.
    pub documents: Vec<CorpusDocument>,
    pub relationships: BTreeSet<Relationship>,
    /// Hashes of every emitted block.
    pub content_hashes: BTreeSet<String>,
    pub dedup: DedupStats,
    /// Emitted blocks per section.
    pub section_blocks: BTreeMap<Section, usize>,
    /// Serialized corpus.
    pub text: String,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Merge consolidated documents into one corpus.
///
/// Per-document problems (unbalanced markers) are recorded as errors and the
/// rest of that document still contributes. No input documents yields an
/// empty corpus plus a warning.
#[instrument(skip_all, fields(documents = docs.len()))]
pub fn aggregate(mut docs: Vec<ConsolidatedDocument>, options: &AggregateOptions) -> Processed<Corpus> {
    let mut report = Report::default();
    if docs.is_empty() {
        report.warning(
            IssueKind::StageFatal,
            "aggregate",
            "no input documents, emitting an empty corpus",
        );
    }

    docs.sort_by(|a, b| {
        a.sort_instant()
            .cmp(&b.sort_instant())
            .then_with(|| a.rel_path.cmp(&b.rel_path))
    });

    let mut builder = Builder::new(options);
    for (index, doc) in docs.iter().enumerate() {
        builder.add_document(index, doc, &mut report);
    }
    let corpus = builder.finish();

    info!(
        documents = corpus.documents.len(),
        relationships = corpus.relationships.len(),
        duplicate_headers = corpus.dedup.headers,
        duplicate_blocks = corpus.dedup.blocks,
        duplicate_attachments = corpus.dedup.attachments,
        "aggregated corpus"
    );
    Processed::new(corpus, report)
}

#[derive(Default)]
struct SectionBuffer {
    parts: Vec<String>,
    last_source: Option<usize>,
    blocks: usize,
}

struct Builder<'a> {
    options: &'a AggregateOptions,
    documents: Vec<CorpusDocument>,
    sections: BTreeMap<Section, SectionBuffer>,
    seen_headers: HashSet<String>,
    seen_blocks: HashSet<String>,
    seen_attachments: HashSet<String>,
    relationships: BTreeSet<Relationship>,
    content_hashes: BTreeSet<String>,
    dedup: DedupStats,
}

impl<'a> Builder<'a> {
    fn new(options: &'a AggregateOptions) -> Self {
        Self {
            options,
            documents: Vec::new(),
            sections: Section::ALL.iter().map(|&s| (s, SectionBuffer::default())).collect(),
            seen_headers: HashSet::new(),
            seen_blocks: HashSet::new(),
            seen_attachments: HashSet::new(),
            relationships: BTreeSet::new(),
            content_hashes: BTreeSet::new(),
            dedup: DedupStats::default(),
        }
    }

    fn add_document(&mut self, index: usize, doc: &ConsolidatedDocument, report: &mut Report) {
        let date = doc.sort_instant().date_naive().format("%Y-%m-%d").to_string();
        let provenance = format!("<!-- source: {} ({date}) -->", doc.rel_path);
        self.documents.push(CorpusDocument {
            path: doc.rel_path.clone(),
            date,
        });

        let (text, issues) = repair(&doc.text);
        for issue in issues {
            report.error(IssueKind::MalformedMarkers, doc.rel_path.as_str(), issue.message);
        }

        // --- Attachment blocks ---
        let scanned = scan(&text);
        for block in &scanned.blocks {
            self.relate(RelationKind::Attachment, doc, block.filename.clone());
            if !self.seen_attachments.insert(block.filename.clone()) {
                debug!(filename = %block.filename, doc = %doc.rel_path, "duplicate attachment block");
                self.dedup.attachments += 1;
                continue;
            }
            let body = self.rewrite_links(&block.body, doc);
            self.content_hashes
                .insert(stable_hash(&format!("{}\n{body}", block.filename)));
            self.emit(Section::Attachments, index, &provenance, wrap(&block.filename, &body));
        }

        // --- Text ---
        let residual = strip_blocks(&text, &scanned.blocks);
        let residual = self.rewrite_links(&residual, doc);
        for (marked, segment) in segments(&residual) {
            for chunk in chunks(&segment) {
                let section = marked.unwrap_or_else(|| self.fallback_section(&chunk));
                for block in chunk {
                    self.emit_text(section, index, &provenance, block);
                }
            }
        }
    }

    /// Section for unmarked text: heading hint first, then the classifier.
    fn fallback_section(&self, chunk: &[String]) -> Section {
        if let Some(hint) = chunk
            .first()
            .and_then(|first| heading(first))
            .and_then(|(_, text)| section_hint(text))
        {
            return hint;
        }
        let result = classify(&chunk.join("\n\n"));
        section_for(&result, self.options.min_summary_confidence)
    }

    fn emit_text(&mut self, section: Section, index: usize, provenance: &str, block: String) {
        if let Some((level, text)) = heading(&block) {
            let key = format!("{level}:{}", normalize_whitespace(text).to_lowercase());
            if !self.seen_headers.insert(key) {
                self.dedup.headers += 1;
                return;
            }
        } else if !self.seen_blocks.insert(stable_hash(&block)) {
            self.dedup.blocks += 1;
            return;
        }
        self.content_hashes.insert(stable_hash(&block));
        self.emit(section, index, provenance, block);
    }

    fn emit(&mut self, section: Section, index: usize, provenance: &str, block: String) {
        let buffer = self.sections.entry(section).or_default();
        if buffer.last_source != Some(index) {
            buffer.parts.push(provenance.to_string());
            buffer.last_source = Some(index);
        }
        buffer.parts.push(block);
        buffer.blocks += 1;
    }

    fn relate(&mut self, kind: RelationKind, doc: &ConsolidatedDocument, target: String) {
        self.relationships.insert(Relationship {
            kind,
            source: doc.rel_path.clone(),
            target,
        });
    }

    /// Rewrite relative link targets so they resolve from the output
    /// directory, recording one relationship per link.
    fn rewrite_links(&mut self, text: &str, doc: &ConsolidatedDocument) -> String {
        let mut fence = FenceTracker::new();
        let lines: Vec<String> = text
            .split('\n')
            .map(|line| {
                if fence.observe(line) {
                    return line.to_string();
                }
                LINK_RE
                    .replace_all(line, |caps: &Captures<'_>| self.rewrite_link(caps, doc))
                    .into_owned()
            })
            .collect();
        lines.join("\n")
    }

    fn rewrite_link(&mut self, caps: &Captures<'_>, doc: &ConsolidatedDocument) -> String {
        let original = caps[0].to_string();
        let is_image = !caps["bang"].is_empty();
        let raw = &caps["target"];
        let bare = raw
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(raw);

        if bare.starts_with('#') {
            return original;
        }
        if is_external_target(bare) {
            self.relate(RelationKind::Reference, doc, bare.to_string());
            return original;
        }
        if doc.rewritten.contains(bare) {
            self.relate(RelationKind::Attachment, doc, bare.to_string());
            return original;
        }

        let decoded = decode_target(bare);
        if decoded.is_empty() {
            return original;
        }
        let input_rel = to_slash(&normalize_lexically(&Path::new(doc.source_dir()).join(&decoded)));
        let kind = if is_markdown_name(&decoded) {
            RelationKind::Dependency
        } else if is_image || is_image_name(&decoded) {
            RelationKind::Attachment
        } else {
            RelationKind::Reference
        };
        self.relate(kind, doc, input_rel.clone());

        let absolute = self.options.input_dir.join(&input_rel);
        let mut target = to_slash(&relative_path(&self.options.output_dir, &absolute));
        if let Some(pos) = bare.find('#') {
            target.push_str(&bare[pos..]);
        }
        if target.contains(' ') {
            target = format!("<{target}>");
        }

        let title = caps.name("title").map_or("", |m| m.as_str());
        format!("{}[{}]({target}{title})", &caps["bang"], &caps["label"])
    }

    fn finish(self) -> Corpus {
        let mut text = front_matter(&self.documents, &self.relationships, &self.dedup);
        text.push('\n');

        let mut rendered = Vec::new();
        let mut section_blocks = BTreeMap::new();
        for section in Section::ALL {
            let mut part = section_marker(section).to_string();
            if let Some(buffer) = self.sections.get(&section) {
                if !buffer.parts.is_empty() {
                    part.push_str("\n\n");
                    part.push_str(&buffer.parts.join("\n\n"));
                }
                section_blocks.insert(section, buffer.blocks);
            }
            rendered.push(part);
        }
        text.push_str(&rendered.join("\n\n"));
        text.push('\n');

        Corpus {
            documents: self.documents,
            relationships: self.relationships,
            content_hashes: self.content_hashes,
            dedup: self.dedup,
            section_blocks,
            text,
        }
    }
}

/// Placement of unmarked text by classifier verdict.
fn section_for(result: &ClassificationResult, min_summary_confidence: f64) -> Section {
    match result.content_type {
        ContentType::Summary if result.confidence >= min_summary_confidence => Section::Summary,
        ContentType::Attachment => Section::Attachments,
        _ => Section::RawNotes,
    }
}

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?P<bang>!?)\[(?P<label>[^\]\n]*)\]\(\s*(?P<target><[^>\n]+>|[^)\s]+)(?P<title>\s+"[^"\n]*")?\s*\)"#,
    )
    .expect("valid regex")
});

// ---------------------------------------------------------------------------
// Text splitting
// ---------------------------------------------------------------------------

/// Text outside the given blocks.
fn strip_blocks(text: &str, blocks: &[AttachmentBlock]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for block in blocks {
        out.push_str(&text[cursor..block.start]);
        cursor = block.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Split text at section markers. The first segment is unmarked (`None`).
fn segments(text: &str) -> Vec<(Option<Section>, String)> {
    let mut out = Vec::new();
    let mut current: Option<Section> = None;
    let mut lines: Vec<&str> = Vec::new();
    let mut fence = FenceTracker::new();

    for line in text.split('\n') {
        if !fence.observe(line) {
            if let Some(section) = parse_section_marker(line) {
                out.push((current, lines.join("\n")));
                lines.clear();
                current = Some(section);
                continue;
            }
        }
        lines.push(line);
    }
    out.push((current, lines.join("\n")));
    out.retain(|(_, segment)| !segment.trim().is_empty());
    out
}

/// Heading-delimited groups of text blocks.
fn chunks(segment: &str) -> Vec<Vec<String>> {
    let mut out: Vec<Vec<String>> = Vec::new();
    for block in text_blocks(segment) {
        if heading(&block).is_some() || out.is_empty() {
            out.push(vec![block]);
        } else if let Some(last) = out.last_mut() {
            last.push(block);
        }
    }
    out
}

/// Paragraph-level blocks. Headings stand alone; fenced code stays whole.
fn text_blocks(segment: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut fence = FenceTracker::new();

    let flush = |current: &mut Vec<&str>, blocks: &mut Vec<String>| {
        if !current.is_empty() {
            blocks.push(current.join("\n"));
            current.clear();
        }
    };

    for line in segment.split('\n') {
        if fence.observe(line) {
            current.push(line);
            continue;
        }
        if line.trim().is_empty() {
            flush(&mut current, &mut blocks);
            continue;
        }
        if heading(line).is_some() {
            flush(&mut current, &mut blocks);
            blocks.push(line.to_string());
            continue;
        }
        current.push(line);
    }
    flush(&mut current, &mut blocks);

    // an unclosed fence must not swallow the rest of the corpus
    if let (Some(close), Some(last)) = (fence.closing(), blocks.last_mut()) {
        last.push('\n');
        last.push_str(&close);
    }
    blocks
}

// ---------------------------------------------------------------------------
// Front matter
// ---------------------------------------------------------------------------

fn front_matter(
    documents: &[CorpusDocument],
    relationships: &BTreeSet<Relationship>,
    dedup: &DedupStats,
) -> String {
    let mut fm = String::from("---\n");
    fm.push_str(&format!("generator: \"{GENERATOR}\"\n"));
    fm.push_str(&format!("document_count: {}\n", documents.len()));
    let order: Vec<&str> = Section::ALL.iter().map(|s| s.as_str()).collect();
    fm.push_str(&format!("section_order: [{}]\n", order.join(", ")));

    if documents.is_empty() {
        fm.push_str("documents: []\n");
    } else {
        fm.push_str("documents:\n");
        for doc in documents {
            fm.push_str(&format!("  - path: \"{}\"\n", escape_yaml_string(&doc.path)));
            fm.push_str(&format!("    date: \"{}\"\n", doc.date));
        }
    }

    if relationships.is_empty() {
        fm.push_str("relationships: []\n");
    } else {
        fm.push_str("relationships:\n");
        for rel in relationships {
            fm.push_str(&format!("  - kind: {}\n", rel.kind.as_str()));
            fm.push_str(&format!("    source: \"{}\"\n", escape_yaml_string(&rel.source)));
            fm.push_str(&format!("    target: \"{}\"\n", escape_yaml_string(&rel.target)));
        }
    }

    fm.push_str("dedup:\n");
    fm.push_str(&format!("  headers: {}\n", dedup.headers));
    fm.push_str(&format!("  blocks: {}\n", dedup.blocks));
    fm.push_str(&format!("  attachments: {}\n", dedup.attachments));
    fm.push_str("---\n");
    fm
}

/// Escape special characters in a YAML string value.
fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;
    use notefold_markdown::count_markers;

    use super::*;

    fn options() -> AggregateOptions {
        AggregateOptions {
            input_dir: PathBuf::from("/work/in"),
            output_dir: PathBuf::from("/work/out"),
            min_summary_confidence: 0.35,
        }
    }

    fn doc(rel_path: &str, date: Option<(i32, u32, u32)>, text: &str) -> ConsolidatedDocument {
        let (date, dated_by_name) = match date {
            Some((y, m, d)) => (NaiveDate::from_ymd_opt(y, m, d).unwrap(), true),
            None => (NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(), false),
        };
        ConsolidatedDocument {
            rel_path: rel_path.to_string(),
            date,
            dated_by_name,
            modified: None,
            source_hash: String::new(),
            text: text.to_string(),
            references: Vec::new(),
            rewritten: BTreeSet::new(),
        }
    }

    #[test]
    fn identical_headers_emit_once() {
        let text = "--==SUMMARY==--\n# Summary\nKey decision made.\n";
        let corpus = aggregate(
            vec![doc("note1.md", None, text), doc("note2.md", None, text)],
            &options(),
        )
        .value;

        assert_eq!(corpus.text.matches("# Summary").count(), 1);
        assert_eq!(corpus.text.matches("Key decision made.").count(), 1);
        assert_eq!(corpus.dedup, DedupStats { headers: 1, blocks: 1, attachments: 0 });
        // only the first document contributed
        assert!(corpus.text.contains("<!-- source: note1.md (1970-01-01) -->"));
        assert!(!corpus.text.contains("<!-- source: note2.md"));
    }

    #[test]
    fn documents_are_ordered_by_date_then_path() {
        let corpus = aggregate(
            vec![
                doc("b.md", Some((2024, 3, 1)), "b"),
                doc("c.md", Some((2023, 1, 1)), "c"),
                doc("a.md", Some((2024, 3, 1)), "a"),
            ],
            &options(),
        )
        .value;

        let order: Vec<_> = corpus.documents.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(order, vec!["c.md", "a.md", "b.md"]);
        assert_eq!(corpus.documents[0].date, "2023-01-01");
    }

    #[test]
    fn attachment_blocks_dedup_and_stay_balanced() {
        let block = wrap("shared.png", "![shared](assets/a/shared.png)");
        let corpus = aggregate(
            vec![
                doc("a.md", Some((2024, 1, 1)), &format!("intro a\n{block}\n")),
                doc("b.md", Some((2024, 1, 2)), &format!("intro b\n{block}\n")),
            ],
            &options(),
        )
        .value;

        let (starts, ends) = count_markers(&corpus.text);
        assert_eq!(starts, 1);
        assert_eq!(starts, ends);
        assert_eq!(corpus.dedup.attachments, 1);
        assert_eq!(corpus.section_blocks[&Section::Attachments], 1);
        assert!(corpus.relationships.contains(&Relationship {
            kind: RelationKind::Attachment,
            source: "b.md".into(),
            target: "shared.png".into(),
        }));
    }

    #[test]
    fn links_are_rewritten_and_related() {
        let mut d = doc(
            "notes/a.md",
            None,
            "--==RAW_NOTES==--\nSee [b](b.md#top), [site](https://x.io), ![i](assets/notes-a/i.png) and [sheet](data/s.csv).\n",
        );
        d.rewritten.insert("assets/notes-a/i.png".into());

        let corpus = aggregate(vec![d], &options()).value;
        assert!(corpus.text.contains("[b](../in/notes/b.md#top)"));
        assert!(corpus.text.contains("[site](https://x.io)"));
        assert!(corpus.text.contains("![i](assets/notes-a/i.png)"));
        assert!(corpus.text.contains("[sheet](../in/notes/data/s.csv)"));

        let kinds: Vec<_> = corpus
            .relationships
            .iter()
            .map(|r| (r.kind, r.target.as_str()))
            .collect();
        assert!(kinds.contains(&(RelationKind::Dependency, "notes/b.md")));
        assert!(kinds.contains(&(RelationKind::Reference, "https://x.io")));
        assert!(kinds.contains(&(RelationKind::Attachment, "assets/notes-a/i.png")));
        assert!(kinds.contains(&(RelationKind::Reference, "notes/data/s.csv")));
    }

    #[test]
    fn empty_input_yields_minimal_corpus_with_warning() {
        let out = aggregate(Vec::new(), &options());
        assert_eq!(out.report.warnings.len(), 1);
        assert!(out.value.text.contains("document_count: 0"));
        assert!(out.value.text.contains("--==SUMMARY==--\n\n--==RAW_NOTES==--\n\n--==ATTACHMENTS==--\n"));
    }

    #[test]
    fn unmarked_text_uses_hints_then_classifier() {
        let text = "# Overview\nThe gist.\n\n## Build\n```rust\nfn main() {}\n```\n";
        let corpus = aggregate(vec![doc("a.md", None, text)], &options()).value;

        let summary_at = corpus.text.find("--==SUMMARY==--").unwrap();
        let raw_at = corpus.text.find("--==RAW_NOTES==--").unwrap();
        let overview_at = corpus.text.find("# Overview").unwrap();
        let build_at = corpus.text.find("## Build").unwrap();
        assert!(summary_at < overview_at && overview_at < raw_at);
        assert!(raw_at < build_at);
    }

    #[test]
    fn stray_markers_are_reported_per_document() {
        let out = aggregate(
            vec![doc("a.md", None, "text\n--==ATTACHMENT_BLOCK_END==--\n")],
            &options(),
        );
        assert_eq!(out.report.errors.len(), 1);
        assert_eq!(out.report.errors[0].kind, IssueKind::MalformedMarkers);
        assert_eq!(out.report.errors[0].scope, "a.md");
        assert!(out.value.text.contains("text"));
    }

    #[test]
    fn text_blocks_keep_fences_whole() {
        let blocks = text_blocks("para one\nstill one\n\n```\ncode\n\nmore\n```\n# Head\nafter");
        assert_eq!(
            blocks,
            vec!["para one\nstill one", "```\ncode\n\nmore\n```", "# Head", "after"]
        );
    }

    #[test]
    fn headers_of_different_levels_are_distinct() {
        let text = "--==SUMMARY==--\n# Summary\none\n\n### summary\ntwo\n\n# Summary\n";
        let corpus = aggregate(vec![doc("a.md", None, text)], &options()).value;
        assert!(corpus.text.contains("# Summary"));
        assert!(corpus.text.contains("### summary"));
        assert_eq!(corpus.dedup.headers, 1);
    }

    #[test]
    fn fenced_markers_stay_in_their_section_after_split() {
        let text = "--==SUMMARY==--\n# Summary\nWe decided X.\n\n```text\nmarker syntax:\n--==RAW_NOTES==--\nend\n```\nafter fence\n";
        let corpus = aggregate(vec![doc("a.md", None, text)], &options()).value;
        let out = crate::splitter::split(&corpus.text);
        assert!(out.summary.contains("marker syntax:\n--==RAW_NOTES==--\nend\n```\nafter fence"));
        assert_eq!(out.raw_notes, "");
    }

    #[test]
    fn unclosed_fence_is_closed_at_block_end() {
        let corpus = aggregate(
            vec![
                doc("a.md", None, "--==SUMMARY==--\nintro\n\n```\nnever closed\n"),
                doc("b.md", None, "--==RAW_NOTES==--\nlater\n"),
            ],
            &options(),
        )
        .value;
        let out = crate::splitter::split(&corpus.text);
        assert!(out.summary.contains("never closed"));
        assert!(!out.summary.contains("later"));
        assert!(out.raw_notes.contains("later"));
    }

    #[test]
    fn markdown_attachment_links_resolve_from_the_note() {
        let block = wrap("a/sub.md", "![p](a/pic.png)");
        let corpus = aggregate(vec![doc("notes/a.md", None, &block)], &options()).value;
        assert!(corpus.text.contains("![p](../in/notes/a/pic.png)"));
        assert!(corpus.relationships.contains(&Relationship {
            kind: RelationKind::Attachment,
            source: "notes/a.md".into(),
            target: "notes/a/pic.png".into(),
        }));
    }

    #[test]
    fn front_matter_escapes_quotes() {
        let docs = vec![CorpusDocument {
            path: "a \"b\".md".into(),
            date: "2024-01-01".into(),
        }];
        let fm = front_matter(&docs, &BTreeSet::new(), &DedupStats::default());
        assert!(fm.contains("  - path: \"a \\\"b\\\".md\"\n"));
        assert!(fm.starts_with("---\n") && fm.ends_with("---\n"));
    }
}
