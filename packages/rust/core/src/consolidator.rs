//! Per-document consolidation.
//!
//! One [`SourceDocument`] in, one [`ConsolidatedDocument`] out. Every failure
//! inside a document is recorded in the returned report; nothing here aborts
//! the document or its siblings.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use notefold_discovery::{AssetResolver, Resolution, extract_references};
use notefold_markdown::{
    FenceTracker, Marker, line_hint, normalize, parse_marker, parse_section_marker_loose, repair,
    section_marker, unify, wrap,
};
use notefold_shared::paths::normalize_lexically;
use notefold_shared::{
    AttachmentReference, IssueKind, Processed, Report, RetryConfig, RunConfig, Section,
    SourceDocument, is_image_name, sha256_hex, slugify_path, to_slash,
};

use crate::assets::{AssetSink, StoredAsset};
use crate::collaborators::Collaborators;
use crate::handlers::{HandlerContext, HandlerRegistry, asset_link};

/// A normalized note with references rewritten and attachments inlined as
/// marker blocks.
#[derive(Debug, Clone)]
pub struct ConsolidatedDocument {
    /// Path relative to the input root, `/`-separated.
    pub rel_path: String,
    pub date: NaiveDate,
    pub dated_by_name: bool,
    pub modified: Option<DateTime<Utc>>,
    /// SHA-256 of the source text.
    pub source_hash: String,
    pub text: String,
    /// References found after normalization, with resolution results.
    pub references: Vec<AttachmentReference>,
    /// Link targets already rewritten to output-relative asset paths.
    pub rewritten: BTreeSet<String>,
}

impl ConsolidatedDocument {
    /// Ordering key: filename date when present, otherwise modification time.
    pub fn sort_instant(&self) -> DateTime<Utc> {
        if self.dated_by_name {
            return self.date.and_time(NaiveTime::MIN).and_utc();
        }
        self.modified.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Directory of the note relative to the input root (`""` at the root).
    pub fn source_dir(&self) -> &str {
        self.rel_path.rsplit_once('/').map_or("", |(dir, _)| dir)
    }
}

/// Runs the per-document consolidation steps.
pub struct Consolidator {
    resolver: AssetResolver,
    sink: AssetSink,
    handlers: HandlerRegistry,
    collaborators: Collaborators,
    max_inline_bytes: u64,
    retry: RetryConfig,
}

impl Consolidator {
    pub fn new(config: &RunConfig, collaborators: Collaborators) -> Self {
        Self {
            resolver: AssetResolver::new(&config.input_dir),
            sink: AssetSink::from(config),
            handlers: HandlerRegistry::default(),
            collaborators,
            max_inline_bytes: config.max_inline_bytes,
            retry: config.retry.clone(),
        }
    }

    /// Replace the attachment handler registry.
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Consolidate one document.
    #[instrument(skip_all, fields(doc = %doc.rel_path))]
    pub fn consolidate(&self, doc: &SourceDocument) -> Processed<ConsolidatedDocument> {
        let scope = doc.rel_path.as_str();
        let slug = slugify_path(&doc.rel_path);
        let mut report = Report::default();

        // --- Normalize ---
        let mut text = normalize(&doc.text);

        // --- Resolve and rewrite references ---
        let mut references = extract_references(&text);
        let mut rewrites: Vec<(String, String)> = Vec::new();
        let mut rewritten = BTreeSet::new();
        let mut used: HashSet<PathBuf> = HashSet::new();

        for reference in &mut references {
            let (path, strategy) = match self.resolver.resolve(&reference.target, &doc.path) {
                Resolution::Found { path, strategy } => (path, strategy),
                Resolution::NotFound { tried } => {
                    report.warning(
                        IssueKind::ResolutionMiss,
                        scope,
                        format!("{} not found ({} locations tried)", reference.target, tried.len()),
                    );
                    continue;
                }
            };
            reference.resolved = Some(path.clone());
            reference.strategy = Some(strategy);

            if let Some(asset) = self.store_reference(reference, &path, &slug, scope, &mut report) {
                rewrites.push((reference.raw.clone(), rewrite_reference(reference, &asset.rel)));
                rewritten.insert(asset.rel);
                used.insert(normalize_lexically(&path));
            }
        }
        text = replace_outside_fences(&text, &rewrites);

        // --- Canonical blocks ---
        text = unify(&text);
        let (repaired, issues) = repair(&text);
        for issue in issues {
            report.error(IssueKind::MalformedMarkers, scope, issue.message);
        }
        text = repaired;

        // --- Same-stem attachment directory ---
        let attachment_dir = doc.path.with_extension("");
        if attachment_dir.is_dir() {
            let blocks = self.attachment_blocks(
                &attachment_dir,
                &slug,
                scope,
                &used,
                &mut rewritten,
                &mut report,
            );
            if !blocks.is_empty() {
                let mut joined = text.trim_end().to_string();
                if !joined.is_empty() {
                    joined.push_str("\n\n");
                }
                joined.push_str(&blocks.join("\n\n"));
                joined.push('\n');
                text = joined;
            }
        }

        // --- Section markers ---
        text = place_section_markers(&text);

        debug!(
            references = references.len(),
            rewritten = rewritten.len(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "consolidated"
        );

        let consolidated = ConsolidatedDocument {
            rel_path: doc.rel_path.clone(),
            date: doc.date,
            dated_by_name: doc.dated_by_name,
            modified: doc.modified,
            source_hash: sha256_hex(doc.text.as_bytes()),
            text,
            references,
            rewritten,
        };
        Processed::new(consolidated, report)
    }

    fn store_reference(
        &self,
        reference: &AttachmentReference,
        path: &Path,
        slug: &str,
        scope: &str,
        report: &mut Report,
    ) -> Option<StoredAsset> {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let stored = if reference.is_image || is_image_name(&name) {
            self.sink
                .store_image(slug, path, self.collaborators.codec.as_ref(), scope)
                .map(|p| {
                    report.merge(p.report);
                    p.value
                })
        } else {
            self.sink.copy(slug, path)
        };

        match stored {
            Ok(asset) => Some(asset),
            Err(e) => {
                report.error(IssueKind::Io, scope, format!("{}: {e}", reference.target));
                None
            }
        }
    }

    /// One block per file in the attachment directory, in name order.
    /// Files already placed through a reference are skipped.
    fn attachment_blocks(
        &self,
        dir: &Path,
        slug: &str,
        scope: &str,
        used: &HashSet<PathBuf>,
        rewritten: &mut BTreeSet<String>,
        report: &mut Report,
    ) -> Vec<String> {
        let stem = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut blocks = Vec::new();

        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report.error(IssueKind::Io, scope, format!("attachment walk: {e}"));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if used.contains(&normalize_lexically(path)) {
                debug!(path = %path.display(), "attachment already placed by reference");
                continue;
            }

            let rel_name = to_slash(path.strip_prefix(dir).unwrap_or(path));
            let block_name = format!("{stem}/{rel_name}");
            let link_base = block_name
                .rsplit_once('/')
                .map_or(stem.as_str(), |(parent, _)| parent);
            let Some(handler) = self.handlers.handler_for(path) else {
                report.warning(IssueKind::Conversion, scope, format!("{rel_name}: no handler"));
                continue;
            };

            let ctx = HandlerContext {
                scope,
                doc_slug: slug,
                path,
                rel_name: &rel_name,
                link_base,
                sink: &self.sink,
                collaborators: &self.collaborators,
                max_inline_bytes: self.max_inline_bytes,
                retry: &self.retry,
            };

            match handler.process(&ctx) {
                Ok(processed) => {
                    debug!(handler = handler.name(), attachment = %rel_name, "attachment processed");
                    report.merge(processed.report);
                    rewritten.extend(processed.value.assets);
                    blocks.push(wrap(&block_name, &processed.value.body));
                }
                Err(e) => report.error(IssueKind::Io, scope, format!("{rel_name}: {e}")),
            }
        }

        blocks
    }
}

// ---------------------------------------------------------------------------
// Text passes
// ---------------------------------------------------------------------------

/// Rebuild a reference so it points at the stored asset.
fn rewrite_reference(reference: &AttachmentReference, rel: &str) -> String {
    let label = if reference.label.is_empty() {
        reference
            .target
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&reference.target)
    } else {
        reference.label.as_str()
    };
    asset_link(label, rel, reference.is_image)
}

/// Apply literal replacements on every line outside fenced code.
fn replace_outside_fences(text: &str, replacements: &[(String, String)]) -> String {
    if replacements.is_empty() {
        return text.to_string();
    }

    let mut fence = FenceTracker::new();
    text.split('\n')
        .map(|line| {
            if fence.observe(line) {
                return line.to_string();
            }
            replace_spans(line, replacements)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single left-to-right pass: at each step the earliest match wins, the
/// longest on a tie. Replaced text is never matched again.
fn replace_spans(line: &str, replacements: &[(String, String)]) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    loop {
        let next = replacements
            .iter()
            .filter(|(from, _)| !from.is_empty())
            .filter_map(|(from, to)| rest.find(from.as_str()).map(|at| (at, from, to)))
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.len().cmp(&a.1.len())));
        let Some((at, from, to)) = next else {
            break;
        };
        out.push_str(&rest[..at]);
        out.push_str(to);
        rest = &rest[at + from.len()..];
    }
    out.push_str(rest);
    out
}

/// Canonicalize hand-typed section markers and insert a marker ahead of every
/// heading whose keyword hints at a different section than the current one.
/// Attachment block bodies and fenced code are left alone.
fn place_section_markers(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut fence = FenceTracker::new();
    let mut in_block = false;
    let mut current: Option<Section> = None;

    for line in text.split('\n') {
        if in_block {
            if matches!(parse_marker(line), Some(Marker::BlockEnd)) {
                in_block = false;
            }
            out.push(line);
            continue;
        }
        if fence.observe(line) {
            out.push(line);
            continue;
        }

        match parse_marker(line) {
            Some(Marker::BlockStart(_)) => {
                in_block = true;
                out.push(line);
                continue;
            }
            Some(Marker::Section(section)) => {
                current = Some(section);
                out.push(section_marker(section));
                continue;
            }
            _ => {}
        }

        if let Some(section) = parse_section_marker_loose(line) {
            current = Some(section);
            out.push(section_marker(section));
            continue;
        }

        if let Some(hint) = line_hint(line) {
            if current != Some(hint) {
                out.push(section_marker(hint));
                current = Some(hint);
            }
        }
        out.push(line);
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use notefold_discovery::read_source;
    use notefold_shared::{AppConfig, ResolutionStrategy};

    struct Tree {
        root: PathBuf,
    }

    impl Tree {
        fn new() -> Self {
            let root = std::env::temp_dir().join(format!("nf-consolidate-{}", uuid::Uuid::now_v7()));
            std::fs::create_dir_all(root.join("in")).unwrap();
            Self { root }
        }

        fn input(&self) -> PathBuf {
            self.root.join("in")
        }

        fn write(&self, rel: &str, bytes: &[u8]) -> PathBuf {
            let path = self.input().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, bytes).unwrap();
            path
        }

        fn config(&self) -> RunConfig {
            let mut config = RunConfig::from(&AppConfig::default());
            config.input_dir = self.input();
            config.output_dir = self.root.join("out");
            config
        }

        fn consolidate(&self, rel: &str) -> Processed<ConsolidatedDocument> {
            let config = self.config();
            let path = self.input().join(rel);
            let doc = read_source(&path, &config.input_dir, &config.retry).unwrap().value;
            Consolidator::new(&config, Collaborators::default()).consolidate(&doc)
        }
    }

    impl Drop for Tree {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.root).ok();
        }
    }

    #[test]
    fn fuzzy_match_in_sibling_media_is_copied_and_rewritten() {
        let tree = Tree::new();
        tree.write("trip.md", b"# Trip\n\n![x](photo.HEIC)\n");
        tree.write("trip/_media/photo.heic", b"heic");

        let out = tree.consolidate("trip.md");
        let doc = out.value;

        assert_eq!(doc.references.len(), 1);
        assert!(doc.references[0].resolved.is_some());
        assert!(doc.text.contains("assets/trip/photo.heic"));
        assert!(doc.rewritten.contains("assets/trip/photo.heic"));
        assert!(tree.root.join("out/assets/trip/photo.heic").is_file());
        // the referenced file is not appended a second time
        assert!(!doc.text.contains("trip/_media/photo.heic==--"));
    }

    #[test]
    fn literal_reference_records_strategy() {
        let tree = Tree::new();
        tree.write("a.md", b"See ![diagram](img/d.png) inline.\n");
        tree.write("img/d.png", b"png");

        let doc = tree.consolidate("a.md").value;
        assert_eq!(doc.references[0].strategy, Some(ResolutionStrategy::Literal));
        assert!(doc.text.contains("See ![diagram](assets/a/d.png) inline."));
    }

    #[test]
    fn missing_reference_keeps_text_and_warns() {
        let tree = Tree::new();
        tree.write("a.md", b"Look: ![gone](gone.png) here\n");

        let out = tree.consolidate("a.md");
        assert!(out.value.text.contains("![gone](gone.png)"));
        assert_eq!(out.report.warnings.len(), 1);
        assert_eq!(out.report.warnings[0].kind, IssueKind::ResolutionMiss);
        assert!(out.report.errors.is_empty());
    }

    #[test]
    fn sibling_directory_files_become_blocks() {
        let tree = Tree::new();
        tree.write("20240102-meeting.md", b"Minutes.\n");
        tree.write("20240102-meeting/agenda.txt", b"1. budget\n");
        tree.write("20240102-meeting/scan.pdf", b"%PDF");

        let doc = tree.consolidate("20240102-meeting.md").value;
        let scanned = notefold_markdown::scan(&doc.text);
        assert!(scanned.is_balanced());
        let names: Vec<_> = scanned.blocks.iter().map(|b| b.filename.as_str()).collect();
        assert_eq!(names, vec!["20240102-meeting/agenda.txt", "20240102-meeting/scan.pdf"]);
        assert_eq!(scanned.blocks[0].body, "```\n1. budget\n```");
        assert_eq!(
            scanned.blocks[1].body,
            "[scan.pdf](assets/20240102-meeting/scan.pdf)"
        );
        assert!(doc.rewritten.contains("assets/20240102-meeting/scan.pdf"));
        assert_eq!(doc.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn custom_registry_replaces_default_handlers() {
        let tree = Tree::new();
        let path = tree.write("20240102-meeting.md", b"Minutes.\n");
        tree.write("20240102-meeting/agenda.txt", b"1. budget\n");

        let config = tree.config();
        let doc = read_source(&path, &config.input_dir, &config.retry).unwrap().value;
        let registry = HandlerRegistry::new(vec![Box::new(crate::handlers::BinaryHandler)]);
        let out = Consolidator::new(&config, Collaborators::default())
            .with_handlers(registry)
            .consolidate(&doc)
            .value;

        let scanned = notefold_markdown::scan(&out.text);
        assert_eq!(scanned.blocks.len(), 1);
        assert!(
            scanned.blocks[0]
                .body
                .starts_with("[agenda.txt](assets/20240102-meeting/agenda.txt)")
        );
    }

    #[test]
    fn unbalanced_markers_are_repaired_with_error() {
        let tree = Tree::new();
        tree.write(
            "a.md",
            b"intro\n--==ATTACHMENT_BLOCK: lost.txt==--\nkept text\n",
        );

        let out = tree.consolidate("a.md");
        assert!(out.value.text.contains("kept text"));
        assert!(!out.value.text.contains("lost.txt"));
        assert_eq!(out.report.errors.len(), 1);
        assert_eq!(out.report.errors[0].kind, IssueKind::MalformedMarkers);
    }

    #[test]
    fn section_markers_follow_heading_hints() {
        let text = "# Summary\nshort\n## Details\nmore\n# Meeting Notes\nraw\n-- == attachments == --\nx";
        let placed = place_section_markers(text);
        assert_eq!(
            placed,
            "--==SUMMARY==--\n# Summary\nshort\n## Details\nmore\n--==RAW_NOTES==--\n# Meeting Notes\nraw\n--==ATTACHMENTS==--\nx"
        );
    }

    #[test]
    fn markers_are_not_placed_inside_blocks_or_fences() {
        let text = "```\n# Summary\n```\n--==ATTACHMENT_BLOCK: a.md==--\n# Notes\n--==ATTACHMENT_BLOCK_END==--";
        assert_eq!(place_section_markers(text), text);
    }

    #[test]
    fn repeated_hint_does_not_repeat_marker() {
        let placed = place_section_markers("# Notes\na\n# Journal\nb");
        assert_eq!(placed, "--==RAW_NOTES==--\n# Notes\na\n# Journal\nb");
    }

    #[test]
    fn replacements_skip_fenced_code() {
        let text = "![a](a.png)\n```\n![a](a.png)\n```";
        let out = replace_outside_fences(text, &[("![a](a.png)".into(), "![a](assets/x/a.png)".into())]);
        assert_eq!(out, "![a](assets/x/a.png)\n```\n![a](a.png)\n```");
    }

    #[test]
    fn link_rewrite_does_not_touch_image_with_same_target() {
        let text = "![x](a.heic) and [x](a.heic)";
        let out = replace_outside_fences(
            text,
            &[
                ("[x](a.heic)".into(), "[x](assets/n/a.heic)".into()),
                ("![x](a.heic)".into(), "![x](assets/n/a.png)".into()),
            ],
        );
        assert_eq!(out, "![x](assets/n/a.png) and [x](assets/n/a.heic)");
    }

    #[test]
    fn markdown_attachment_links_point_into_the_attachment_directory() {
        let tree = Tree::new();
        tree.write("notes/a.md", b"Intro.\n");
        tree.write("notes/a/sub.md", b"![p](pic.png)\n");
        tree.write("notes/a/pic.png", b"png");

        let doc = tree.consolidate("notes/a.md").value;
        let scanned = notefold_markdown::scan(&doc.text);
        let sub = scanned
            .blocks
            .iter()
            .find(|b| b.filename == "a/sub.md")
            .unwrap();
        assert_eq!(sub.body, "![p](a/pic.png)");
    }
}
